use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use core_types::Bitmap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

#[derive(Debug, Default)]
struct PoolInner {
    next_id: u64,
    live: HashSet<ResourceId>,
    released: u64,
}

/// Issues image resources and keeps track of which are still alive.
///
/// A resource is released when its last handle drops, so each one is
/// released exactly once no matter how many viewers shared it.
#[derive(Debug, Clone, Default)]
pub struct ResourcePool {
    inner: Rc<RefCell<PoolInner>>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        label: impl Into<String>,
        mime_type: &'static str,
        bytes: Vec<u8>,
        bitmap: Option<Bitmap>,
    ) -> ImageResource {
        let id = {
            let mut inner = self.inner.borrow_mut();
            inner.next_id += 1;
            let id = ResourceId(inner.next_id);
            inner.live.insert(id);
            id
        };
        let label = label.into();
        debug!(?id, %label, len = bytes.len(), "created image resource");
        ImageResource(Rc::new(ResourceEntry {
            id,
            label,
            mime_type,
            bytes,
            bitmap,
            pool: Rc::downgrade(&self.inner),
        }))
    }

    pub fn live_count(&self) -> usize {
        self.inner.borrow().live.len()
    }

    pub fn released_count(&self) -> u64 {
        self.inner.borrow().released
    }

    pub fn is_live(&self, id: ResourceId) -> bool {
        self.inner.borrow().live.contains(&id)
    }
}

struct ResourceEntry {
    id: ResourceId,
    label: String,
    mime_type: &'static str,
    bytes: Vec<u8>,
    bitmap: Option<Bitmap>,
    pool: Weak<RefCell<PoolInner>>,
}

impl Drop for ResourceEntry {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            let mut inner = pool.borrow_mut();
            if inner.live.remove(&self.id) {
                inner.released += 1;
                debug!(id = ?self.id, label = %self.label, "released image resource");
            }
        }
    }
}

/// Shared handle to an encoded image (and its pixels, when decoded).
#[derive(Clone)]
pub struct ImageResource(Rc<ResourceEntry>);

impl ImageResource {
    pub fn id(&self) -> ResourceId {
        self.0.id
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub fn mime_type(&self) -> &'static str {
        self.0.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0.bytes
    }

    pub fn bitmap(&self) -> Option<&Bitmap> {
        self.0.bitmap.as_ref()
    }
}

impl PartialEq for ImageResource {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl fmt::Debug for ImageResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageResource")
            .field("id", &self.0.id)
            .field("label", &self.0.label)
            .field("mime_type", &self.0.mime_type)
            .field("len", &self.0.bytes.len())
            .finish()
    }
}
