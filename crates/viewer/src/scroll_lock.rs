use std::rc::Rc;

/// Host capability for freezing whatever scrolls behind the viewer.
pub trait ScrollLock {
    fn lock(&self);
    fn unlock(&self);
}

/// For hosts with nothing to freeze.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScrollLock;

impl ScrollLock for NoScrollLock {
    fn lock(&self) {}
    fn unlock(&self) {}
}

/// Holds the lock for as long as it lives.
pub struct ScrollLockGuard {
    lock: Rc<dyn ScrollLock>,
}

impl ScrollLockGuard {
    pub fn acquire(lock: Rc<dyn ScrollLock>) -> Self {
        lock.lock();
        Self { lock }
    }
}

impl Drop for ScrollLockGuard {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

impl std::fmt::Debug for ScrollLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ScrollLockGuard")
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ScrollLock;
    use std::cell::Cell;

    #[derive(Default)]
    pub struct RecordingLock {
        pub locks: Cell<u32>,
        pub unlocks: Cell<u32>,
    }

    impl RecordingLock {
        pub fn is_locked(&self) -> bool {
            self.locks.get() > self.unlocks.get()
        }
    }

    impl ScrollLock for RecordingLock {
        fn lock(&self) {
            self.locks.set(self.locks.get() + 1);
        }

        fn unlock(&self) {
            self.unlocks.set(self.unlocks.get() + 1);
        }
    }
}
