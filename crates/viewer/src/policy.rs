use tracing::warn;

pub const DEFAULT_ZOOM_STEP: f32 = 1.5;
pub const DEFAULT_MIN_ZOOM: f32 = 0.5;
pub const DEFAULT_MAX_ZOOM: f32 = 5.0;
/// Duration of the eased transform transition when not dragging.
pub const DEFAULT_TRANSITION_MS: u32 = 200;

/// Zoom limits and step used by a viewer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomPolicy {
    step: f32,
    min: f32,
    max: f32,
    transition_ms: u32,
}

impl Default for ZoomPolicy {
    fn default() -> Self {
        Self {
            step: DEFAULT_ZOOM_STEP,
            min: DEFAULT_MIN_ZOOM,
            max: DEFAULT_MAX_ZOOM,
            transition_ms: DEFAULT_TRANSITION_MS,
        }
    }
}

impl ZoomPolicy {
    /// Build a policy, falling back to the defaults for unusable values.
    ///
    /// The range must contain 1.0 so that `open` and `reset_view` land inside it.
    pub fn new(step: f32, min: f32, max: f32, transition_ms: u32) -> Self {
        let defaults = Self::default();
        let step = if step.is_finite() && step > 1.0 {
            step
        } else {
            warn!(step, "ignoring zoom step, must be greater than 1");
            defaults.step
        };
        let (min, max) = if min.is_finite() && max.is_finite() && min > 0.0 && min <= 1.0 && max >= 1.0 {
            (min, max)
        } else {
            warn!(min, max, "ignoring zoom range, must be positive and contain 1.0");
            (defaults.min, defaults.max)
        };
        Self {
            step,
            min,
            max,
            transition_ms,
        }
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn transition_ms(&self) -> u32 {
        self.transition_ms
    }

    pub fn clamp(&self, zoom: f32) -> f32 {
        zoom.clamp(self.min, self.max)
    }
}
