use core_types::Point;

/// Raw input forwarded by the host while the viewer is on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent<'a> {
    PointerDown(Point),
    PointerMove(Point),
    PointerUp,
    /// All touches currently on the surface.
    TouchStart(&'a [Point]),
    TouchMove(&'a [Point]),
    TouchEnd,
    /// Negative `delta_y` scrolls up, which zooms in.
    Wheel { delta_y: f32 },
}

/// Whether the host should still run its own handling for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    Propagate,
    /// Suppress page scroll / browser zoom.
    Consume,
}

impl EventDisposition {
    pub fn is_consumed(self) -> bool {
        self == Self::Consume
    }
}
