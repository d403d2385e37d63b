use core_types::Point;

/// Share of the container a 1:1 image may occupy before it is shrunk to fit.
pub const FIT_FRACTION: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Visual transform of the displayed image.
///
/// `scale` is applied first, then `translate` in scaled space. The
/// translation is the pan offset divided by the zoom, so on screen the image
/// moves exactly as far as the pointer did at any zoom level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub scale: f32,
    pub translate: Point,
    /// False while dragging: changes apply immediately.
    pub animated: bool,
    pub transition_ms: u32,
}

impl ViewTransform {
    pub fn new(zoom: f32, pan: Point, dragging: bool, transition_ms: u32) -> Self {
        Self {
            scale: zoom,
            translate: Point::new(pan.x / zoom, pan.y / zoom),
            animated: !dragging,
            transition_ms,
        }
    }

    /// Translation in screen pixels.
    pub fn screen_offset(&self) -> Point {
        Point::new(self.translate.x * self.scale, self.translate.y * self.scale)
    }

    /// Effective animation duration.
    pub fn duration_ms(&self) -> u32 {
        if self.animated {
            self.transition_ms
        } else {
            0
        }
    }

    pub fn css_transform(&self) -> String {
        format!(
            "scale({}) translate({}px, {}px)",
            self.scale, self.translate.x, self.translate.y
        )
    }

    pub fn css_transition(&self) -> String {
        if self.animated {
            format!("transform {}s ease", self.transition_ms as f32 / 1000.0)
        } else {
            "none".to_string()
        }
    }

    /// Where the image lands inside `container` for hosts that place it by rectangle.
    ///
    /// At zoom 1 the image is shrunk (never enlarged) to fit
    /// [`FIT_FRACTION`] of the container and centered.
    pub fn frame(&self, container: Size, image: Size) -> Rect {
        if image.width <= 0.0 || image.height <= 0.0 {
            return Rect {
                x: container.width / 2.0,
                y: container.height / 2.0,
                width: 0.0,
                height: 0.0,
            };
        }
        let fit = (FIT_FRACTION * container.width / image.width)
            .min(FIT_FRACTION * container.height / image.height)
            .min(1.0);
        let width = image.width * fit * self.scale;
        let height = image.height * fit * self.scale;
        let offset = self.screen_offset();
        Rect {
            x: (container.width - width) / 2.0 + offset.x,
            y: (container.height - height) / 2.0 + offset.y,
            width,
            height,
        }
    }
}
