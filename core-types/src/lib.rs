use serde::{Deserialize, Serialize};
use std::ops::Sub;

bitflags::bitflags! {
    /// What the host device can do, queried once at start-up.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct DeviceCapabilities: u8 {
        const TOUCH       = 0b0000_0001;
        const MOBILE      = 0b0000_0010;
        const SHARE_FILES = 0b0000_0100;
    }
}

/// A position in logical pixels (pointer, touch or pan offset).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Decoded raster image.
///
/// RGBA8, row-major. Immutable once built: the only way to get one is through
/// a constructor that checks the buffer matches the dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Bitmap {
    pub const CHANNELS: usize = 4;

    /// Returns `None` for zero dimensions or a buffer of the wrong length.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(Self::CHANNELS)?;
        if data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Bitmap filled with a single RGBA value.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Option<Self> {
        let count = (width as usize).checked_mul(height as usize)?;
        let data = rgba.iter().copied().cycle().take(count * Self::CHANNELS).collect();
        Self::from_rgba(width, height, data)
    }

    /// New bitmap with the same dimensions, each pixel rewritten by `f`.
    pub fn map_pixels(&self, mut f: impl FnMut(&mut [u8])) -> Bitmap {
        let mut data = self.data.clone();
        data.chunks_exact_mut(Self::CHANNELS).for_each(|px| f(px));
        Bitmap {
            width: self.width,
            height: self.height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn pixels(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.data
            .chunks_exact(Self::CHANNELS)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        let px = &self.data[idx..idx + Self::CHANNELS];
        Some([px[0], px[1], px[2], px[3]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_rejects_mismatched_buffers() {
        assert!(Bitmap::from_rgba(2, 2, vec![0; 15]).is_none());
        assert!(Bitmap::from_rgba(0, 2, Vec::new()).is_none());
        assert!(Bitmap::from_rgba(2, 2, vec![0; 16]).is_some());
    }

    #[test]
    fn filled_bitmap_reports_pixels() {
        let bmp = Bitmap::filled(3, 2, [1, 2, 3, 4]).unwrap();
        assert_eq!(bmp.dimensions(), (3, 2));
        assert_eq!(bmp.pixel(2, 1), Some([1, 2, 3, 4]));
        assert_eq!(bmp.pixel(3, 0), None);
        assert_eq!(bmp.pixels().count(), 6);
    }

    #[test]
    fn point_distance_is_euclidean() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(30.0, 40.0);
        assert_eq!(a.distance_to(b), 50.0);
        assert_eq!(b - a, Point::new(30.0, 40.0));
    }
}
