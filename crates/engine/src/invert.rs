use core_types::Bitmap;

/// Replace R, G and B with `255 - c`. Alpha is copied as is.
pub fn invert(source: &Bitmap) -> Bitmap {
    source.map_pixels(|px| {
        px[0] = 255 - px[0];
        px[1] = 255 - px[1];
        px[2] = 255 - px[2];
    })
}
