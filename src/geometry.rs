//! Placement of a decoded image on the panel.

/// Centering and cropping of one frame, derived from image and display size.
///
/// `crop_*` is measured in image pixels, `place_*` in display pixels. At most
/// one of the two is non-zero per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub image_width: u32,
    pub image_height: u32,
    pub out_width: u32,
    pub out_height: u32,
    pub place_x: u32,
    pub place_y: u32,
    pub crop_x: u32,
    pub crop_y: u32,
}

/// `(out, place, crop)` for one axis.
fn axis(image: u32, display: u32) -> (u32, u32, u32) {
    let out = image.min(display);
    // floored, so an odd excess crops the extra pixel on the left/top
    let place = (display as i64 - image as i64).div_euclid(2);
    if place < 0 {
        (out, 0, (-place) as u32)
    } else {
        (out, place as u32, 0)
    }
}

impl Geometry {
    pub fn new(image_width: u32, image_height: u32, display_width: u32, display_height: u32) -> Self {
        let (out_width, place_x, crop_x) = axis(image_width, display_width);
        let (out_height, place_y, crop_y) = axis(image_height, display_height);
        Self {
            image_width,
            image_height,
            out_width,
            out_height,
            place_x,
            place_y,
            crop_x,
            crop_y,
        }
    }

    /// Nothing of the image reaches the panel.
    pub fn is_empty(&self) -> bool {
        self.out_width == 0 || self.out_height == 0
    }

    /// Bytes of one RGB565 output row.
    pub fn row_bytes(&self) -> usize {
        self.out_width as usize * 2
    }

    /// Image rows `[top, top + rows)` clipped to the visible band, as
    /// `(first output row, row count)`.
    pub fn visible_rows(&self, top: u32, rows: u32) -> (u32, u32) {
        let first = top.max(self.crop_y);
        let last = (top + rows).min(self.crop_y + self.out_height);
        if last <= first {
            (first.saturating_sub(self.crop_y).min(self.out_height), 0)
        } else {
            (first - self.crop_y, last - first)
        }
    }
}
