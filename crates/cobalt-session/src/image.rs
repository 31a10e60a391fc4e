use cobalt_graphics::color_conversion::{rdp_15bit_to_rgb, rdp_16bit_to_rgb, Palette};
use cobalt_graphics::image_processing::PixelFormat;
use cobalt_pdu::geometry::{InclusiveRectangle, Rectangle as _};

/// The session framebuffer: a contiguous row-major top-down RGBA image.
///
/// RDP bitmap data is bottom-up; the `apply_*` methods reverse the row order
/// while converting to RGBA.
pub struct DecodedImage {
    pixel_format: PixelFormat,
    data: Vec<u8>,
    width: u16,
    height: u16,
}

const PIXEL_SIZE: usize = 4;

impl DecodedImage {
    pub fn new(width: u16, height: u16) -> Self {
        let len = usize::from(width) * usize::from(height) * PIXEL_SIZE;

        Self {
            pixel_format: PixelFormat::RgbA32,
            data: vec![0; len],
            width,
            height,
        }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Extracts the given rectangle as a standalone top-down RGBA buffer.
    pub fn extract_rect(&self, rect: &InclusiveRectangle) -> Vec<u8> {
        let rect = match self.clip(rect) {
            Some(rect) => rect,
            None => return Vec::new(),
        };

        let width = usize::from(rect.width());
        let mut out = Vec::with_capacity(width * usize::from(rect.height()) * PIXEL_SIZE);

        for y in rect.top..=rect.bottom {
            let start = (usize::from(y) * usize::from(self.width) + usize::from(rect.left)) * PIXEL_SIZE;
            out.extend_from_slice(&self.data[start..start + width * PIXEL_SIZE]);
        }

        out
    }

    fn clip(&self, rect: &InclusiveRectangle) -> Option<InclusiveRectangle> {
        let bounds = InclusiveRectangle {
            left: 0,
            top: 0,
            right: self.width.checked_sub(1)?,
            bottom: self.height.checked_sub(1)?,
        };

        rect.intersect(&bounds).or_else(|| {
            // Degenerate one-pixel-wide rectangles do not intersect under the
            // strict check; clamp them instead.
            if rect.left <= bounds.right && rect.top <= bounds.bottom {
                Some(InclusiveRectangle {
                    left: rect.left,
                    top: rect.top,
                    right: rect.right.min(bounds.right),
                    bottom: rect.bottom.min(bounds.bottom),
                })
            } else {
                None
            }
        })
    }

    fn apply_bottom_up<F>(&mut self, rect: &InclusiveRectangle, src_width: usize, bytes_per_pixel: usize, src: &[u8], convert: F)
    where
        F: Fn(&[u8]) -> [u8; 4],
    {
        let rect = match self.clip(rect) {
            Some(rect) => rect,
            None => return,
        };

        let rect_width = usize::from(rect.width());
        let rect_height = usize::from(rect.height());
        let src_row_len = src_width * bytes_per_pixel;

        for dst_y in 0..rect_height {
            // Source rows are stored bottom-up.
            let src_y = rect_height - 1 - dst_y;
            let src_row_start = src_y * src_row_len;

            if src_row_start + rect_width * bytes_per_pixel > src.len() {
                continue;
            }

            let dst_row = (usize::from(rect.top) + dst_y) * usize::from(self.width) + usize::from(rect.left);

            for x in 0..rect_width {
                let src_idx = src_row_start + x * bytes_per_pixel;
                let rgba = convert(&src[src_idx..src_idx + bytes_per_pixel]);

                let dst_idx = (dst_row + x) * PIXEL_SIZE;
                self.data[dst_idx..dst_idx + PIXEL_SIZE].copy_from_slice(&rgba);
            }
        }
    }

    /// Applies a bottom-up RGB565 bitmap.
    pub fn apply_rgb16_bitmap(&mut self, src: &[u8], src_width: u16, rect: &InclusiveRectangle) {
        self.apply_bottom_up(rect, usize::from(src_width), 2, src, |px| {
            let [r, g, b] = rdp_16bit_to_rgb(u16::from_le_bytes([px[0], px[1]]));
            [r, g, b, 0xFF]
        });
    }

    /// Applies a bottom-up RGB555 bitmap.
    pub fn apply_rgb15_bitmap(&mut self, src: &[u8], src_width: u16, rect: &InclusiveRectangle) {
        self.apply_bottom_up(rect, usize::from(src_width), 2, src, |px| {
            let [r, g, b] = rdp_15bit_to_rgb(u16::from_le_bytes([px[0], px[1]]));
            [r, g, b, 0xFF]
        });
    }

    /// Applies a bottom-up 8-bpp palettized bitmap.
    pub fn apply_rgb8_bitmap(&mut self, src: &[u8], src_width: u16, rect: &InclusiveRectangle, palette: &Palette) {
        self.apply_bottom_up(rect, usize::from(src_width), 1, src, |px| {
            let [r, g, b] = palette.get(px[0]);
            [r, g, b, 0xFF]
        });
    }

    /// Applies a bottom-up 24-bpp bitmap; RDP stores those pixels in BGR
    /// byte order.
    pub fn apply_bgr24_bitmap(&mut self, src: &[u8], src_width: u16, rect: &InclusiveRectangle) {
        self.apply_bottom_up(rect, usize::from(src_width), 3, src, |px| [px[2], px[1], px[0], 0xFF]);
    }

    /// Applies a bottom-up 32-bpp BGRA bitmap.
    pub fn apply_bgra32_bitmap(&mut self, src: &[u8], src_width: u16, rect: &InclusiveRectangle) {
        self.apply_bottom_up(rect, usize::from(src_width), 4, src, |px| [px[2], px[1], px[0], 0xFF]);
    }

    /// Applies an already top-down RGBA image (the output of the planar and
    /// NSCodec decoders).
    pub fn apply_rgba_image(&mut self, src: &[u8], src_width: u16, rect: &InclusiveRectangle) {
        let rect = match self.clip(rect) {
            Some(rect) => rect,
            None => return,
        };

        let rect_width = usize::from(rect.width());
        let rect_height = usize::from(rect.height());
        let src_row_len = usize::from(src_width) * PIXEL_SIZE;

        for y in 0..rect_height {
            let src_row_start = y * src_row_len;

            if src_row_start + rect_width * PIXEL_SIZE > src.len() {
                continue;
            }

            let dst_idx =
                ((usize::from(rect.top) + y) * usize::from(self.width) + usize::from(rect.left)) * PIXEL_SIZE;

            self.data[dst_idx..dst_idx + rect_width * PIXEL_SIZE]
                .copy_from_slice(&src[src_row_start..src_row_start + rect_width * PIXEL_SIZE]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(left: u16, top: u16, right: u16, bottom: u16) -> InclusiveRectangle {
        InclusiveRectangle {
            left,
            top,
            right,
            bottom,
        }
    }

    #[test]
    fn rgb16_bitmap_is_flipped_and_converted() {
        let mut image = DecodedImage::new(2, 2);

        // Bottom-up: first row is the bottom of the rectangle.
        // Bottom row: black, white. Top row: white, red.
        let src = [0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0xF8];

        image.apply_rgb16_bitmap(&src, 2, &rect(0, 0, 1, 1));

        let px: Vec<&[u8]> = image.data().chunks_exact(4).collect();
        assert_eq!(px[0], &[255, 255, 255, 255]); // top-left
        assert_eq!(px[1], &[255, 0, 0, 255]); // top-right
        assert_eq!(px[2], &[0, 0, 0, 255]); // bottom-left
        assert_eq!(px[3], &[255, 255, 255, 255]); // bottom-right
    }

    #[test]
    fn rgba_image_is_copied_top_down() {
        let mut image = DecodedImage::new(2, 2);

        let src = [
            1, 2, 3, 4, //
            5, 6, 7, 8, //
        ];

        image.apply_rgba_image(&src, 1, &rect(1, 0, 1, 1));

        let px: Vec<&[u8]> = image.data().chunks_exact(4).collect();
        assert_eq!(px[1], &[1, 2, 3, 4]);
        assert_eq!(px[3], &[5, 6, 7, 8]);
    }

    #[test]
    fn out_of_bounds_rectangle_is_clipped() {
        let mut image = DecodedImage::new(2, 2);

        let src = [0xFF; 4 * 2];
        image.apply_bgra32_bitmap(&src, 2, &rect(1, 1, 2, 1));

        let px: Vec<&[u8]> = image.data().chunks_exact(4).collect();
        assert_eq!(px[3], &[255, 255, 255, 255]);
        assert_eq!(px[0], &[0, 0, 0, 0]);
    }

    #[test]
    fn extract_rect_returns_the_requested_region() {
        let mut image = DecodedImage::new(2, 2);
        let src = [
            1, 1, 1, 1, 2, 2, 2, 2, //
            3, 3, 3, 3, 4, 4, 4, 4, //
        ];
        image.apply_rgba_image(&src, 2, &rect(0, 0, 1, 1));

        let extracted = image.extract_rect(&rect(1, 0, 1, 1));
        assert_eq!(extracted, vec![2, 2, 2, 2, 4, 4, 4, 4]);
    }
}
