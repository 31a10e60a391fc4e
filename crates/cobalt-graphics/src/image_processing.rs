use num_derive::{FromPrimitive, ToPrimitive};

const MAX_ALPHA: u8 = 0xFF;

/// Byte layouts supported for 32-bit framebuffer pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum PixelFormat {
    RgbA32,
    RgbX32,
    BgrA32,
    BgrX32,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> u8 {
        4
    }

    pub fn write_color(self, color: Rgba, buffer: &mut [u8]) {
        match self {
            Self::RgbA32 => buffer[..4].copy_from_slice(&[color.r, color.g, color.b, color.a]),
            Self::RgbX32 => buffer[..4].copy_from_slice(&[color.r, color.g, color.b, MAX_ALPHA]),
            Self::BgrA32 => buffer[..4].copy_from_slice(&[color.b, color.g, color.r, color.a]),
            Self::BgrX32 => buffer[..4].copy_from_slice(&[color.b, color.g, color.r, MAX_ALPHA]),
        }
    }

    pub fn read_color(self, buffer: &[u8]) -> Rgba {
        match self {
            Self::RgbA32 => Rgba {
                r: buffer[0],
                g: buffer[1],
                b: buffer[2],
                a: buffer[3],
            },
            Self::RgbX32 => Rgba {
                r: buffer[0],
                g: buffer[1],
                b: buffer[2],
                a: MAX_ALPHA,
            },
            Self::BgrA32 => Rgba {
                b: buffer[0],
                g: buffer[1],
                r: buffer[2],
                a: buffer[3],
            },
            Self::BgrX32 => Rgba {
                b: buffer[0],
                g: buffer[1],
                r: buffer[2],
                a: MAX_ALPHA,
            },
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Reverses the row order of a packed image in place.
///
/// RDP bitmap data is bottom-up while the framebuffer is top-down.
pub fn flip_vertically(data: &mut [u8], height: usize, row_len: usize) {
    debug_assert!(data.len() >= height * row_len);

    let mut top = 0;
    let mut bottom = height.saturating_sub(1);

    while top < bottom {
        let (upper, lower) = data.split_at_mut(bottom * row_len);
        upper[top * row_len..(top + 1) * row_len].swap_with_slice(&mut lower[..row_len]);

        top += 1;
        bottom -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_round_trips_through_every_format() {
        let color = Rgba {
            r: 1,
            g: 2,
            b: 3,
            a: 0xFF,
        };

        for format in [PixelFormat::RgbA32, PixelFormat::RgbX32, PixelFormat::BgrA32, PixelFormat::BgrX32] {
            let mut buffer = [0; 4];
            format.write_color(color, &mut buffer);
            assert_eq!(format.read_color(&buffer), color, "{format:?}");
        }
    }

    #[test]
    fn flip_reverses_row_order() {
        let mut data = vec![1, 1, 2, 2, 3, 3];
        flip_vertically(&mut data, 3, 2);
        assert_eq!(data, vec![3, 3, 2, 2, 1, 1]);
    }

    #[test]
    fn flip_is_an_involution() {
        let original: Vec<u8> = (0..24).collect();
        let mut data = original.clone();

        flip_vertically(&mut data, 4, 6);
        flip_vertically(&mut data, 4, 6);

        assert_eq!(data, original);
    }
}
