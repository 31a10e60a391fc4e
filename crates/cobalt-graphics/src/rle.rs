//! Interleaved Run-Length Encoding (RLE) Bitmap Codec
//!
//! ### References
//!
//! - Microsoft Learn:
//!   - [RLE_BITMAP_STREAM](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/b3b60873-16a8-4cbc-8aaa-5f0a93083280)
//!   - [Pseudo-code](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/b6a3f5c2-0804-4c10-9d25-a321720fd23e)
//!
//! Decoding is best-effort: truncated input stops the decoder at the end of
//! the available data, and unknown order codes are skipped. Servers routinely
//! emit streams that end mid-run near the trailing edge of a rectangle.

use core::fmt;
use core::ops::BitXor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RlePixelFormat {
    Rgb24,
    Rgb16,
    Rgb15,
    Rgb8,
    Bgra32,
}

/// Decompress an RLE compressed bitmap.
///
/// `src`: source buffer containing compressed bitmap
/// `dst`: destination buffer
/// `width`: decompressed bitmap width
/// `height`: decompressed bitmap height
/// `bpp`: bits per pixel
pub fn decompress(
    src: &[u8],
    dst: &mut Vec<u8>,
    width: impl Into<usize>,
    height: impl Into<usize>,
    bpp: impl Into<usize>,
) -> Result<RlePixelFormat, RleError> {
    match bpp.into() {
        Mode32Bpp::BPP => decompress_helper::<Mode32Bpp>(src, dst, width.into(), height.into()),
        Mode24Bpp::BPP => decompress_helper::<Mode24Bpp>(src, dst, width.into(), height.into()),
        Mode16Bpp::BPP => decompress_helper::<Mode16Bpp>(src, dst, width.into(), height.into()),
        Mode15Bpp::BPP => decompress_helper::<Mode15Bpp>(src, dst, width.into(), height.into()),
        Mode8Bpp::BPP => decompress_helper::<Mode8Bpp>(src, dst, width.into(), height.into()),
        invalid => Err(RleError::InvalidBpp { bpp: invalid }),
    }
}

/// Decompress a 16-bpp RLE compressed bitmap.
pub fn decompress_16_bpp(
    src: &[u8],
    dst: &mut Vec<u8>,
    width: impl Into<usize>,
    height: impl Into<usize>,
) -> Result<RlePixelFormat, RleError> {
    decompress_helper::<Mode16Bpp>(src, dst, width.into(), height.into())
}

/// Decompress a 24-bpp RLE compressed bitmap.
pub fn decompress_24_bpp(
    src: &[u8],
    dst: &mut Vec<u8>,
    width: impl Into<usize>,
    height: impl Into<usize>,
) -> Result<RlePixelFormat, RleError> {
    decompress_helper::<Mode24Bpp>(src, dst, width.into(), height.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RleError {
    InvalidBpp { bpp: usize },
    EmptyImage,
}

impl fmt::Display for RleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RleError::InvalidBpp { bpp } => write!(f, "invalid bits per pixel: {bpp}"),
            RleError::EmptyImage => write!(f, "height or width is zero"),
        }
    }
}

impl std::error::Error for RleError {}

fn decompress_helper<Mode: DepthMode>(
    src: &[u8],
    dst: &mut Vec<u8>,
    width: usize,
    height: usize,
) -> Result<RlePixelFormat, RleError> {
    if width == 0 || height == 0 {
        return Err(RleError::EmptyImage);
    }

    let row_delta = Mode::COLOR_DEPTH * width;
    dst.clear();
    dst.resize(row_delta * height, 0);
    decompress_impl::<Mode>(src, dst, row_delta);

    Ok(Mode::PIXEL_FORMAT)
}

/// RLE decompression implementation
///
/// `src`: source buffer containing compressed bitmap
/// `dst`: destination buffer
/// `row_delta`: scanline length in bytes
fn decompress_impl<Mode: DepthMode>(src: &[u8], dst: &mut [u8], row_delta: usize) {
    let mut src = Buf::new(src);
    let mut dst = BufMut::new(dst);

    let mut fg_pel = Mode::WHITE_PIXEL;
    let mut insert_fg_pel = false;
    let mut is_first_line = true;

    while !src.eof() && !dst.is_full() {
        // Watch out for the end of the first scanline.
        if is_first_line && dst.pos >= row_delta {
            is_first_line = false;
            insert_fg_pel = false;
        }

        let header = src.read_u8();

        let code = Code::decode(header);

        let run_length = code.extract_run_length(header, &mut src);

        if code == Code::REGULAR_BG_RUN || code == Code::MEGA_MEGA_BG_RUN {
            // Handle Background Run Orders.

            if is_first_line {
                let num_iterations = if insert_fg_pel && run_length > 0 {
                    Mode::write_pixel(&mut dst, fg_pel);
                    run_length - 1
                } else {
                    run_length
                };

                for _ in 0..num_iterations {
                    Mode::write_pixel(&mut dst, Mode::BLACK_PIXEL);
                }
            } else {
                let num_iterations = if insert_fg_pel && run_length > 0 {
                    let pixel_above = dst.read_pixel_above::<Mode>(row_delta);
                    Mode::write_pixel(&mut dst, pixel_above ^ fg_pel);
                    run_length - 1
                } else {
                    run_length
                };

                for _ in 0..num_iterations {
                    let pixel_above = dst.read_pixel_above::<Mode>(row_delta);
                    Mode::write_pixel(&mut dst, pixel_above);
                }
            }

            // A follow-on background run order will need a foreground pel inserted.
            insert_fg_pel = true;

            continue;
        }

        // For any of the other run-types a follow-on background run
        // order does not need a foreground pel inserted.
        insert_fg_pel = false;

        if code == Code::REGULAR_FG_RUN
            || code == Code::MEGA_MEGA_FG_RUN
            || code == Code::LITE_SET_FG_FG_RUN
            || code == Code::MEGA_MEGA_SET_FG_RUN
        {
            // Handle Foreground Run Orders.

            if code == Code::LITE_SET_FG_FG_RUN || code == Code::MEGA_MEGA_SET_FG_RUN {
                fg_pel = Mode::read_pixel(&mut src);
            }

            if is_first_line {
                for _ in 0..run_length {
                    Mode::write_pixel(&mut dst, fg_pel);
                }
            } else {
                for _ in 0..run_length {
                    let pixel_above = dst.read_pixel_above::<Mode>(row_delta);
                    Mode::write_pixel(&mut dst, pixel_above ^ fg_pel);
                }
            }
        } else if code == Code::LITE_DITHERED_RUN || code == Code::MEGA_MEGA_DITHERED_RUN {
            // Handle Dithered Run Orders.

            let pixel_a = Mode::read_pixel(&mut src);
            let pixel_b = Mode::read_pixel(&mut src);

            for _ in 0..run_length {
                Mode::write_pixel(&mut dst, pixel_a);
                Mode::write_pixel(&mut dst, pixel_b);
            }
        } else if code == Code::REGULAR_COLOR_RUN || code == Code::MEGA_MEGA_COLOR_RUN {
            // Handle Color Run Orders.

            let pixel = Mode::read_pixel(&mut src);

            for _ in 0..run_length {
                Mode::write_pixel(&mut dst, pixel);
            }
        } else if code == Code::REGULAR_FGBG_IMAGE
            || code == Code::MEGA_MEGA_FGBG_IMAGE
            || code == Code::LITE_SET_FG_FGBG_IMAGE
            || code == Code::MEGA_MEGA_SET_FGBG_IMAGE
        {
            // Handle Foreground/Background Image Orders.

            if code == Code::LITE_SET_FG_FGBG_IMAGE || code == Code::MEGA_MEGA_SET_FGBG_IMAGE {
                fg_pel = Mode::read_pixel(&mut src);
            }

            let mut number_to_read = run_length;

            while number_to_read > 0 && !src.eof() {
                let c_bits = core::cmp::min(8, number_to_read);

                let bitmask = src.read_u8();

                if is_first_line {
                    write_first_line_fg_bg_image::<Mode>(&mut dst, bitmask, fg_pel, c_bits);
                } else {
                    write_fg_bg_image::<Mode>(&mut dst, row_delta, bitmask, fg_pel, c_bits);
                }

                number_to_read -= c_bits;
            }
        } else if code == Code::REGULAR_COLOR_IMAGE || code == Code::MEGA_MEGA_COLOR_IMAGE {
            // Handle Color Image Orders.

            let byte_count = run_length * Mode::COLOR_DEPTH;

            for _ in 0..byte_count {
                dst.write_u8(src.read_u8());
            }
        } else if code == Code::SPECIAL_FGBG_1 {
            // Handle Special Order 1.

            const MASK_SPECIAL_FG_BG_1: u8 = 0x03;

            if is_first_line {
                write_first_line_fg_bg_image::<Mode>(&mut dst, MASK_SPECIAL_FG_BG_1, fg_pel, 8);
            } else {
                write_fg_bg_image::<Mode>(&mut dst, row_delta, MASK_SPECIAL_FG_BG_1, fg_pel, 8);
            }
        } else if code == Code::SPECIAL_FGBG_2 {
            // Handle Special Order 2.

            const MASK_SPECIAL_FG_BG_2: u8 = 0x05;

            if is_first_line {
                write_first_line_fg_bg_image::<Mode>(&mut dst, MASK_SPECIAL_FG_BG_2, fg_pel, 8);
            } else {
                write_fg_bg_image::<Mode>(&mut dst, row_delta, MASK_SPECIAL_FG_BG_2, fg_pel, 8);
            }
        } else if code == Code::SPECIAL_WHITE {
            // Handle White Order.

            Mode::write_pixel(&mut dst, Mode::WHITE_PIXEL);
        } else if code == Code::SPECIAL_BLACK {
            // Handle Black Order.

            Mode::write_pixel(&mut dst, Mode::BLACK_PIXEL);
        } else {
            // Unknown order code: skip the header byte and resynchronize.
            continue;
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct Code(u8);

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::REGULAR_BG_RUN => "REGULAR_BG_RUN",
            Self::REGULAR_FG_RUN => "REGULAR_FG_RUN",
            Self::REGULAR_COLOR_RUN => "REGULAR_COLOR_RUN",
            Self::REGULAR_FGBG_IMAGE => "REGULAR_FGBG_IMAGE",
            Self::REGULAR_COLOR_IMAGE => "REGULAR_COLOR_IMAGE",

            Self::MEGA_MEGA_BG_RUN => "MEGA_MEGA_BG_RUN",
            Self::MEGA_MEGA_FG_RUN => "MEGA_MEGA_FG_RUN",
            Self::MEGA_MEGA_SET_FG_RUN => "MEGA_MEGA_SET_FG_RUN",
            Self::MEGA_MEGA_DITHERED_RUN => "MEGA_MEGA_DITHERED_RUN",
            Self::MEGA_MEGA_COLOR_RUN => "MEGA_MEGA_COLOR_RUN",
            Self::MEGA_MEGA_FGBG_IMAGE => "MEGA_MEGA_FGBG_IMAGE",
            Self::MEGA_MEGA_SET_FGBG_IMAGE => "MEGA_MEGA_SET_FGBG_IMAGE",
            Self::MEGA_MEGA_COLOR_IMAGE => "MEGA_MEGA_COLOR_IMAGE",

            Self::LITE_SET_FG_FG_RUN => "LITE_SET_FG_FG_RUN",
            Self::LITE_DITHERED_RUN => "LITE_DITHERED_RUN",
            Self::LITE_SET_FG_FGBG_IMAGE => "LITE_SET_FG_FGBG_IMAGE",

            Self::SPECIAL_FGBG_1 => "SPECIAL_FGBG_1",
            Self::SPECIAL_FGBG_2 => "SPECIAL_FGBG_2",
            Self::SPECIAL_WHITE => "SPECIAL_WHITE",
            Self::SPECIAL_BLACK => "SPECIAL_BLACK",

            _ => "UNKNOWN",
        };

        write!(f, "Code(0x{:02X}-{name})", self.0)
    }
}

impl Code {
    const REGULAR_BG_RUN: Code = Code(0x00);
    const REGULAR_FG_RUN: Code = Code(0x01);
    const REGULAR_FGBG_IMAGE: Code = Code(0x02);
    const REGULAR_COLOR_RUN: Code = Code(0x03);
    const REGULAR_COLOR_IMAGE: Code = Code(0x04);

    const MEGA_MEGA_BG_RUN: Code = Code(0xF0);
    const MEGA_MEGA_FG_RUN: Code = Code(0xF1);
    const MEGA_MEGA_FGBG_IMAGE: Code = Code(0xF2);
    const MEGA_MEGA_COLOR_RUN: Code = Code(0xF3);
    const MEGA_MEGA_COLOR_IMAGE: Code = Code(0xF4);
    const MEGA_MEGA_SET_FG_RUN: Code = Code(0xF6);
    const MEGA_MEGA_SET_FGBG_IMAGE: Code = Code(0xF7);
    const MEGA_MEGA_DITHERED_RUN: Code = Code(0xF8);

    const LITE_SET_FG_FG_RUN: Code = Code(0x0C);
    const LITE_SET_FG_FGBG_IMAGE: Code = Code(0x0D);
    const LITE_DITHERED_RUN: Code = Code(0x0E);

    const SPECIAL_FGBG_1: Code = Code(0xF9);
    const SPECIAL_FGBG_2: Code = Code(0xFA);
    const SPECIAL_WHITE: Code = Code(0xFD);
    const SPECIAL_BLACK: Code = Code(0xFE);

    fn decode(header: u8) -> Self {
        if (header & 0xC0) != 0xC0 {
            // REGULAR orders
            // (000x xxxx, 001x xxxx, 010x xxxx, 011x xxxx, 100x xxxx)
            Code(header >> 5)
        } else if (header & 0xF0) == 0xF0 {
            // MEGA and SPECIAL orders (0xF*)
            Code(header)
        } else {
            // LITE orders
            // (1100 xxxx, 1101 xxxx, 1110 xxxx)
            Code(header >> 4)
        }
    }

    /// Extract the run length of a compression order.
    fn extract_run_length(self, header: u8, src: &mut Buf<'_>) -> usize {
        match self {
            Self::REGULAR_FGBG_IMAGE => extract_run_length_fg_bg(header, MASK_REGULAR_RUN_LENGTH, src),

            Self::LITE_SET_FG_FGBG_IMAGE => extract_run_length_fg_bg(header, MASK_LITE_RUN_LENGTH, src),

            Self::REGULAR_BG_RUN | Self::REGULAR_FG_RUN | Self::REGULAR_COLOR_RUN | Self::REGULAR_COLOR_IMAGE => {
                extract_run_length_regular(header, src)
            }

            Self::LITE_SET_FG_FG_RUN | Self::LITE_DITHERED_RUN => extract_run_length_lite(header, src),

            Self::MEGA_MEGA_BG_RUN
            | Self::MEGA_MEGA_FG_RUN
            | Self::MEGA_MEGA_SET_FG_RUN
            | Self::MEGA_MEGA_DITHERED_RUN
            | Self::MEGA_MEGA_COLOR_RUN
            | Self::MEGA_MEGA_FGBG_IMAGE
            | Self::MEGA_MEGA_SET_FGBG_IMAGE
            | Self::MEGA_MEGA_COLOR_IMAGE => usize::from(src.read_u16()),

            Self::SPECIAL_FGBG_1 | Self::SPECIAL_FGBG_2 | Self::SPECIAL_WHITE | Self::SPECIAL_BLACK => 0,

            _ => 0,
        }
    }
}

const MASK_REGULAR_RUN_LENGTH: u8 = 0x1F;
const MASK_LITE_RUN_LENGTH: u8 = 0x0F;

/// Extract the run length of a Foreground/Background Image Order.
fn extract_run_length_fg_bg(header: u8, length_mask: u8, src: &mut Buf<'_>) -> usize {
    match header & length_mask {
        0 => usize::from(src.read_u8()) + 1,
        run_length => usize::from(run_length) * 8,
    }
}

/// Extract the run length of a regular-form compression order.
fn extract_run_length_regular(header: u8, src: &mut Buf<'_>) -> usize {
    match header & MASK_REGULAR_RUN_LENGTH {
        // An extended (MEGA) run.
        0 => usize::from(src.read_u8()) + 32,
        run_length => usize::from(run_length),
    }
}

fn extract_run_length_lite(header: u8, src: &mut Buf<'_>) -> usize {
    match header & MASK_LITE_RUN_LENGTH {
        // An extended (MEGA) run.
        0 => usize::from(src.read_u8()) + 16,
        run_length => usize::from(run_length),
    }
}

/// Bounds-checked source buffer: reads past the end yield zero.
struct Buf<'a> {
    inner: &'a [u8],
    pos: usize,
}

impl<'a> Buf<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { inner: bytes, pos: 0 }
    }

    fn read<const N: usize>(&mut self) -> [u8; N] {
        let mut bytes = [0; N];
        let available = self.inner.len().saturating_sub(self.pos);
        let n = core::cmp::min(N, available);
        bytes[..n].copy_from_slice(&self.inner[self.pos..self.pos + n]);
        self.pos += n;
        bytes
    }

    fn read_u8(&mut self) -> u8 {
        u8::from_le_bytes(self.read::<1>())
    }

    fn read_u16(&mut self) -> u16 {
        u16::from_le_bytes(self.read::<2>())
    }

    fn read_u24(&mut self) -> u32 {
        let bytes = self.read::<3>();
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
    }

    fn read_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.read::<4>())
    }

    fn eof(&self) -> bool {
        self.pos >= self.inner.len()
    }
}

/// Bounds-checked destination buffer: writes past the end are dropped.
struct BufMut<'a> {
    inner: &'a mut [u8],
    pos: usize,
}

impl<'a> BufMut<'a> {
    fn new(bytes: &'a mut [u8]) -> Self {
        Self { inner: bytes, pos: 0 }
    }

    fn is_full(&self) -> bool {
        self.pos >= self.inner.len()
    }

    fn write(&mut self, bytes: &[u8]) {
        let available = self.inner.len().saturating_sub(self.pos);
        let n = core::cmp::min(bytes.len(), available);
        self.inner[self.pos..self.pos + n].copy_from_slice(&bytes[..n]);
        self.pos += n;
    }

    fn write_u8(&mut self, value: u8) {
        self.write(&[value]);
    }

    fn write_u16(&mut self, value: u16) {
        self.write(&value.to_le_bytes());
    }

    fn write_u24(&mut self, value: u32) {
        self.write(&value.to_le_bytes()[..3]);
    }

    fn write_u32(&mut self, value: u32) {
        self.write(&value.to_le_bytes());
    }

    fn read_pixel_above<Mode: DepthMode>(&self, row_delta: usize) -> Mode::Pixel {
        if self.pos < row_delta {
            return Mode::BLACK_PIXEL;
        }

        let mut read_buf = Buf {
            inner: self.inner,
            pos: self.pos - row_delta,
        };
        Mode::read_pixel(&mut read_buf)
    }
}

trait DepthMode {
    type Pixel: Copy + BitXor<Output = Self::Pixel>;

    /// The color depth (in bytes per pixel) for this mode
    const COLOR_DEPTH: usize;

    /// Bits per pixel
    const BPP: usize;

    /// Pixel format for this depth mode
    const PIXEL_FORMAT: RlePixelFormat;

    /// The black pixel value
    const BLACK_PIXEL: Self::Pixel;

    /// The white pixel value
    const WHITE_PIXEL: Self::Pixel;

    /// Writes a pixel to the specified buffer
    fn write_pixel(dst: &mut BufMut<'_>, pixel: Self::Pixel);

    /// Reads a pixel from the specified buffer
    fn read_pixel(src: &mut Buf<'_>) -> Self::Pixel;
}

struct Mode8Bpp;

impl DepthMode for Mode8Bpp {
    type Pixel = u8;

    const COLOR_DEPTH: usize = 1;

    const BPP: usize = 8;

    const PIXEL_FORMAT: RlePixelFormat = RlePixelFormat::Rgb8;

    const BLACK_PIXEL: Self::Pixel = 0x00;

    const WHITE_PIXEL: Self::Pixel = 0xFF;

    fn write_pixel(dst: &mut BufMut<'_>, pixel: Self::Pixel) {
        dst.write_u8(pixel);
    }

    fn read_pixel(src: &mut Buf<'_>) -> Self::Pixel {
        src.read_u8()
    }
}

struct Mode15Bpp;

impl DepthMode for Mode15Bpp {
    type Pixel = u16;

    const COLOR_DEPTH: usize = 2;

    const BPP: usize = 15;

    const PIXEL_FORMAT: RlePixelFormat = RlePixelFormat::Rgb15;

    const BLACK_PIXEL: Self::Pixel = 0x0000;

    // 5 bits per RGB component:
    // 0111 1111 1111 1111 (binary)
    const WHITE_PIXEL: Self::Pixel = 0x7FFF;

    fn write_pixel(dst: &mut BufMut<'_>, pixel: Self::Pixel) {
        dst.write_u16(pixel);
    }

    fn read_pixel(src: &mut Buf<'_>) -> Self::Pixel {
        src.read_u16()
    }
}

struct Mode16Bpp;

impl DepthMode for Mode16Bpp {
    type Pixel = u16;

    const COLOR_DEPTH: usize = 2;

    const BPP: usize = 16;

    const PIXEL_FORMAT: RlePixelFormat = RlePixelFormat::Rgb16;

    const BLACK_PIXEL: Self::Pixel = 0x0000;

    // 5 bits for red, 6 bits for green, 5 bits for blue:
    // 1111 1111 1111 1111 (binary)
    const WHITE_PIXEL: Self::Pixel = 0xFFFF;

    fn write_pixel(dst: &mut BufMut<'_>, pixel: Self::Pixel) {
        dst.write_u16(pixel);
    }

    fn read_pixel(src: &mut Buf<'_>) -> Self::Pixel {
        src.read_u16()
    }
}

struct Mode24Bpp;

impl DepthMode for Mode24Bpp {
    type Pixel = u32;

    const COLOR_DEPTH: usize = 3;

    const BPP: usize = 24;

    const PIXEL_FORMAT: RlePixelFormat = RlePixelFormat::Rgb24;

    const BLACK_PIXEL: Self::Pixel = 0x00_0000;

    // 8 bits per RGB component:
    // 1111 1111 1111 1111 1111 1111 (binary)
    const WHITE_PIXEL: Self::Pixel = 0xFF_FFFF;

    fn write_pixel(dst: &mut BufMut<'_>, pixel: Self::Pixel) {
        dst.write_u24(pixel);
    }

    fn read_pixel(src: &mut Buf<'_>) -> Self::Pixel {
        src.read_u24()
    }
}

struct Mode32Bpp;

impl DepthMode for Mode32Bpp {
    type Pixel = u32;

    const COLOR_DEPTH: usize = 4;

    const BPP: usize = 32;

    const PIXEL_FORMAT: RlePixelFormat = RlePixelFormat::Bgra32;

    const BLACK_PIXEL: Self::Pixel = 0x0000_0000;

    const WHITE_PIXEL: Self::Pixel = 0xFFFF_FFFF;

    fn write_pixel(dst: &mut BufMut<'_>, pixel: Self::Pixel) {
        dst.write_u32(pixel);
    }

    fn read_pixel(src: &mut Buf<'_>) -> Self::Pixel {
        src.read_u32()
    }
}

/// Writes a foreground/background image to a destination buffer.
fn write_fg_bg_image<Mode: DepthMode>(
    dst: &mut BufMut<'_>,
    row_delta: usize,
    bitmask: u8,
    fg_pel: Mode::Pixel,
    c_bits: usize,
) {
    let mut mask = 0x01;

    for _ in 0..c_bits {
        let above_pixel = dst.read_pixel_above::<Mode>(row_delta);

        if bitmask & mask != 0 {
            Mode::write_pixel(dst, above_pixel ^ fg_pel);
        } else {
            Mode::write_pixel(dst, above_pixel);
        }

        mask <<= 1;
    }
}

/// Writes a foreground/background image to the first scanline of a destination buffer.
fn write_first_line_fg_bg_image<Mode: DepthMode>(dst: &mut BufMut<'_>, bitmask: u8, fg_pel: Mode::Pixel, c_bits: usize) {
    let mut mask = 0x01;

    for _ in 0..c_bits {
        if bitmask & mask != 0 {
            Mode::write_pixel(dst, fg_pel);
        } else {
            Mode::write_pixel(dst, Mode::BLACK_PIXEL);
        }

        mask <<= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_run_order_extraction_16_bpp() {
        // 0x63: regular-form order, code 0b011 (color run), run length 3.
        let src = [0x63, 0x34, 0x12];
        let mut dst = Vec::new();

        let format = decompress(&src[..], &mut dst, 128usize, 2usize, 16usize).unwrap();

        assert_eq!(format, RlePixelFormat::Rgb16);
        assert_eq!(&dst[..6], &[0x34, 0x12, 0x34, 0x12, 0x34, 0x12]);
        assert!(dst[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn white_and_black_orders() {
        let src = [0xFD, 0xFE];
        let mut dst = Vec::new();

        decompress_16_bpp(&src[..], &mut dst, 2usize, 1usize).unwrap();

        assert_eq!(dst, vec![0xFF, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn foreground_run_xors_with_previous_scanline() {
        // First line: SET_FG + FG run of 2 with foreground 0x00FF,
        // second line: FG run of 2 XORing against the line above.
        let src = [0xC2, 0xFF, 0x00, 0x22];
        let mut dst = Vec::new();

        decompress_16_bpp(&src[..], &mut dst, 2usize, 2usize).unwrap();

        assert_eq!(&dst[..4], &[0xFF, 0x00, 0xFF, 0x00]);
        // 0x00FF ^ 0x00FF = 0
        assert_eq!(&dst[4..], &[0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn background_run_emits_black_then_copies_line_above() {
        // Line 1: color run of 2 (0xABCD), line 2: background run of 2.
        let src = [0x62, 0xCD, 0xAB, 0x02];
        let mut dst = Vec::new();

        decompress_16_bpp(&src[..], &mut dst, 2usize, 2usize).unwrap();

        assert_eq!(&dst[..4], &[0xCD, 0xAB, 0xCD, 0xAB]);
        assert_eq!(&dst[4..], &[0xCD, 0xAB, 0xCD, 0xAB]);
    }

    #[test]
    fn truncated_input_is_tolerated() {
        // Color image order promising 4 pixels with only one byte of data.
        let src = [0x84, 0xAA];
        let mut dst = Vec::new();

        let result = decompress_16_bpp(&src[..], &mut dst, 4usize, 1usize);

        assert!(result.is_ok());
        assert_eq!(dst[0], 0xAA);
    }

    #[test]
    fn unknown_order_code_is_skipped() {
        // 0xFB is not a known order; the white order after it must still run.
        let src = [0xFB, 0xFD];
        let mut dst = Vec::new();

        decompress_16_bpp(&src[..], &mut dst, 1usize, 1usize).unwrap();

        assert_eq!(dst, vec![0xFF, 0xFF]);
    }

    #[test]
    fn empty_image_is_rejected() {
        let mut dst = Vec::new();
        assert_eq!(
            decompress_16_bpp(&[][..], &mut dst, 0usize, 1usize),
            Err(RleError::EmptyImage)
        );
    }

    #[test]
    fn invalid_bpp_is_rejected() {
        let mut dst = Vec::new();
        assert_eq!(
            decompress(&[][..], &mut dst, 1usize, 1usize, 13usize),
            Err(RleError::InvalidBpp { bpp: 13 })
        );
    }
}
