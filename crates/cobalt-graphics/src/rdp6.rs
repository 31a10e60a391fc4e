//! RDP6 Bitmap Stream (planar) codec, [MS-RDPEGDI] 2.2.2.5.
//!
//! The payload carries up to four independent 8-bpp color planes (alpha, red,
//! green, blue), either raw or compressed with a per-scanline delta RLE.
//! Planes are stored bottom-up; the decoder composes a top-down RGBA image.

use thiserror::Error;

const FORMAT_HEADER_RLE: u8 = 0x10;
const FORMAT_HEADER_NO_ALPHA: u8 = 0x20;

#[derive(Debug, Error)]
pub enum PlanarDecodeError {
    #[error("planar payload is empty")]
    EmptyPayload,

    #[error("not enough data for raw color planes: expected {expected} bytes, got {actual}")]
    InvalidRawPlanesSize { expected: usize, actual: usize },

    #[error("invalid RLE segment header")]
    InvalidSegmentHeader,

    #[error("decoded scanline segments length exceeds scanline length")]
    SegmentDoNotFitScanline,

    #[error("RLE plane data is truncated")]
    TruncatedPlaneData,
}

/// Decodes an RDP6 bitmap stream into a top-down RGBA image.
///
/// `dst` is cleared and filled with exactly `width * height * 4` bytes.
pub fn decode_bitmap_stream_to_rgba(
    src: &[u8],
    dst: &mut Vec<u8>,
    width: usize,
    height: usize,
) -> Result<(), PlanarDecodeError> {
    let Some((&format_header, payload)) = src.split_first() else {
        return Err(PlanarDecodeError::EmptyPayload);
    };

    let use_rle = format_header & FORMAT_HEADER_RLE != 0;
    let use_alpha = format_header & FORMAT_HEADER_NO_ALPHA == 0;

    let plane_size = width * height;
    let plane_count = if use_alpha { 4 } else { 3 };

    let mut planes = vec![0; plane_size * plane_count];

    if use_rle {
        let mut src_offset = 0;

        for plane in planes.chunks_exact_mut(plane_size) {
            src_offset += RlePlaneDecoder::new(width, height).decode(&payload[src_offset..], plane)?;
        }
    } else {
        let expected = plane_size * plane_count;

        if payload.len() < expected {
            return Err(PlanarDecodeError::InvalidRawPlanesSize {
                expected,
                actual: payload.len(),
            });
        }

        planes.copy_from_slice(&payload[..expected]);
    }

    let (alpha_plane, color_planes) = if use_alpha {
        let (alpha, color) = planes.split_at(plane_size);
        (Some(alpha), color)
    } else {
        (None, planes.as_slice())
    };

    let r_plane = &color_planes[..plane_size];
    let g_plane = &color_planes[plane_size..plane_size * 2];
    let b_plane = &color_planes[plane_size * 2..];

    dst.clear();
    dst.reserve(plane_size * 4);

    // Planes are bottom-up, the output image is top-down.
    for y in 0..height {
        let src_row = (height - 1 - y) * width;

        for x in 0..width {
            let idx = src_row + x;
            let a = alpha_plane.map(|plane| plane[idx]).unwrap_or(0xFF);

            dst.extend_from_slice(&[r_plane[idx], g_plane[idx], b_plane[idx], a]);
        }
    }

    Ok(())
}

/// Maximum possible segment size is 47 (run_length control = 2,
/// raw_bytes_count = 15), which repeats the last decoded byte 32 +
/// raw_bytes_count times.
const MAX_DECODED_SEGMENT_SIZE: usize = 47;

/// RLE-encoded color plane decoder for the RDP6 bitmap stream.
#[derive(Debug)]
struct RlePlaneDecoder {
    /// Encoding is per-scanline: the last decoded byte resets to 0 at the
    /// start of each scanline.
    last_decoded_byte: u8,

    width: usize,
    height: usize,

    decoded_data: [u8; MAX_DECODED_SEGMENT_SIZE],
    decoded_data_len: usize,
}

impl RlePlaneDecoder {
    fn new(width: usize, height: usize) -> Self {
        Self {
            last_decoded_byte: 0,
            width,
            height,
            decoded_data: [0; MAX_DECODED_SEGMENT_SIZE],
            decoded_data_len: 0,
        }
    }

    fn decompress_next_segment(&mut self, src: &[u8]) -> Result<usize, PlanarDecodeError> {
        let Some((&control_byte, rest)) = src.split_first() else {
            return Err(PlanarDecodeError::TruncatedPlaneData);
        };

        if control_byte == 0 {
            return Err(PlanarDecodeError::InvalidSegmentHeader);
        }

        let rle_bytes_field = usize::from(control_byte & 0x0F);
        let raw_bytes_field = usize::from((control_byte >> 4) & 0x0F);

        let (run_length, raw_bytes_count) = match rle_bytes_field {
            1 => (16 + raw_bytes_field, 0),
            2 => (32 + raw_bytes_field, 0),
            rle_control => (rle_control, raw_bytes_field),
        };

        if rest.len() < raw_bytes_count {
            return Err(PlanarDecodeError::TruncatedPlaneData);
        }

        self.decoded_data_len = raw_bytes_count + run_length;
        self.decoded_data[..raw_bytes_count].copy_from_slice(&rest[..raw_bytes_count]);

        if raw_bytes_count > 0 {
            // save last decoded byte for the next segments decoding
            self.last_decoded_byte = self.decoded_data[raw_bytes_count - 1];
        }

        self.decoded_data[raw_bytes_count..self.decoded_data_len].fill(self.last_decoded_byte);

        Ok(raw_bytes_count + 1)
    }

    /// Decodes a single RLE-encoded scanline, without applying the delta
    /// transformation.
    fn decode_scanline(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize, PlanarDecodeError> {
        let mut decoded_columns = 0;
        let mut read_bytes = 0;

        self.last_decoded_byte = 0;

        while decoded_columns < self.width {
            read_bytes += self.decompress_next_segment(&src[read_bytes.min(src.len())..])?;

            if decoded_columns + self.decoded_data_len > self.width {
                return Err(PlanarDecodeError::SegmentDoNotFitScanline);
            }

            dst[decoded_columns..decoded_columns + self.decoded_data_len]
                .copy_from_slice(&self.decoded_data[..self.decoded_data_len]);

            decoded_columns += self.decoded_data_len;
        }

        Ok(read_bytes)
    }

    /// Applies the delta transformation described in 3.1.9.2.3 of
    /// [MS-RDPEGDI]: bit 0 is the sign, the upper bits are the magnitude, a
    /// negative delta is `-(magnitude + 1)`. The result saturates to
    /// `[0, 255]`.
    fn resolve_scanline_delta(prev_line: &[u8], current_scanline: &mut [u8]) {
        debug_assert!(prev_line.len() == current_scanline.len());

        current_scanline.iter_mut().zip(prev_line.iter()).for_each(|(dst, src)| {
            let delta = *dst;
            let value_above = *src;

            let magnitude = delta >> 1;

            *dst = if delta & 0x01 != 0 {
                value_above.saturating_sub(magnitude.saturating_add(1))
            } else {
                value_above.saturating_add(magnitude)
            };
        });
    }

    fn decode(mut self, src: &[u8], dst: &mut [u8]) -> Result<usize, PlanarDecodeError> {
        let mut read_bytes = 0;

        read_bytes += self.decode_scanline(src, dst)?;

        let (mut prev_scanline, mut dst) = dst.split_at_mut(self.width);

        for _ in 1..self.height {
            let current_scanline = &mut dst[..self.width];

            read_bytes += self.decode_scanline(&src[read_bytes.min(src.len())..], current_scanline)?;
            Self::resolve_scanline_delta(prev_scanline, current_scanline);

            (prev_scanline, dst) = dst.split_at_mut(self.width);
        }

        Ok(read_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_planes_are_flipped_bottom_up() {
        // 2x2, no alpha, raw planes. R plane rows are [a, b] then [c, d];
        // output rows must come out as [c, d] then [a, b].
        let mut src = vec![FORMAT_HEADER_NO_ALPHA];
        src.extend_from_slice(&[0x0A, 0x0B, 0x0C, 0x0D]); // R
        src.extend_from_slice(&[0; 4]); // G
        src.extend_from_slice(&[0; 4]); // B

        let mut dst = Vec::new();
        decode_bitmap_stream_to_rgba(&src, &mut dst, 2, 2).unwrap();

        let r: Vec<u8> = dst.chunks_exact(4).map(|px| px[0]).collect();
        assert_eq!(r, vec![0x0C, 0x0D, 0x0A, 0x0B]);
        assert!(dst.chunks_exact(4).all(|px| px[3] == 0xFF));
    }

    #[test]
    fn red_no_alpha_2x2() {
        let mut src = vec![FORMAT_HEADER_NO_ALPHA];
        src.extend_from_slice(&[0xFF; 4]); // R
        src.extend_from_slice(&[0x00; 4]); // G
        src.extend_from_slice(&[0x00; 4]); // B

        let mut dst = Vec::new();
        decode_bitmap_stream_to_rgba(&src, &mut dst, 2, 2).unwrap();

        for px in dst.chunks_exact(4) {
            assert_eq!(px, &[0xFF, 0x00, 0x00, 0xFF]);
        }
    }

    #[test]
    fn rle_scanline_raw_then_run() {
        // 4x1 scanlines: control 0x13 = 1 raw byte then 3 copies of it.
        let mut src = vec![FORMAT_HEADER_NO_ALPHA | FORMAT_HEADER_RLE];
        for _ in 0..3 {
            src.extend_from_slice(&[0x13, 0x7F]); // plane scanline: 7F 7F 7F 7F
        }

        let mut dst = Vec::new();
        decode_bitmap_stream_to_rgba(&src, &mut dst, 4, 1).unwrap();

        for px in dst.chunks_exact(4) {
            assert_eq!(px, &[0x7F, 0x7F, 0x7F, 0xFF]);
        }
    }

    #[test]
    fn rle_delta_is_sign_magnitude_and_saturating() {
        // 1x3 single-column plane: first scanline absolute 0x10, second
        // scanline delta 0x04 (positive 2), third scanline delta 0x03
        // (negative: -(1 + 1) = -2). Control 0x10 is one raw byte, no run.
        let mut src = vec![FORMAT_HEADER_NO_ALPHA | FORMAT_HEADER_RLE];
        let plane = [0x10, 0x10, 0x10, 0x04, 0x10, 0x03];
        src.extend_from_slice(&plane); // R
        src.extend_from_slice(&plane); // G
        src.extend_from_slice(&plane); // B

        let mut dst = Vec::new();
        decode_bitmap_stream_to_rgba(&src, &mut dst, 1, 3).unwrap();

        let r: Vec<u8> = dst.chunks_exact(4).map(|px| px[0]).collect();
        // Plane rows top-to-bottom are [0x10], [0x12], [0x10]; flipped for output.
        assert_eq!(r, vec![0x10, 0x12, 0x10]);
    }

    #[test]
    fn truncated_rle_plane_is_an_error() {
        let src = vec![FORMAT_HEADER_NO_ALPHA | FORMAT_HEADER_RLE, 0x13];

        let mut dst = Vec::new();
        let result = decode_bitmap_stream_to_rgba(&src, &mut dst, 4, 1);

        assert!(matches!(result, Err(PlanarDecodeError::TruncatedPlaneData)));
    }

    #[test]
    fn short_raw_payload_is_an_error() {
        let src = vec![FORMAT_HEADER_NO_ALPHA, 0x00, 0x01];

        let mut dst = Vec::new();
        let result = decode_bitmap_stream_to_rgba(&src, &mut dst, 2, 2);

        assert!(matches!(result, Err(PlanarDecodeError::InvalidRawPlanesSize { .. })));
    }
}
