//! NSCodec bitmap codec, [MS-RDPNSC].
//!
//! The stream carries four AYCoCg planes (luma, orange chroma, green chroma,
//! optional alpha), each independently RLE-compressed, with optional 2x2
//! chroma subsampling and a color-loss level applied to the chroma planes.

use cobalt_core::ReadCursor;
use thiserror::Error;

const STREAM_HEADER_SIZE: usize = 20;
const RLE_END_DATA_SIZE: usize = 4;

#[derive(Debug, Error)]
pub enum NsCodecError {
    #[error("NSCodec stream is too short for the bitmap stream header")]
    TruncatedHeader,

    #[error("invalid color loss level: {0}")]
    InvalidColorLossLevel(u8),

    #[error("plane byte counts exceed the remaining stream size")]
    InvalidPlaneByteCount,

    #[error("RLE plane payload is truncated")]
    TruncatedPlanePayload,

    #[error("RLE plane payload does not fit the expected plane size")]
    OverlongPlanePayload,
}

/// TS_NSCODEC_BITMAP_STREAM header.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BitmapStreamHeader {
    luma_plane_byte_count: usize,
    orange_chroma_plane_byte_count: usize,
    green_chroma_plane_byte_count: usize,
    alpha_plane_byte_count: usize,
    color_loss_level: u8,
    chroma_subsampling: bool,
}

impl BitmapStreamHeader {
    fn decode(src: &mut ReadCursor<'_>) -> Result<Self, NsCodecError> {
        if src.len() < STREAM_HEADER_SIZE {
            return Err(NsCodecError::TruncatedHeader);
        }

        let luma_plane_byte_count = src.read_u32() as usize;
        let orange_chroma_plane_byte_count = src.read_u32() as usize;
        let green_chroma_plane_byte_count = src.read_u32() as usize;
        let alpha_plane_byte_count = src.read_u32() as usize;
        let color_loss_level = src.read_u8();
        let chroma_subsampling = src.read_u8() != 0;
        let _reserved = src.read_u16();

        if !(1..=7).contains(&color_loss_level) {
            return Err(NsCodecError::InvalidColorLossLevel(color_loss_level));
        }

        Ok(Self {
            luma_plane_byte_count,
            orange_chroma_plane_byte_count,
            green_chroma_plane_byte_count,
            alpha_plane_byte_count,
            color_loss_level,
            chroma_subsampling,
        })
    }
}

/// Decodes an NSCodec bitmap stream into a top-down RGBA image of
/// `width * height` pixels.
pub fn decode_bitmap_stream_to_rgba(
    src: &[u8],
    dst: &mut Vec<u8>,
    width: usize,
    height: usize,
) -> Result<(), NsCodecError> {
    let mut cursor = ReadCursor::new(src);
    let header = BitmapStreamHeader::decode(&mut cursor)?;

    let total_plane_bytes = header
        .luma_plane_byte_count
        .checked_add(header.orange_chroma_plane_byte_count)
        .and_then(|n| n.checked_add(header.green_chroma_plane_byte_count))
        .and_then(|n| n.checked_add(header.alpha_plane_byte_count))
        .ok_or(NsCodecError::InvalidPlaneByteCount)?;

    if total_plane_bytes > cursor.len() {
        return Err(NsCodecError::InvalidPlaneByteCount);
    }

    let (luma_width, luma_height, chroma_width, chroma_height) = if header.chroma_subsampling {
        let luma_width = width.div_ceil(8) * 8;
        (luma_width, height, luma_width / 2, height.div_ceil(2))
    } else {
        (width, height, width, height)
    };

    let luma_size = luma_width * luma_height;
    let chroma_size = chroma_width * chroma_height;

    let luma_data = cursor.read_slice(header.luma_plane_byte_count);
    let orange_data = cursor.read_slice(header.orange_chroma_plane_byte_count);
    let green_data = cursor.read_slice(header.green_chroma_plane_byte_count);
    let alpha_data = cursor.read_slice(header.alpha_plane_byte_count);

    let luma = rle_decompress(luma_data, luma_size)?;
    let mut orange = rle_decompress(orange_data, chroma_size)?;
    let mut green = rle_decompress(green_data, chroma_size)?;

    let alpha = if header.alpha_plane_byte_count > 0 {
        Some(rle_decompress(alpha_data, width * height)?)
    } else {
        None
    };

    if header.color_loss_level > 1 {
        restore_color_loss(&mut orange, header.color_loss_level);
        restore_color_loss(&mut green, header.color_loss_level);
    }

    let (orange, green) = if header.chroma_subsampling {
        (
            supersample_chroma(&orange, chroma_width, chroma_height, luma_width, luma_height),
            supersample_chroma(&green, chroma_width, chroma_height, luma_width, luma_height),
        )
    } else {
        (orange, green)
    };

    dst.clear();
    dst.reserve(width * height * 4);

    for y in 0..height {
        for x in 0..width {
            let plane_idx = y * luma_width + x;

            let [r, g, b] = aycocg_to_rgb(luma[plane_idx], orange[plane_idx], green[plane_idx]);
            let a = alpha.as_ref().map(|plane| plane[y * width + x]).unwrap_or(0xFF);

            dst.extend_from_slice(&[r, g, b, a]);
        }
    }

    Ok(())
}

/// Decompresses a single NSCodec plane, NSCODEC_RLE_SEGMENTS.
///
/// The payload ends with a fixed 4-byte tail holding the last four raw bytes
/// of the plane; the segment loop stops as soon as the produced size reaches
/// `expected - 4` and the tail is appended afterwards. A payload whose length
/// already equals the expected plane size is raw.
fn rle_decompress(src: &[u8], expected: usize) -> Result<Vec<u8>, NsCodecError> {
    if src.len() == expected {
        return Ok(src.to_vec());
    }

    if src.len() < RLE_END_DATA_SIZE {
        return Err(NsCodecError::TruncatedPlanePayload);
    }

    let (segments, end_data) = src.split_at(src.len() - RLE_END_DATA_SIZE);
    let body_size = expected.saturating_sub(RLE_END_DATA_SIZE);

    let mut out = Vec::with_capacity(expected);
    let mut pos = 0;

    while out.len() < body_size && pos < segments.len() {
        let header = segments[pos];
        pos += 1;

        if header & 0x80 != 0 {
            // Run segment: low 7 bits are the run length, zero means the next
            // byte plus 128.
            let mut run_length = usize::from(header & 0x7F);
            if run_length == 0 {
                run_length = usize::from(*segments.get(pos).ok_or(NsCodecError::TruncatedPlanePayload)?) + 128;
                pos += 1;
            }

            let value = *segments.get(pos).ok_or(NsCodecError::TruncatedPlanePayload)?;
            pos += 1;

            if out.len() + run_length > expected {
                return Err(NsCodecError::OverlongPlanePayload);
            }

            out.resize(out.len() + run_length, value);
        } else {
            // Literal segment: the header byte is the literal length, zero
            // means the next byte plus 128.
            let mut literal_length = usize::from(header);
            if literal_length == 0 {
                literal_length = usize::from(*segments.get(pos).ok_or(NsCodecError::TruncatedPlanePayload)?) + 128;
                pos += 1;
            }

            if pos + literal_length > segments.len() {
                return Err(NsCodecError::TruncatedPlanePayload);
            }

            if out.len() + literal_length > expected {
                return Err(NsCodecError::OverlongPlanePayload);
            }

            out.extend_from_slice(&segments[pos..pos + literal_length]);
            pos += literal_length;
        }
    }

    out.extend_from_slice(end_data);

    // Commonly seen servers ship planes that decode short of the advertised
    // size; the remainder is zero.
    out.resize(expected, 0);

    Ok(out)
}

/// Reverses the color-loss reduction applied to a chroma plane.
fn restore_color_loss(plane: &mut [u8], color_loss_level: u8) {
    let shift = color_loss_level - 1;

    for byte in plane.iter_mut() {
        *byte = u8::try_from((u32::from(*byte) << shift).min(255)).expect("clamped to u8 range");
    }
}

/// Replicates each subsampled chroma pixel into a 2x2 block of the luma-sized
/// plane, clamping at the right and bottom edges.
fn supersample_chroma(
    plane: &[u8],
    plane_width: usize,
    plane_height: usize,
    target_width: usize,
    target_height: usize,
) -> Vec<u8> {
    let mut out = vec![0; target_width * target_height];

    for y in 0..target_height {
        let src_y = (y / 2).min(plane_height - 1);

        for x in 0..target_width {
            let src_x = (x / 2).min(plane_width - 1);
            out[y * target_width + x] = plane[src_y * plane_width + src_x];
        }
    }

    out
}

/// AYCoCg to RGB conversion for a single pixel.
fn aycocg_to_rgb(y: u8, co: u8, cg: u8) -> [u8; 3] {
    let clip_i16 = |v: i16| u8::try_from(v.clamp(0, 255)).expect("clamped to u8 range");

    let y = i16::from(y);
    let co = i16::from(co) - 128;
    let cg = i16::from(cg) - 128;

    let t = y - cg;

    [clip_i16(t + co), clip_i16(y + cg), clip_i16(t - co)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(planes: [&[u8]; 4], color_loss_level: u8, chroma_subsampling: u8) -> Vec<u8> {
        let mut src = Vec::new();
        for plane in &planes {
            src.extend_from_slice(&u32::try_from(plane.len()).unwrap().to_le_bytes());
        }
        src.push(color_loss_level);
        src.push(chroma_subsampling);
        src.extend_from_slice(&[0, 0]);
        for plane in &planes {
            src.extend_from_slice(plane);
        }
        src
    }

    #[test]
    fn one_gray_pixel() {
        let src = stream([&[128], &[128], &[128], &[]], 1, 0);

        let mut dst = Vec::new();
        decode_bitmap_stream_to_rgba(&src, &mut dst, 1, 1).unwrap();

        assert_eq!(dst, vec![128, 128, 128, 255]);
    }

    #[test]
    fn neutral_chroma_yields_grayscale() {
        for y in [0u8, 1, 17, 128, 200, 255] {
            let [r, g, b] = aycocg_to_rgb(y, 128, 128);
            assert_eq!([r, g, b], [y, y, y]);
        }
    }

    #[test]
    fn conversion_clamps_at_extremes() {
        assert_eq!(aycocg_to_rgb(255, 255, 255), [255, 255, 1]);
        assert_eq!(aycocg_to_rgb(0, 0, 0), [0, 0, 255]);
    }

    #[test]
    fn color_loss_restore_is_shift_and_clamp() {
        for level in 2..=7u8 {
            for byte in [0u8, 1, 3, 64, 127, 255] {
                let mut plane = [byte];
                restore_color_loss(&mut plane, level);
                assert_eq!(
                    u32::from(plane[0]),
                    (u32::from(byte) << (level - 1)).min(255),
                    "level {level}, byte {byte}"
                );
            }
        }
    }

    #[test]
    fn raw_payload_is_passed_through() {
        let data: Vec<u8> = (0..16).collect();
        assert_eq!(rle_decompress(&data, 16).unwrap(), data);
    }

    #[test]
    fn rle_run_and_literal_segments() {
        // 4x2 plane (expected 8): run of 4 times 0xAA, then the 4-byte tail.
        let src = [0x84, 0xAA, 1, 2, 3, 4];
        assert_eq!(rle_decompress(&src, 8).unwrap(), vec![0xAA, 0xAA, 0xAA, 0xAA, 1, 2, 3, 4]);

        // Literal segment of 2 bytes, short of expected - 4: zero-padded.
        let src = [0x02, 0x55, 0x66, 9, 9, 9, 9];
        assert_eq!(rle_decompress(&src, 12).unwrap(), vec![0x55, 0x66, 9, 9, 9, 9, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn rle_stops_at_reserved_tail_boundary() {
        // The run alone already produces expected - 4 bytes; the remaining
        // segment bytes are ignored and the tail is appended.
        let src = [0x84, 0x11, 0x02, 0x22, 0x33, 5, 6, 7, 8];
        assert_eq!(rle_decompress(&src, 8).unwrap(), vec![0x11, 0x11, 0x11, 0x11, 5, 6, 7, 8]);
    }

    #[test]
    fn chroma_supersampling_replicates_2x2_blocks() {
        // 2x1 chroma plane expanded to 4x2.
        let out = supersample_chroma(&[10, 20], 2, 1, 4, 2);
        assert_eq!(out, vec![10, 10, 20, 20, 10, 10, 20, 20]);
    }

    #[test]
    fn invalid_color_loss_level_is_rejected() {
        let src = stream([&[128], &[128], &[128], &[]], 0, 0);

        let mut dst = Vec::new();
        assert!(matches!(
            decode_bitmap_stream_to_rgba(&src, &mut dst, 1, 1),
            Err(NsCodecError::InvalidColorLossLevel(0))
        ));
    }

    #[test]
    fn plane_count_larger_than_stream_is_rejected() {
        let mut src = stream([&[128], &[128], &[128], &[]], 1, 0);
        src.truncate(STREAM_HEADER_SIZE + 1);

        let mut dst = Vec::new();
        assert!(matches!(
            decode_bitmap_stream_to_rgba(&src, &mut dst, 1, 1),
            Err(NsCodecError::InvalidPlaneByteCount)
        ));
    }

    #[test]
    fn subsampled_planes_compose_at_logical_size() {
        // 3x1 image: luma padded to 8 wide, chroma 4x1.
        let luma: Vec<u8> = vec![100; 8];
        let chroma: Vec<u8> = vec![128; 4];
        let src = stream([&luma, &chroma, &chroma, &[]], 1, 1);

        let mut dst = Vec::new();
        decode_bitmap_stream_to_rgba(&src, &mut dst, 3, 1).unwrap();

        assert_eq!(dst.len(), 3 * 4);
        for px in dst.chunks_exact(4) {
            assert_eq!(px, &[100, 100, 100, 255]);
        }
    }
}
