//! Owned pointer updates surfaced to the display sink.

use cobalt_pdu::pointer::PointerUpdateData;

/// A cursor change or move, forwarded to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerUpdate {
    Hidden,
    Default,
    Position { x: u16, y: u16 },
    Shape(PointerShape),
    Cached { cache_index: u16 },
}

/// A cursor bitmap: XOR color data and AND mask, plus the hotspot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerShape {
    pub cache_index: u16,
    pub hot_spot_x: u16,
    pub hot_spot_y: u16,
    pub width: u16,
    pub height: u16,
    /// Bits per pixel of the XOR data; 24 for the classic color pointer.
    pub xor_bpp: u16,
    pub xor_mask: Vec<u8>,
    pub and_mask: Vec<u8>,
}

impl PointerUpdate {
    pub fn from_pdu(pdu: PointerUpdateData<'_>) -> Self {
        match pdu {
            PointerUpdateData::SetHidden => Self::Hidden,
            PointerUpdateData::SetDefault => Self::Default,
            PointerUpdateData::SetPosition(position) => Self::Position {
                x: position.position.x,
                y: position.position.y,
            },
            PointerUpdateData::Color(color) => Self::Shape(PointerShape {
                cache_index: color.cache_index,
                hot_spot_x: color.hot_spot.x,
                hot_spot_y: color.hot_spot.y,
                width: color.width,
                height: color.height,
                xor_bpp: 24,
                xor_mask: color.xor_mask.to_vec(),
                and_mask: color.and_mask.to_vec(),
            }),
            PointerUpdateData::Cached(cached) => Self::Cached {
                cache_index: cached.cache_index,
            },
            PointerUpdateData::New(new) => Self::Shape(PointerShape {
                cache_index: new.color_pointer.cache_index,
                hot_spot_x: new.color_pointer.hot_spot.x,
                hot_spot_y: new.color_pointer.hot_spot.y,
                width: new.color_pointer.width,
                height: new.color_pointer.height,
                xor_bpp: new.xor_bpp,
                xor_mask: new.color_pointer.xor_mask.to_vec(),
                and_mask: new.color_pointer.and_mask.to_vec(),
            }),
            PointerUpdateData::Large(large) => Self::Shape(PointerShape {
                cache_index: large.cache_index,
                hot_spot_x: large.hot_spot.x,
                hot_spot_y: large.hot_spot.y,
                width: large.width,
                height: large.height,
                xor_bpp: large.xor_bpp,
                xor_mask: large.xor_mask.to_vec(),
                and_mask: large.and_mask.to_vec(),
            }),
        }
    }
}
