//! Capability sets exchanged in Demand Active / Confirm Active PDUs,
//! [MS-RDPBCGR] 2.2.7.
//!
//! The capability set is a closed tagged union keyed by a 16-bit type code;
//! bodies the client acts upon are fully typed, the rest are carried as
//! opaque buffers.

use cobalt_core::{
    cast_length, decode, ensure_fixed_part_size, ensure_size, invalid_field_err, write_padding, Decode, DecodeResult,
    Encode, EncodeResult, ReadCursor, WriteCursor,
};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

use crate::utils;

mod bitmap;
mod bitmap_cache;
mod bitmap_codecs;
mod brush;
mod frame_acknowledge;
mod general;
mod glyph_cache;
mod input;
mod large_pointer;
mod multifragment_update;
mod offscreen_bitmap_cache;
mod order;
mod pointer;
mod sound;
mod surface_commands;
mod virtual_channel;

pub use self::bitmap::{Bitmap, BitmapDrawingFlags};
pub use self::bitmap_cache::{
    BitmapCache, BitmapCacheRev2, CacheEntry, CacheFlags, CellInfo, BITMAP_CACHE_ENTRIES_NUM,
};
pub use self::bitmap_codecs::{client_codecs_capabilities, BitmapCodecs, Codec, CodecProperty, Guid, NsCodec, CLIENT_NSCODEC_ID};
pub use self::brush::{Brush, SupportLevel};
pub use self::frame_acknowledge::FrameAcknowledge;
pub use self::general::{General, GeneralExtraFlags, MajorPlatformType, MinorPlatformType, PROTOCOL_VER};
pub use self::glyph_cache::{CacheDefinition, GlyphCache, GlyphSupportLevel, GLYPH_CACHE_NUM};
pub use self::input::{Input, InputFlags};
pub use self::large_pointer::{LargePointer, LargePointerSupportFlags};
pub use self::multifragment_update::MultifragmentUpdate;
pub use self::offscreen_bitmap_cache::OffscreenBitmapCache;
pub use self::order::{Order, OrderFlags, OrderSupportExFlags, OrderSupportIndex};
pub use self::pointer::Pointer;
pub use self::sound::{Sound, SoundFlags};
pub use self::surface_commands::{CmdFlags, SurfaceCommands};
pub use self::virtual_channel::{VirtualChannel, VirtualChannelFlags};

pub const SERVER_CHANNEL_ID: u16 = 0x03EA;

const SOURCE_DESCRIPTOR_LENGTH_FIELD_SIZE: usize = 2;
const COMBINED_CAPABILITIES_LENGTH_FIELD_SIZE: usize = 2;
const NUMBER_CAPABILITIES_FIELD_SIZE: usize = 2;
const PADDING_SIZE: usize = 2;
const SESSION_ID_FIELD_SIZE: usize = 4;
const CAPABILITY_SET_TYPE_FIELD_SIZE: usize = 2;
const CAPABILITY_SET_LENGTH_FIELD_SIZE: usize = 2;
const ORIGINATOR_ID_FIELD_SIZE: usize = 2;

const NULL_TERMINATOR: &str = "\0";

/// [2.2.1.13.1] Server Demand Active PDU
///
/// [2.2.1.13.1]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/a07abad1-38bb-4a1a-96c9-253e3d5440df
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDemandActive {
    pub pdu: DemandActive,
}

impl ServerDemandActive {
    const NAME: &'static str = "ServerDemandActive";

    const FIXED_PART_SIZE: usize = SESSION_ID_FIELD_SIZE;
}

impl Encode for ServerDemandActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        self.pdu.encode(dst)?;
        dst.write_u32(0); // sessionId, ignored by the client

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.pdu.size()
    }
}

impl<'de> Decode<'de> for ServerDemandActive {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let pdu = DemandActive::decode(src)?;

        ensure_size!(in: src, size: 4);
        let _session_id = src.read_u32();

        Ok(Self { pdu })
    }
}

/// [2.2.1.13.2] Client Confirm Active PDU
///
/// [2.2.1.13.2]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/4c3c2710-0bf0-4c54-8e69-aff40ffcde66
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfirmActive {
    /// According to [MS-RDPBCGR] this field MUST be set to
    /// [`SERVER_CHANNEL_ID`]; the Microsoft client instead copies the
    /// server's PduSource, so checking it is left to the caller.
    pub originator_id: u16,
    pub pdu: DemandActive,
}

impl ClientConfirmActive {
    const NAME: &'static str = "ClientConfirmActive";

    const FIXED_PART_SIZE: usize = ORIGINATOR_ID_FIELD_SIZE;
}

impl Encode for ClientConfirmActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.originator_id);

        self.pdu.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.pdu.size()
    }
}

impl<'de> Decode<'de> for ClientConfirmActive {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let originator_id = src.read_u16();
        let pdu = DemandActive::decode(src)?;

        Ok(Self { originator_id, pdu })
    }
}

/// [2.2.1.13.1.1] Demand Active PDU Data (TS_DEMAND_ACTIVE_PDU)
///
/// [2.2.1.13.1.1]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/bd612af5-cb54-43a2-9646-438bc3ecf5db
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandActive {
    pub source_descriptor: String,
    pub capability_sets: Vec<CapabilitySet>,
}

impl DemandActive {
    const NAME: &'static str = "DemandActive";

    const FIXED_PART_SIZE: usize = SOURCE_DESCRIPTOR_LENGTH_FIELD_SIZE + COMBINED_CAPABILITIES_LENGTH_FIELD_SIZE;
}

impl Encode for DemandActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let combined_length = self.capability_sets.iter().map(Encode::size).sum::<usize>()
            + NUMBER_CAPABILITIES_FIELD_SIZE
            + PADDING_SIZE;

        dst.write_u16(cast_length!(
            Self::NAME,
            "sourceDescLen",
            self.source_descriptor.len() + NULL_TERMINATOR.len()
        )?);
        dst.write_u16(cast_length!(Self::NAME, "combinedLen", combined_length)?);
        dst.write_slice(self.source_descriptor.as_ref());
        dst.write_slice(NULL_TERMINATOR.as_bytes());
        dst.write_u16(cast_length!(Self::NAME, "len", self.capability_sets.len())?);
        write_padding!(dst, 2);

        for capability_set in self.capability_sets.iter() {
            capability_set.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + self.source_descriptor.len()
            + 1
            + NUMBER_CAPABILITIES_FIELD_SIZE
            + PADDING_SIZE
            + self.capability_sets.iter().map(Encode::size).sum::<usize>()
    }
}

impl<'de> Decode<'de> for DemandActive {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let source_descriptor_length = usize::from(src.read_u16());
        // The combined size in bytes of the numberCapabilities, pad2Octets,
        // and capabilitySets fields.
        let _combined_capabilities_length = usize::from(src.read_u16());

        ensure_size!(in: src, size: source_descriptor_length);
        let source_descriptor = utils::decode_string(
            src.read_slice(source_descriptor_length),
            utils::CharacterSet::Ansi,
            false,
        )?;

        ensure_size!(in: src, size: 2 + 2);
        let capability_sets_count = usize::from(src.read_u16());
        let _padding = src.read_u16();

        let mut capability_sets = Vec::with_capacity(capability_sets_count);
        for _ in 0..capability_sets_count {
            capability_sets.push(CapabilitySet::decode(src)?);
        }

        Ok(Self {
            source_descriptor,
            capability_sets,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilitySet {
    // mandatory
    General(General),
    Bitmap(Bitmap),
    Order(Order),
    BitmapCache(BitmapCache),
    BitmapCacheRev2(BitmapCacheRev2),
    Pointer(Pointer),
    Sound(Sound),
    Input(Input),
    Brush(Brush),
    GlyphCache(GlyphCache),
    OffscreenBitmapCache(OffscreenBitmapCache),
    VirtualChannel(VirtualChannel),

    // optional
    Control(Vec<u8>),
    WindowActivation(Vec<u8>),
    Share(Vec<u8>),
    Font(Vec<u8>),
    BitmapCacheHostSupport(Vec<u8>),
    DesktopComposition(Vec<u8>),
    MultiFragmentUpdate(MultifragmentUpdate),
    LargePointer(LargePointer),
    SurfaceCommands(SurfaceCommands),
    BitmapCodecs(BitmapCodecs),

    // other
    ColorCache(Vec<u8>),
    DrawNineGridCache(Vec<u8>),
    DrawGdiPlus(Vec<u8>),
    Rail(Vec<u8>),
    WindowList(Vec<u8>),
    FrameAcknowledge(FrameAcknowledge),
}

impl CapabilitySet {
    const NAME: &'static str = "CapabilitySet";

    const FIXED_PART_SIZE: usize = CAPABILITY_SET_TYPE_FIELD_SIZE + CAPABILITY_SET_LENGTH_FIELD_SIZE;

    fn capability_set_type(&self) -> CapabilitySetType {
        match self {
            CapabilitySet::General(_) => CapabilitySetType::General,
            CapabilitySet::Bitmap(_) => CapabilitySetType::Bitmap,
            CapabilitySet::Order(_) => CapabilitySetType::Order,
            CapabilitySet::BitmapCache(_) => CapabilitySetType::BitmapCache,
            CapabilitySet::BitmapCacheRev2(_) => CapabilitySetType::BitmapCacheRev2,
            CapabilitySet::Pointer(_) => CapabilitySetType::Pointer,
            CapabilitySet::Sound(_) => CapabilitySetType::Sound,
            CapabilitySet::Input(_) => CapabilitySetType::Input,
            CapabilitySet::Brush(_) => CapabilitySetType::Brush,
            CapabilitySet::GlyphCache(_) => CapabilitySetType::GlyphCache,
            CapabilitySet::OffscreenBitmapCache(_) => CapabilitySetType::OffscreenBitmapCache,
            CapabilitySet::VirtualChannel(_) => CapabilitySetType::VirtualChannel,
            CapabilitySet::Control(_) => CapabilitySetType::Control,
            CapabilitySet::WindowActivation(_) => CapabilitySetType::WindowActivation,
            CapabilitySet::Share(_) => CapabilitySetType::Share,
            CapabilitySet::Font(_) => CapabilitySetType::Font,
            CapabilitySet::BitmapCacheHostSupport(_) => CapabilitySetType::BitmapCacheHostSupport,
            CapabilitySet::DesktopComposition(_) => CapabilitySetType::DesktopComposition,
            CapabilitySet::MultiFragmentUpdate(_) => CapabilitySetType::MultiFragmentUpdate,
            CapabilitySet::LargePointer(_) => CapabilitySetType::LargePointer,
            CapabilitySet::SurfaceCommands(_) => CapabilitySetType::SurfaceCommands,
            CapabilitySet::BitmapCodecs(_) => CapabilitySetType::BitmapCodecs,
            CapabilitySet::ColorCache(_) => CapabilitySetType::ColorCache,
            CapabilitySet::DrawNineGridCache(_) => CapabilitySetType::DrawNineGridCache,
            CapabilitySet::DrawGdiPlus(_) => CapabilitySetType::DrawGdiPlus,
            CapabilitySet::Rail(_) => CapabilitySetType::Rail,
            CapabilitySet::WindowList(_) => CapabilitySetType::WindowList,
            CapabilitySet::FrameAcknowledge(_) => CapabilitySetType::FrameAcknowledge,
        }
    }

    fn body_size(&self) -> usize {
        match self {
            CapabilitySet::General(capset) => capset.size(),
            CapabilitySet::Bitmap(capset) => capset.size(),
            CapabilitySet::Order(capset) => capset.size(),
            CapabilitySet::BitmapCache(capset) => capset.size(),
            CapabilitySet::BitmapCacheRev2(capset) => capset.size(),
            CapabilitySet::Pointer(capset) => capset.size(),
            CapabilitySet::Sound(capset) => capset.size(),
            CapabilitySet::Input(capset) => capset.size(),
            CapabilitySet::Brush(capset) => capset.size(),
            CapabilitySet::GlyphCache(capset) => capset.size(),
            CapabilitySet::OffscreenBitmapCache(capset) => capset.size(),
            CapabilitySet::VirtualChannel(capset) => capset.size(),
            CapabilitySet::SurfaceCommands(capset) => capset.size(),
            CapabilitySet::BitmapCodecs(capset) => capset.size(),
            CapabilitySet::MultiFragmentUpdate(capset) => capset.size(),
            CapabilitySet::LargePointer(capset) => capset.size(),
            CapabilitySet::FrameAcknowledge(capset) => capset.size(),
            CapabilitySet::Control(buffer)
            | CapabilitySet::WindowActivation(buffer)
            | CapabilitySet::Share(buffer)
            | CapabilitySet::Font(buffer)
            | CapabilitySet::BitmapCacheHostSupport(buffer)
            | CapabilitySet::DesktopComposition(buffer)
            | CapabilitySet::ColorCache(buffer)
            | CapabilitySet::DrawNineGridCache(buffer)
            | CapabilitySet::DrawGdiPlus(buffer)
            | CapabilitySet::Rail(buffer)
            | CapabilitySet::WindowList(buffer) => buffer.len(),
        }
    }
}

impl Encode for CapabilitySet {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(self.capability_set_type().to_u16().unwrap_or(0));
        dst.write_u16(cast_length!(Self::NAME, "len", self.size())?);

        match self {
            CapabilitySet::General(capset) => capset.encode(dst),
            CapabilitySet::Bitmap(capset) => capset.encode(dst),
            CapabilitySet::Order(capset) => capset.encode(dst),
            CapabilitySet::BitmapCache(capset) => capset.encode(dst),
            CapabilitySet::BitmapCacheRev2(capset) => capset.encode(dst),
            CapabilitySet::Pointer(capset) => capset.encode(dst),
            CapabilitySet::Sound(capset) => capset.encode(dst),
            CapabilitySet::Input(capset) => capset.encode(dst),
            CapabilitySet::Brush(capset) => capset.encode(dst),
            CapabilitySet::GlyphCache(capset) => capset.encode(dst),
            CapabilitySet::OffscreenBitmapCache(capset) => capset.encode(dst),
            CapabilitySet::VirtualChannel(capset) => capset.encode(dst),
            CapabilitySet::SurfaceCommands(capset) => capset.encode(dst),
            CapabilitySet::BitmapCodecs(capset) => capset.encode(dst),
            CapabilitySet::MultiFragmentUpdate(capset) => capset.encode(dst),
            CapabilitySet::LargePointer(capset) => capset.encode(dst),
            CapabilitySet::FrameAcknowledge(capset) => capset.encode(dst),
            CapabilitySet::Control(buffer)
            | CapabilitySet::WindowActivation(buffer)
            | CapabilitySet::Share(buffer)
            | CapabilitySet::Font(buffer)
            | CapabilitySet::BitmapCacheHostSupport(buffer)
            | CapabilitySet::DesktopComposition(buffer)
            | CapabilitySet::ColorCache(buffer)
            | CapabilitySet::DrawNineGridCache(buffer)
            | CapabilitySet::DrawGdiPlus(buffer)
            | CapabilitySet::Rail(buffer)
            | CapabilitySet::WindowList(buffer) => {
                dst.write_slice(buffer);
                Ok(())
            }
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.body_size()
    }
}

impl<'de> Decode<'de> for CapabilitySet {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let capability_set_type = CapabilitySetType::from_u16(src.read_u16())
            .ok_or_else(|| invalid_field_err!("capabilitySetType", "invalid capability set type"))?;

        let length = usize::from(src.read_u16());

        if length < CAPABILITY_SET_TYPE_FIELD_SIZE + CAPABILITY_SET_LENGTH_FIELD_SIZE {
            return Err(invalid_field_err!("len", "invalid capability set length"));
        }

        let buffer_length = length - CAPABILITY_SET_TYPE_FIELD_SIZE - CAPABILITY_SET_LENGTH_FIELD_SIZE;
        ensure_size!(in: src, size: buffer_length);
        let capability_set_buffer = src.read_slice(buffer_length);

        match capability_set_type {
            CapabilitySetType::General => Ok(CapabilitySet::General(decode(capability_set_buffer)?)),
            CapabilitySetType::Bitmap => Ok(CapabilitySet::Bitmap(decode(capability_set_buffer)?)),
            CapabilitySetType::Order => Ok(CapabilitySet::Order(decode(capability_set_buffer)?)),
            CapabilitySetType::BitmapCache => Ok(CapabilitySet::BitmapCache(decode(capability_set_buffer)?)),
            CapabilitySetType::BitmapCacheRev2 => Ok(CapabilitySet::BitmapCacheRev2(decode(capability_set_buffer)?)),
            CapabilitySetType::Pointer => Ok(CapabilitySet::Pointer(decode(capability_set_buffer)?)),
            CapabilitySetType::Sound => Ok(CapabilitySet::Sound(decode(capability_set_buffer)?)),
            CapabilitySetType::Input => Ok(CapabilitySet::Input(decode(capability_set_buffer)?)),
            CapabilitySetType::Brush => Ok(CapabilitySet::Brush(decode(capability_set_buffer)?)),
            CapabilitySetType::GlyphCache => Ok(CapabilitySet::GlyphCache(decode(capability_set_buffer)?)),
            CapabilitySetType::OffscreenBitmapCache => {
                Ok(CapabilitySet::OffscreenBitmapCache(decode(capability_set_buffer)?))
            }
            CapabilitySetType::VirtualChannel => Ok(CapabilitySet::VirtualChannel(decode(capability_set_buffer)?)),
            CapabilitySetType::SurfaceCommands => Ok(CapabilitySet::SurfaceCommands(decode(capability_set_buffer)?)),
            CapabilitySetType::BitmapCodecs => Ok(CapabilitySet::BitmapCodecs(decode(capability_set_buffer)?)),

            CapabilitySetType::Control => Ok(CapabilitySet::Control(capability_set_buffer.into())),
            CapabilitySetType::WindowActivation => Ok(CapabilitySet::WindowActivation(capability_set_buffer.into())),
            CapabilitySetType::Share => Ok(CapabilitySet::Share(capability_set_buffer.into())),
            CapabilitySetType::Font => Ok(CapabilitySet::Font(capability_set_buffer.into())),
            CapabilitySetType::BitmapCacheHostSupport => {
                Ok(CapabilitySet::BitmapCacheHostSupport(capability_set_buffer.into()))
            }
            CapabilitySetType::DesktopComposition => {
                Ok(CapabilitySet::DesktopComposition(capability_set_buffer.into()))
            }
            CapabilitySetType::MultiFragmentUpdate => {
                Ok(CapabilitySet::MultiFragmentUpdate(decode(capability_set_buffer)?))
            }
            CapabilitySetType::LargePointer => Ok(CapabilitySet::LargePointer(decode(capability_set_buffer)?)),
            CapabilitySetType::ColorCache => Ok(CapabilitySet::ColorCache(capability_set_buffer.into())),
            CapabilitySetType::DrawNineGridCache => Ok(CapabilitySet::DrawNineGridCache(capability_set_buffer.into())),
            CapabilitySetType::DrawGdiPlus => Ok(CapabilitySet::DrawGdiPlus(capability_set_buffer.into())),
            CapabilitySetType::Rail => Ok(CapabilitySet::Rail(capability_set_buffer.into())),
            CapabilitySetType::WindowList => Ok(CapabilitySet::WindowList(capability_set_buffer.into())),
            CapabilitySetType::FrameAcknowledge => Ok(CapabilitySet::FrameAcknowledge(decode(capability_set_buffer)?)),
        }
    }
}

#[derive(Copy, Clone, Debug, FromPrimitive, ToPrimitive)]
enum CapabilitySetType {
    General = 0x01,
    Bitmap = 0x02,
    Order = 0x03,
    BitmapCache = 0x04,
    Control = 0x05,
    WindowActivation = 0x07,
    Pointer = 0x08,
    Share = 0x09,
    ColorCache = 0x0A,
    Sound = 0x0C,
    Input = 0x0D,
    Font = 0x0E,
    Brush = 0x0F,
    GlyphCache = 0x10,
    OffscreenBitmapCache = 0x11,
    BitmapCacheHostSupport = 0x12,
    BitmapCacheRev2 = 0x13,
    VirtualChannel = 0x14,
    DrawNineGridCache = 0x15,
    DrawGdiPlus = 0x16,
    Rail = 0x17,
    WindowList = 0x18,
    DesktopComposition = 0x19,
    MultiFragmentUpdate = 0x1A,
    LargePointer = 0x1B,
    SurfaceCommands = 0x1C,
    BitmapCodecs = 0x1D,
    FrameAcknowledge = 0x1E,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demand_active_round_trip() {
        let pdu = DemandActive {
            source_descriptor: "RDP".to_owned(),
            capability_sets: vec![
                CapabilitySet::General(General::default()),
                CapabilitySet::Bitmap(Bitmap {
                    pref_bits_per_pix: 32,
                    desktop_width: 1024,
                    desktop_height: 768,
                    desktop_resize_flag: true,
                    drawing_flags: BitmapDrawingFlags::ALLOW_SKIP_ALPHA,
                }),
                CapabilitySet::FrameAcknowledge(FrameAcknowledge {
                    max_unacknowledged_frame_count: 2,
                }),
                CapabilitySet::Font(vec![1, 2, 3, 4]),
            ],
        };

        let encoded = cobalt_core::encode_vec(&pdu).unwrap();
        assert_eq!(encoded.len(), pdu.size());

        let decoded: DemandActive = cobalt_core::decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }
}
