//! Dynamic Virtual Channel PDUs, [MS-RDPEDYC].
//!
//! Every DVC PDU starts with one header byte: the command in the high
//! nibble, a 2-bit sp field, and a 2-bit cbChID field selecting a 1, 2, or
//! 4-byte little-endian channel ID.

use bit_field::BitField as _;
use cobalt_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

use crate::utils;

pub const DVC_CREATION_STATUS_OK: u32 = 0x0000_0000;
pub const DVC_CREATION_STATUS_NOT_FOUND: u32 = 0x8007_0490;
pub const DVC_CREATION_STATUS_NO_LISTENER: u32 = 0xC000_0001;

const HEADER_SIZE: usize = 1;
const UNUSED_U8: u8 = 0;

const MAX_SOFT_SYNC_CHANNELS: usize = 1024;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum PduType {
    Create = 0x01,
    DataFirst = 0x02,
    Data = 0x03,
    Close = 0x04,
    Capabilities = 0x05,
    DataFirstCompressed = 0x06,
    DataCompressed = 0x07,
    SoftSync = 0x08,
}

/// The on-wire width of the channel ID (and of the data-first total length).
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum FieldType {
    U8 = 0x00,
    U16 = 0x01,
    U32 = 0x02,
}

impl FieldType {
    /// Picks the smallest width able to carry `value`.
    pub fn for_value(value: u32) -> Self {
        if value <= u32::from(u8::MAX) {
            FieldType::U8
        } else if value <= u32::from(u16::MAX) {
            FieldType::U16
        } else {
            FieldType::U32
        }
    }

    pub fn read_according_to_type(self, src: &mut ReadCursor<'_>) -> DecodeResult<u32> {
        ensure_size!(ctx: "FieldType", in: src, size: self.size());

        let value = match self {
            FieldType::U8 => u32::from(src.read_u8()),
            FieldType::U16 => u32::from(src.read_u16()),
            FieldType::U32 => src.read_u32(),
        };

        Ok(value)
    }

    pub fn write_according_to_type(self, dst: &mut WriteCursor<'_>, value: u32) -> EncodeResult<()> {
        ensure_size!(ctx: "FieldType", in: dst, size: self.size());

        match self {
            FieldType::U8 => dst.write_u8(value as u8),
            FieldType::U16 => dst.write_u16(value as u16),
            FieldType::U32 => dst.write_u32(value),
        };

        Ok(())
    }

    pub fn size(self) -> usize {
        match self {
            FieldType::U8 => 1,
            FieldType::U16 => 2,
            FieldType::U32 => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Header {
    channel_id_type: u8, // 2 bits
    sp: u8,              // 2 bits
    pdu_type: PduType,   // 4 bits
}

impl Header {
    const NAME: &'static str = "DvcHeader";

    const FIXED_PART_SIZE: usize = HEADER_SIZE;
}

impl Encode for Header {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        let mut dvc_header: u8 = 0;
        dvc_header.set_bits(0..2, self.channel_id_type);
        dvc_header.set_bits(2..4, self.sp);
        dvc_header.set_bits(4..8, self.pdu_type.to_u8().unwrap_or(0));
        dst.write_u8(dvc_header);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Header {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let dvc_header = src.read_u8();
        let channel_id_type = dvc_header.get_bits(0..2);
        let sp = dvc_header.get_bits(2..4);
        let pdu_type =
            PduType::from_u8(dvc_header.get_bits(4..8)).ok_or_else(|| invalid_field_err!("DvcHeader", "invalid cmd"))?;

        Ok(Self {
            channel_id_type,
            sp,
            pdu_type,
        })
    }
}

fn channel_id_type(header: &Header) -> DecodeResult<FieldType> {
    FieldType::from_u8(header.channel_id_type)
        .ok_or_else(|| invalid_field_err!(Header::NAME, "channelIdType", "invalid channel ID type"))
}

/// A DVC PDU received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPdu {
    CapabilitiesRequest(CapabilitiesRequestPdu),
    CreateRequest(CreateRequestPdu),
    DataFirst(DataFirstPdu),
    Data(DataPdu),
    DataFirstCompressed(DataFirstPdu),
    DataCompressed(DataPdu),
    CloseRequest(ClosePdu),
    SoftSyncRequest(SoftSyncRequestPdu),
}

impl ServerPdu {
    const NAME: &'static str = "DvcServerPdu";

    pub fn decode(src: &mut ReadCursor<'_>, mut dvc_data_size: usize) -> DecodeResult<Self> {
        let dvc_header: Header = cobalt_core::decode_cursor(src)?;

        dvc_data_size = dvc_data_size
            .checked_sub(HEADER_SIZE)
            .ok_or_else(|| invalid_field_err!(Self::NAME, "dataSize", "DVC data size is too small"))?;

        let res = match dvc_header.pdu_type {
            PduType::Capabilities => ServerPdu::CapabilitiesRequest(CapabilitiesRequestPdu::decode(src)?),
            PduType::Create => {
                ServerPdu::CreateRequest(CreateRequestPdu::decode(src, channel_id_type(&dvc_header)?, dvc_data_size)?)
            }
            PduType::DataFirst => {
                ServerPdu::DataFirst(DataFirstPdu::decode(src, channel_id_type(&dvc_header)?, dvc_data_size)?)
            }
            PduType::Data => ServerPdu::Data(DataPdu::decode(src, channel_id_type(&dvc_header)?, dvc_data_size)?),
            PduType::DataFirstCompressed => {
                ServerPdu::DataFirstCompressed(DataFirstPdu::decode(src, channel_id_type(&dvc_header)?, dvc_data_size)?)
            }
            PduType::DataCompressed => {
                ServerPdu::DataCompressed(DataPdu::decode(src, channel_id_type(&dvc_header)?, dvc_data_size)?)
            }
            PduType::Close => ServerPdu::CloseRequest(ClosePdu::decode(src, channel_id_type(&dvc_header)?)?),
            PduType::SoftSync => ServerPdu::SoftSyncRequest(SoftSyncRequestPdu::decode(src)?),
        };

        Ok(res)
    }
}

impl Encode for ServerPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            ServerPdu::CapabilitiesRequest(pdu) => pdu.encode(dst),
            ServerPdu::CreateRequest(pdu) => pdu.encode(dst),
            ServerPdu::DataFirst(pdu) => pdu.encode(dst, PduType::DataFirst),
            ServerPdu::Data(pdu) => pdu.encode(dst, PduType::Data),
            ServerPdu::DataFirstCompressed(pdu) => pdu.encode(dst, PduType::DataFirstCompressed),
            ServerPdu::DataCompressed(pdu) => pdu.encode(dst, PduType::DataCompressed),
            ServerPdu::CloseRequest(pdu) => pdu.encode(dst),
            ServerPdu::SoftSyncRequest(pdu) => pdu.encode(dst),
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        match self {
            ServerPdu::CapabilitiesRequest(pdu) => pdu.size(),
            ServerPdu::CreateRequest(pdu) => pdu.size(),
            ServerPdu::DataFirst(pdu) => pdu.size(),
            ServerPdu::Data(pdu) => pdu.size(),
            ServerPdu::DataFirstCompressed(pdu) => pdu.size(),
            ServerPdu::DataCompressed(pdu) => pdu.size(),
            ServerPdu::CloseRequest(pdu) => pdu.size(),
            ServerPdu::SoftSyncRequest(pdu) => pdu.size(),
        }
    }
}

/// A DVC PDU sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPdu {
    CapabilitiesResponse(CapabilitiesResponsePdu),
    CreateResponse(CreateResponsePdu),
    DataFirst(DataFirstPdu),
    Data(DataPdu),
    CloseResponse(ClosePdu),
    SoftSyncResponse(SoftSyncResponsePdu),
}

impl ClientPdu {
    const NAME: &'static str = "DvcClientPdu";

    pub fn decode(src: &mut ReadCursor<'_>, mut dvc_data_size: usize) -> DecodeResult<Self> {
        let dvc_header: Header = cobalt_core::decode_cursor(src)?;

        dvc_data_size = dvc_data_size
            .checked_sub(HEADER_SIZE)
            .ok_or_else(|| invalid_field_err!(Self::NAME, "dataSize", "DVC data size is too small"))?;

        let res = match dvc_header.pdu_type {
            PduType::Capabilities => ClientPdu::CapabilitiesResponse(CapabilitiesResponsePdu::decode(src)?),
            PduType::Create => ClientPdu::CreateResponse(CreateResponsePdu::decode(src, channel_id_type(&dvc_header)?)?),
            PduType::DataFirst => {
                ClientPdu::DataFirst(DataFirstPdu::decode(src, channel_id_type(&dvc_header)?, dvc_data_size)?)
            }
            PduType::Data => ClientPdu::Data(DataPdu::decode(src, channel_id_type(&dvc_header)?, dvc_data_size)?),
            PduType::Close => ClientPdu::CloseResponse(ClosePdu::decode(src, channel_id_type(&dvc_header)?)?),
            PduType::SoftSync => ClientPdu::SoftSyncResponse(SoftSyncResponsePdu::decode(src)?),
            _ => return Err(invalid_field_err!(Self::NAME, "cmd", "unexpected client DVC PDU type")),
        };

        Ok(res)
    }
}

impl Encode for ClientPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            ClientPdu::CapabilitiesResponse(pdu) => pdu.encode(dst),
            ClientPdu::CreateResponse(pdu) => pdu.encode(dst),
            ClientPdu::DataFirst(pdu) => pdu.encode(dst, PduType::DataFirst),
            ClientPdu::Data(pdu) => pdu.encode(dst, PduType::Data),
            ClientPdu::CloseResponse(pdu) => pdu.encode(dst),
            ClientPdu::SoftSyncResponse(pdu) => pdu.encode(dst),
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        match self {
            ClientPdu::CapabilitiesResponse(pdu) => pdu.size(),
            ClientPdu::CreateResponse(pdu) => pdu.size(),
            ClientPdu::DataFirst(pdu) => pdu.size(),
            ClientPdu::Data(pdu) => pdu.size(),
            ClientPdu::CloseResponse(pdu) => pdu.size(),
            ClientPdu::SoftSyncResponse(pdu) => pdu.size(),
        }
    }
}

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum CapsVersion {
    V1 = 0x0001,
    V2 = 0x0002,
    V3 = 0x0003,
}

/// DYNVC_CAPS_VERSIONx request sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitiesRequestPdu {
    pub version: CapsVersion,
    /// Four priority charge fields, present for version 3 only.
    pub priority_charges: Option<[u16; 4]>,
}

impl CapabilitiesRequestPdu {
    const NAME: &'static str = "DvcCapabilitiesRequest";

    const FIXED_PART_SIZE: usize = 1 /* pad */ + 2 /* version */;

    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: Self::FIXED_PART_SIZE);

        let _pad = src.read_u8();
        let version = CapsVersion::from_u16(src.read_u16())
            .ok_or_else(|| invalid_field_err!(Self::NAME, "version", "invalid DVC capabilities version"))?;

        let priority_charges = if version == CapsVersion::V3 {
            ensure_size!(ctx: Self::NAME, in: src, size: 8);
            Some([src.read_u16(), src.read_u16(), src.read_u16(), src.read_u16()])
        } else {
            None
        };

        Ok(Self {
            version,
            priority_charges,
        })
    }
}

impl Encode for CapabilitiesRequestPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        Header {
            channel_id_type: UNUSED_U8,
            sp: UNUSED_U8,
            pdu_type: PduType::Capabilities,
        }
        .encode(dst)?;

        dst.write_u8(0); // pad
        dst.write_u16(self.version.to_u16().unwrap_or(0));

        if let Some(priority_charges) = self.priority_charges {
            for charge in priority_charges {
                dst.write_u16(charge);
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        HEADER_SIZE + Self::FIXED_PART_SIZE + if self.priority_charges.is_some() { 8 } else { 0 }
    }
}

/// DYNVC_CAPS_RSP sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitiesResponsePdu {
    pub version: CapsVersion,
}

impl CapabilitiesResponsePdu {
    const NAME: &'static str = "DvcCapabilitiesResponse";

    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: 3);

        let _pad = src.read_u8();
        let version = CapsVersion::from_u16(src.read_u16())
            .ok_or_else(|| invalid_field_err!(Self::NAME, "version", "invalid DVC capabilities version"))?;

        Ok(Self { version })
    }
}

impl Encode for CapabilitiesResponsePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        Header {
            channel_id_type: UNUSED_U8,
            sp: UNUSED_U8,
            pdu_type: PduType::Capabilities,
        }
        .encode(dst)?;

        dst.write_u8(0); // pad
        dst.write_u16(self.version.to_u16().unwrap_or(0));

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        HEADER_SIZE + 3
    }
}

/// DYNVC_CREATE_REQ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequestPdu {
    pub channel_id_type: FieldType,
    pub channel_id: u32,
    pub channel_name: String,
}

impl CreateRequestPdu {
    const NAME: &'static str = "DvcCreateRequest";

    pub fn new(channel_id: u32, channel_name: String) -> Self {
        Self {
            channel_id_type: FieldType::for_value(channel_id),
            channel_id,
            channel_name,
        }
    }

    fn decode(src: &mut ReadCursor<'_>, channel_id_type: FieldType, data_size: usize) -> DecodeResult<Self> {
        let channel_id = channel_id_type.read_according_to_type(src)?;

        let name_size = data_size
            .checked_sub(channel_id_type.size())
            .ok_or_else(|| invalid_field_err!(Self::NAME, "dataSize", "invalid DVC message size"))?;

        ensure_size!(ctx: Self::NAME, in: src, size: name_size);
        let channel_name = utils::decode_string(src.read_slice(name_size), utils::CharacterSet::Ansi, true)?;

        Ok(Self {
            channel_id_type,
            channel_id,
            channel_name,
        })
    }
}

impl Encode for CreateRequestPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        Header {
            channel_id_type: self.channel_id_type.to_u8().unwrap_or(0),
            sp: UNUSED_U8,
            pdu_type: PduType::Create,
        }
        .encode(dst)?;

        self.channel_id_type.write_according_to_type(dst, self.channel_id)?;
        dst.write_slice(self.channel_name.as_bytes());
        dst.write_u8(0); // null terminator

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        HEADER_SIZE + self.channel_id_type.size() + self.channel_name.len() + 1
    }
}

/// DYNVC_CREATE_RSP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResponsePdu {
    pub channel_id_type: FieldType,
    pub channel_id: u32,
    pub creation_status: u32,
}

impl CreateResponsePdu {
    const NAME: &'static str = "DvcCreateResponse";

    fn decode(src: &mut ReadCursor<'_>, channel_id_type: FieldType) -> DecodeResult<Self> {
        let channel_id = channel_id_type.read_according_to_type(src)?;

        ensure_size!(ctx: Self::NAME, in: src, size: 4);
        let creation_status = src.read_u32();

        Ok(Self {
            channel_id_type,
            channel_id,
            creation_status,
        })
    }
}

impl Encode for CreateResponsePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        Header {
            channel_id_type: self.channel_id_type.to_u8().unwrap_or(0),
            sp: UNUSED_U8,
            pdu_type: PduType::Create,
        }
        .encode(dst)?;

        self.channel_id_type.write_according_to_type(dst, self.channel_id)?;
        dst.write_u32(self.creation_status);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        HEADER_SIZE + self.channel_id_type.size() + 4
    }
}

/// DYNVC_DATA_FIRST: opens a reassembly with the declared total length.
///
/// The total length is carried with the same field width as the channel ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFirstPdu {
    pub channel_id_type: FieldType,
    pub channel_id: u32,
    pub total_data_size: u32,
    pub data: Vec<u8>,
}

impl DataFirstPdu {
    const NAME: &'static str = "DvcDataFirst";

    pub fn new(channel_id: u32, total_data_size: u32, data: Vec<u8>) -> Self {
        Self {
            channel_id_type: FieldType::for_value(channel_id.max(total_data_size)),
            channel_id,
            total_data_size,
            data,
        }
    }

    fn decode(src: &mut ReadCursor<'_>, channel_id_type: FieldType, data_size: usize) -> DecodeResult<Self> {
        let channel_id = channel_id_type.read_according_to_type(src)?;
        let total_data_size = channel_id_type.read_according_to_type(src)?;

        let payload_size = data_size
            .checked_sub(channel_id_type.size() * 2)
            .ok_or_else(|| invalid_field_err!(Self::NAME, "dataSize", "invalid DVC message size"))?;

        ensure_size!(ctx: Self::NAME, in: src, size: payload_size);
        let data = src.read_slice(payload_size).to_vec();

        if data.len() > total_data_size as usize {
            return Err(invalid_field_err!(
                Self::NAME,
                "totalDataSize",
                "first fragment is bigger than the declared total size"
            ));
        }

        Ok(Self {
            channel_id_type,
            channel_id,
            total_data_size,
            data,
        })
    }

    fn encode(&self, dst: &mut WriteCursor<'_>, pdu_type: PduType) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        Header {
            channel_id_type: self.channel_id_type.to_u8().unwrap_or(0),
            sp: UNUSED_U8,
            pdu_type,
        }
        .encode(dst)?;

        self.channel_id_type.write_according_to_type(dst, self.channel_id)?;
        self.channel_id_type.write_according_to_type(dst, self.total_data_size)?;
        dst.write_slice(&self.data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        HEADER_SIZE + self.channel_id_type.size() * 2 + self.data.len()
    }
}

/// DYNVC_DATA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPdu {
    pub channel_id_type: FieldType,
    pub channel_id: u32,
    pub data: Vec<u8>,
}

impl DataPdu {
    const NAME: &'static str = "DvcData";

    pub fn new(channel_id: u32, data: Vec<u8>) -> Self {
        Self {
            channel_id_type: FieldType::for_value(channel_id),
            channel_id,
            data,
        }
    }

    fn decode(src: &mut ReadCursor<'_>, channel_id_type: FieldType, data_size: usize) -> DecodeResult<Self> {
        let channel_id = channel_id_type.read_according_to_type(src)?;

        let payload_size = data_size
            .checked_sub(channel_id_type.size())
            .ok_or_else(|| invalid_field_err!(Self::NAME, "dataSize", "invalid DVC message size"))?;

        ensure_size!(ctx: Self::NAME, in: src, size: payload_size);
        let data = src.read_slice(payload_size).to_vec();

        Ok(Self {
            channel_id_type,
            channel_id,
            data,
        })
    }

    fn encode(&self, dst: &mut WriteCursor<'_>, pdu_type: PduType) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        Header {
            channel_id_type: self.channel_id_type.to_u8().unwrap_or(0),
            sp: UNUSED_U8,
            pdu_type,
        }
        .encode(dst)?;

        self.channel_id_type.write_according_to_type(dst, self.channel_id)?;
        dst.write_slice(&self.data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        HEADER_SIZE + self.channel_id_type.size() + self.data.len()
    }
}

/// DYNVC_CLOSE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosePdu {
    pub channel_id_type: FieldType,
    pub channel_id: u32,
}

impl ClosePdu {
    const NAME: &'static str = "DvcClose";

    pub fn new(channel_id: u32) -> Self {
        Self {
            channel_id_type: FieldType::for_value(channel_id),
            channel_id,
        }
    }

    fn decode(src: &mut ReadCursor<'_>, channel_id_type: FieldType) -> DecodeResult<Self> {
        let channel_id = channel_id_type.read_according_to_type(src)?;

        Ok(Self {
            channel_id_type,
            channel_id,
        })
    }
}

impl Encode for ClosePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        Header {
            channel_id_type: self.channel_id_type.to_u8().unwrap_or(0),
            sp: UNUSED_U8,
            pdu_type: PduType::Close,
        }
        .encode(dst)?;

        self.channel_id_type.write_according_to_type(dst, self.channel_id)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        HEADER_SIZE + self.channel_id_type.size()
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SoftSyncFlags: u8 {
        const TCP_FLUSHED = 0x01;
        const CHANNEL_LIST_PRESENT = 0x02;
    }
}

/// DYNVC_SOFT_SYNC_REQUEST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftSyncRequestPdu {
    pub flags: SoftSyncFlags,
    pub number_of_tunnels: u16,
    pub channels: Vec<SoftSyncChannel>,
}

impl SoftSyncRequestPdu {
    const NAME: &'static str = "DvcSoftSyncRequest";

    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: 4);

        let _pad = src.read_u8();
        let flags = SoftSyncFlags::from_bits_truncate(src.read_u8());
        let number_of_tunnels = src.read_u16();

        let channels = if flags.contains(SoftSyncFlags::CHANNEL_LIST_PRESENT) {
            ensure_size!(ctx: Self::NAME, in: src, size: 2);
            let count = usize::from(src.read_u16());

            if count > MAX_SOFT_SYNC_CHANNELS {
                return Err(invalid_field_err!(Self::NAME, "channelCount", "soft-sync channel list is too big"));
            }

            ensure_size!(ctx: Self::NAME, in: src, size: count * SoftSyncChannel::FIXED_PART_SIZE);

            let mut channels = Vec::with_capacity(count);
            for _ in 0..count {
                channels.push(SoftSyncChannel {
                    channel_id: src.read_u32(),
                    tunnel_type: src.read_u32(),
                });
            }

            channels
        } else {
            Vec::new()
        };

        Ok(Self {
            flags,
            number_of_tunnels,
            channels,
        })
    }
}

impl Encode for SoftSyncRequestPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        Header {
            channel_id_type: UNUSED_U8,
            sp: UNUSED_U8,
            pdu_type: PduType::SoftSync,
        }
        .encode(dst)?;

        dst.write_u8(0); // pad
        dst.write_u8(self.flags.bits());
        dst.write_u16(self.number_of_tunnels);

        if self.flags.contains(SoftSyncFlags::CHANNEL_LIST_PRESENT) {
            dst.write_u16(cast_length!(Self::NAME, "channelCount", self.channels.len())?);

            for channel in self.channels.iter() {
                dst.write_u32(channel.channel_id);
                dst.write_u32(channel.tunnel_type);
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        HEADER_SIZE
            + 4
            + if self.flags.contains(SoftSyncFlags::CHANNEL_LIST_PRESENT) {
                2 + self.channels.len() * SoftSyncChannel::FIXED_PART_SIZE
            } else {
                0
            }
    }
}

/// A (channel id, tunnel type) pair from a soft-sync channel list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftSyncChannel {
    pub channel_id: u32,
    pub tunnel_type: u32,
}

impl SoftSyncChannel {
    const FIXED_PART_SIZE: usize = 8;
}

/// DYNVC_SOFT_SYNC_RESPONSE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftSyncResponsePdu {
    pub tunnels: Vec<u32>,
}

impl SoftSyncResponsePdu {
    const NAME: &'static str = "DvcSoftSyncResponse";

    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: 5);

        let _pad = src.read_u8();
        let count = src.read_u32() as usize;

        ensure_size!(ctx: Self::NAME, in: src, size: count * 4);

        let mut tunnels = Vec::with_capacity(count);
        for _ in 0..count {
            tunnels.push(src.read_u32());
        }

        Ok(Self { tunnels })
    }
}

impl Encode for SoftSyncResponsePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        Header {
            channel_id_type: UNUSED_U8,
            sp: UNUSED_U8,
            pdu_type: PduType::SoftSync,
        }
        .encode(dst)?;

        dst.write_u8(0); // pad
        dst.write_u32(cast_length!(Self::NAME, "tunnelCount", self.tunnels.len())?);

        for tunnel in self.tunnels.iter() {
            dst.write_u32(*tunnel);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        HEADER_SIZE + 1 + 4 + self.tunnels.len() * 4
    }
}

#[cfg(test)]
mod tests {
    use num_traits::FromPrimitive as _;

    use super::*;

    #[test]
    fn channel_id_widths() {
        assert_eq!(FieldType::from_u8(0), Some(FieldType::U8));
        assert_eq!(FieldType::from_u8(1), Some(FieldType::U16));
        assert_eq!(FieldType::from_u8(2), Some(FieldType::U32));
        assert_eq!(FieldType::from_u8(3), None);

        assert_eq!(FieldType::U8.size(), 1);
        assert_eq!(FieldType::U16.size(), 2);
        assert_eq!(FieldType::U32.size(), 4);
    }

    #[test]
    fn invalid_channel_id_width_is_rejected() {
        // cmd = Data (3), cbChID = 3 (reserved).
        let buffer = [0x33, 0x05, 0xAA];

        let mut src = ReadCursor::new(&buffer);
        assert!(ServerPdu::decode(&mut src, buffer.len()).is_err());
    }

    #[test]
    fn create_request_round_trip() {
        let pdu = CreateRequestPdu {
            channel_id_type: FieldType::U8,
            channel_id: 0x05,
            channel_name: "testdvc".to_owned(),
        };

        let encoded = cobalt_core::encode_vec(&ServerPdu::CreateRequest(pdu.clone())).unwrap();

        let mut src = ReadCursor::new(&encoded);
        let decoded = ServerPdu::decode(&mut src, encoded.len()).unwrap();

        assert_eq!(decoded, ServerPdu::CreateRequest(pdu));
    }

    #[test]
    fn data_first_carries_total_length() {
        let pdu = DataFirstPdu {
            channel_id_type: FieldType::U8,
            channel_id: 0x05,
            total_data_size: 10,
            data: vec![1, 2, 3, 4],
        };

        let encoded = cobalt_core::encode_vec(&ServerPdu::DataFirst(pdu.clone())).unwrap();
        assert_eq!(encoded[0], 0x20); // cmd = DataFirst, cbChID = 1 byte
        assert_eq!(encoded[1], 0x05); // channel ID
        assert_eq!(encoded[2], 10); // total length, same width as channel ID

        let mut src = ReadCursor::new(&encoded);
        let decoded = ServerPdu::decode(&mut src, encoded.len()).unwrap();

        assert_eq!(decoded, ServerPdu::DataFirst(pdu));
    }

    #[test]
    fn oversized_first_fragment_is_rejected() {
        let buffer = [0x20, 0x05, 0x02, 0xAA, 0xBB, 0xCC];

        let mut src = ReadCursor::new(&buffer);
        assert!(ServerPdu::decode(&mut src, buffer.len()).is_err());
    }

    #[test]
    fn caps_v3_has_priority_charges() {
        let pdu = CapabilitiesRequestPdu {
            version: CapsVersion::V3,
            priority_charges: Some([70, 20, 5, 5]),
        };

        let encoded = cobalt_core::encode_vec(&ServerPdu::CapabilitiesRequest(pdu.clone())).unwrap();
        assert_eq!(encoded.len(), 12);

        let mut src = ReadCursor::new(&encoded);
        let decoded = ServerPdu::decode(&mut src, encoded.len()).unwrap();

        assert_eq!(decoded, ServerPdu::CapabilitiesRequest(pdu));
    }

    #[test]
    fn soft_sync_with_channel_list() {
        let pdu = SoftSyncRequestPdu {
            flags: SoftSyncFlags::TCP_FLUSHED | SoftSyncFlags::CHANNEL_LIST_PRESENT,
            number_of_tunnels: 1,
            channels: vec![SoftSyncChannel {
                channel_id: 7,
                tunnel_type: 1,
            }],
        };

        let encoded = cobalt_core::encode_vec(&ServerPdu::SoftSyncRequest(pdu.clone())).unwrap();

        let mut src = ReadCursor::new(&encoded);
        let decoded = ServerPdu::decode(&mut src, encoded.len()).unwrap();

        assert_eq!(decoded, ServerPdu::SoftSyncRequest(pdu));
    }
}
