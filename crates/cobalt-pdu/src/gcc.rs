//! GCC conference user data blocks exchanged during Basic Settings Exchange.

use cobalt_core::{
    cast_length, decode, ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode,
    EncodeResult, ReadCursor, WriteCursor,
};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

pub mod conference_create;

mod cluster_data;
mod core_data;
mod message_channel_data;
mod multi_transport_channel_data;
mod network_data;
mod security_data;

pub use self::cluster_data::{ClientClusterData, RedirectionFlags, RedirectionVersion};
pub use self::conference_create::{ConferenceCreateRequest, ConferenceCreateResponse};
pub use self::core_data::client::{
    ClientColorDepth, ClientCoreData, ClientCoreOptionalData, ClientEarlyCapabilityFlags, ColorDepth, ConnectionType,
    HighColorDepth, KeyboardType, SecureAccessSequence, SupportedColorDepths, IME_FILE_NAME_SIZE,
};
pub use self::core_data::server::{ServerCoreData, ServerCoreOptionalData, ServerEarlyCapabilityFlags};
pub use self::core_data::RdpVersion;
pub use self::message_channel_data::{ClientMessageChannelData, ServerMessageChannelData};
pub use self::multi_transport_channel_data::{MultiTransportChannelData, MultiTransportFlags};
pub use self::network_data::{ChannelDef, ChannelName, ChannelOptions, ClientNetworkData, ServerNetworkData};
pub use self::security_data::{ClientSecurityData, EncryptionLevel, EncryptionMethod, ServerSecurityData};

const USER_DATA_HEADER_SIZE: usize = 4;

/// 2.2.1.3 Client MCS Connect Initial PDU with GCC Conference Create Request
///
/// [2.2.1.3]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/db6713ee-1c0e-4064-a3b3-0fac30b4037b
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientGccBlocks {
    pub core: ClientCoreData,
    pub security: ClientSecurityData,
    /// The Network GCC block is required by [MS-RDPBCGR], but well-known
    /// clients omit it when they have no channels to join and servers accept
    /// that, so it is optional here.
    pub network: Option<ClientNetworkData>,
    pub cluster: Option<ClientClusterData>,
    pub message_channel: Option<ClientMessageChannelData>,
    pub multi_transport_channel: Option<MultiTransportChannelData>,
}

impl ClientGccBlocks {
    const NAME: &'static str = "ClientGccBlocks";

    pub fn channel_names(&self) -> Option<Vec<ChannelDef>> {
        self.network.as_ref().map(|network| network.channels.clone())
    }
}

impl Encode for ClientGccBlocks {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        UserDataHeader::encode(dst, ClientGccType::CoreData.as_u16(), &self.core)?;
        UserDataHeader::encode(dst, ClientGccType::SecurityData.as_u16(), &self.security)?;

        if let Some(ref network) = self.network {
            UserDataHeader::encode(dst, ClientGccType::NetworkData.as_u16(), network)?;
        }
        if let Some(ref cluster) = self.cluster {
            UserDataHeader::encode(dst, ClientGccType::ClusterData.as_u16(), cluster)?;
        }
        if let Some(ref message_channel) = self.message_channel {
            UserDataHeader::encode(dst, ClientGccType::MessageChannelData.as_u16(), message_channel)?;
        }
        if let Some(ref multi_transport_channel) = self.multi_transport_channel {
            UserDataHeader::encode(
                dst,
                ClientGccType::MultiTransportChannelData.as_u16(),
                multi_transport_channel,
            )?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let mut size = self.core.size() + self.security.size() + USER_DATA_HEADER_SIZE * 2;

        if let Some(ref network) = self.network {
            size += network.size() + USER_DATA_HEADER_SIZE;
        }
        if let Some(ref cluster) = self.cluster {
            size += cluster.size() + USER_DATA_HEADER_SIZE;
        }
        if let Some(ref message_channel) = self.message_channel {
            size += message_channel.size() + USER_DATA_HEADER_SIZE;
        }
        if let Some(ref multi_transport_channel) = self.multi_transport_channel {
            size += multi_transport_channel.size() + USER_DATA_HEADER_SIZE;
        }

        size
    }
}

impl<'de> Decode<'de> for ClientGccBlocks {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let mut core = None;
        let mut security = None;
        let mut network = None;
        let mut cluster = None;
        let mut message_channel = None;
        let mut multi_transport_channel = None;

        while let Some((block_type, block)) = UserDataHeader::decode(src)? {
            match ClientGccType::from_u16(block_type) {
                Some(ClientGccType::CoreData) => core = Some(decode(block)?),
                Some(ClientGccType::SecurityData) => security = Some(decode(block)?),
                Some(ClientGccType::NetworkData) => network = Some(decode(block)?),
                Some(ClientGccType::ClusterData) => cluster = Some(decode(block)?),
                Some(ClientGccType::MessageChannelData) => message_channel = Some(decode(block)?),
                Some(ClientGccType::MultiTransportChannelData) => multi_transport_channel = Some(decode(block)?),
                // Unknown blocks (monitor layout and friends) are skipped.
                None => {}
            };
        }

        Ok(Self {
            core: core.ok_or_else(|| invalid_field_err!(Self::NAME, "core", "required GCC core is absent"))?,
            security: security
                .ok_or_else(|| invalid_field_err!(Self::NAME, "security", "required GCC security is absent"))?,
            network,
            cluster,
            message_channel,
            multi_transport_channel,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerGccBlocks {
    pub core: ServerCoreData,
    pub network: ServerNetworkData,
    pub security: ServerSecurityData,
    pub message_channel: Option<ServerMessageChannelData>,
    pub multi_transport_channel: Option<MultiTransportChannelData>,
}

impl ServerGccBlocks {
    const NAME: &'static str = "ServerGccBlocks";

    pub fn channel_ids(&self) -> Vec<u16> {
        self.network.channel_ids.clone()
    }

    pub fn global_channel_id(&self) -> u16 {
        self.network.io_channel
    }
}

impl Encode for ServerGccBlocks {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        UserDataHeader::encode(dst, ServerGccType::CoreData.as_u16(), &self.core)?;
        UserDataHeader::encode(dst, ServerGccType::NetworkData.as_u16(), &self.network)?;
        UserDataHeader::encode(dst, ServerGccType::SecurityData.as_u16(), &self.security)?;

        if let Some(ref message_channel) = self.message_channel {
            UserDataHeader::encode(dst, ServerGccType::MessageChannelData.as_u16(), message_channel)?;
        }
        if let Some(ref multi_transport_channel) = self.multi_transport_channel {
            UserDataHeader::encode(
                dst,
                ServerGccType::MultiTransportChannelData.as_u16(),
                multi_transport_channel,
            )?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let mut size = self.core.size() + self.network.size() + self.security.size() + USER_DATA_HEADER_SIZE * 3;

        if let Some(ref message_channel) = self.message_channel {
            size += message_channel.size() + USER_DATA_HEADER_SIZE;
        }
        if let Some(ref multi_transport_channel) = self.multi_transport_channel {
            size += multi_transport_channel.size() + USER_DATA_HEADER_SIZE;
        }

        size
    }
}

impl<'de> Decode<'de> for ServerGccBlocks {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let mut core = None;
        let mut network = None;
        let mut security = None;
        let mut message_channel = None;
        let mut multi_transport_channel = None;

        while let Some((block_type, block)) = UserDataHeader::decode(src)? {
            match ServerGccType::from_u16(block_type) {
                Some(ServerGccType::CoreData) => core = Some(decode(block)?),
                Some(ServerGccType::NetworkData) => network = Some(decode(block)?),
                Some(ServerGccType::SecurityData) => security = Some(decode(block)?),
                Some(ServerGccType::MessageChannelData) => message_channel = Some(decode(block)?),
                Some(ServerGccType::MultiTransportChannelData) => multi_transport_channel = Some(decode(block)?),
                None => {}
            };
        }

        Ok(Self {
            core: core.ok_or_else(|| invalid_field_err!(Self::NAME, "core", "required GCC core is absent"))?,
            network: network
                .ok_or_else(|| invalid_field_err!(Self::NAME, "network", "required GCC network is absent"))?,
            security: security
                .ok_or_else(|| invalid_field_err!(Self::NAME, "security", "required GCC security is absent"))?,
            message_channel,
            multi_transport_channel,
        })
    }
}

#[repr(u16)]
#[derive(Debug, Copy, Clone, FromPrimitive)]
pub enum ClientGccType {
    CoreData = 0xC001,
    SecurityData = 0xC002,
    NetworkData = 0xC003,
    ClusterData = 0xC004,
    MessageChannelData = 0xC006,
    MultiTransportChannelData = 0xC00A,
}

impl ClientGccType {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

#[repr(u16)]
#[derive(Debug, Copy, Clone, FromPrimitive)]
pub enum ServerGccType {
    CoreData = 0x0C01,
    SecurityData = 0x0C02,
    NetworkData = 0x0C03,
    MessageChannelData = 0x0C04,
    MultiTransportChannelData = 0x0C08,
}

impl ServerGccType {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

#[derive(Debug)]
pub struct UserDataHeader;

impl UserDataHeader {
    const NAME: &'static str = "UserDataHeader";

    const FIXED_PART_SIZE: usize = 2 /* blockType */ + 2 /* blockLen */;

    pub fn encode<B>(dst: &mut WriteCursor<'_>, block_type: u16, block: &B) -> EncodeResult<()>
    where
        B: Encode,
    {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(block_type);
        dst.write_u16(cast_length!(Self::NAME, "blockLen", block.size() + USER_DATA_HEADER_SIZE)?);
        block.encode(dst)?;

        Ok(())
    }

    /// Reads the next user data block, or `None` once the input is exhausted.
    pub fn decode<'de>(src: &mut ReadCursor<'de>) -> DecodeResult<Option<(u16, &'de [u8])>> {
        if src.len() < Self::FIXED_PART_SIZE {
            return Ok(None);
        }

        let block_type = src.read_u16();
        let block_length: usize = cast_length!(Self::NAME, "blockLen", src.read_u16())?;

        if block_length <= USER_DATA_HEADER_SIZE {
            return Err(invalid_field_err!(Self::NAME, "blockLen", "invalid UserDataHeader length"));
        }

        let len = block_length - USER_DATA_HEADER_SIZE;
        ensure_size!(in: src, size: len);

        Ok(Some((block_type, src.read_slice(len))))
    }
}
