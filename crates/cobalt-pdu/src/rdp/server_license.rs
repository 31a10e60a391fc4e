//! Licensing phase PDUs, [MS-RDPBCGR] 2.2.1.12.
//!
//! The client expects the licensing phase to conclude with a License Error
//! PDU carrying `STATUS_VALID_CLIENT`; anything else terminates the
//! connection sequence.

use bitflags::bitflags;
use cobalt_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, unexpected_message_type_err, Decode,
    DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

use crate::rdp::headers::{BasicSecurityHeader, BasicSecurityHeaderFlags};

pub const PREAMBLE_SIZE: usize = 4;

const BLOB_TYPE_ERROR: u16 = 0x0004;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseHeader {
    pub security_header: BasicSecurityHeader,
    pub preamble_message_type: PreambleType,
    pub preamble_flags: PreambleFlags,
    pub preamble_version: PreambleVersion,
    pub preamble_message_size: u16,
}

impl LicenseHeader {
    const NAME: &'static str = "LicenseHeader";

    const FIXED_PART_SIZE: usize = BasicSecurityHeader::FIXED_PART_SIZE + PREAMBLE_SIZE;
}

impl Encode for LicenseHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        self.security_header.encode(dst)?;

        let flags_with_version = self.preamble_flags.bits() | self.preamble_version.to_u8().unwrap_or(0);

        dst.write_u8(self.preamble_message_type.to_u8().unwrap_or(0));
        dst.write_u8(flags_with_version);
        dst.write_u16(self.preamble_message_size);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for LicenseHeader {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let security_header = BasicSecurityHeader::decode(src)?;

        if !security_header.flags.contains(BasicSecurityHeaderFlags::LICENSE_PKT) {
            return Err(invalid_field_err!("securityHeader", "missing LICENSE_PKT flag"));
        }

        let preamble_message_type = PreambleType::from_u8(src.read_u8())
            .ok_or_else(|| invalid_field_err!("bMsgType", "invalid license preamble message type"))?;
        let flags_with_version = src.read_u8();
        let preamble_message_size = src.read_u16();

        let preamble_flags = PreambleFlags::from_bits_truncate(flags_with_version & !PREAMBLE_VERSION_MASK);
        let preamble_version = PreambleVersion::from_u8(flags_with_version & PREAMBLE_VERSION_MASK)
            .ok_or_else(|| invalid_field_err!("bVersion", "invalid license preamble version"))?;

        Ok(Self {
            security_header,
            preamble_message_type,
            preamble_flags,
            preamble_version,
            preamble_message_size,
        })
    }
}

/// The first licensing message received from the server.
///
/// Per the connection sequence this crate implements, only a License Error
/// PDU with `STATUS_VALID_CLIENT` lets the connection proceed; a full
/// license request is surfaced so the caller can fail with a clear reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialServerLicenseMessage {
    pub license_header: LicenseHeader,
    pub message_type: InitialMessageType,
}

impl InitialServerLicenseMessage {
    const NAME: &'static str = "InitialServerLicenseMessage";

    pub fn new_status_valid_client_message() -> Self {
        let valid_client_message = LicensingErrorMessage {
            error_code: LicenseErrorCode::StatusValidClient,
            state_transition: LicensingStateTransition::NoTransition,
            error_info: Vec::new(),
        };

        Self {
            license_header: LicenseHeader {
                security_header: BasicSecurityHeader {
                    flags: BasicSecurityHeaderFlags::LICENSE_PKT,
                },
                preamble_message_type: PreambleType::ErrorAlert,
                preamble_flags: PreambleFlags::empty(),
                preamble_version: PreambleVersion::V3,
                preamble_message_size: (PREAMBLE_SIZE + valid_client_message.size()) as u16,
            },
            message_type: InitialMessageType::StatusValidClient(valid_client_message),
        }
    }
}

impl Encode for InitialServerLicenseMessage {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        self.license_header.encode(dst)?;

        match &self.message_type {
            InitialMessageType::LicenseRequest(data) => {
                dst.write_slice(data);
            }
            InitialMessageType::StatusValidClient(message) => {
                message.encode(dst)?;
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        self.license_header.size()
            + match &self.message_type {
                InitialMessageType::LicenseRequest(data) => data.len(),
                InitialMessageType::StatusValidClient(message) => message.size(),
            }
    }
}

impl<'de> Decode<'de> for InitialServerLicenseMessage {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let license_header = LicenseHeader::decode(src)?;

        match license_header.preamble_message_type {
            PreambleType::LicenseRequest => {
                let data = src.read_remaining().to_vec();

                Ok(Self {
                    license_header,
                    message_type: InitialMessageType::LicenseRequest(data),
                })
            }
            PreambleType::ErrorAlert => {
                let error_message = LicensingErrorMessage::decode(src)?;

                Ok(Self {
                    license_header,
                    message_type: InitialMessageType::StatusValidClient(error_message),
                })
            }
            other => Err(unexpected_message_type_err!(Self::NAME, other.to_u8().unwrap_or(0))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialMessageType {
    /// A full MS-RDPELE Server License Request, kept opaque.
    LicenseRequest(Vec<u8>),
    StatusValidClient(LicensingErrorMessage),
}

/// [2.2.1.12.1.3] Licensing Error Message (LICENSE_ERROR_MESSAGE)
///
/// [2.2.1.12.1.3]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/f18b6c9f-f3d8-4a0e-8398-f9b153233dca
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicensingErrorMessage {
    pub error_code: LicenseErrorCode,
    pub state_transition: LicensingStateTransition,
    pub error_info: Vec<u8>,
}

impl LicensingErrorMessage {
    const NAME: &'static str = "LicensingErrorMessage";

    const FIXED_PART_SIZE: usize = 4 /* errorCode */ + 4 /* stateTransition */ + 4 /* blob header */;
}

impl Encode for LicensingErrorMessage {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(self.error_code.to_u32().unwrap_or(0));
        dst.write_u32(self.state_transition.to_u32().unwrap_or(0));

        dst.write_u16(BLOB_TYPE_ERROR);
        dst.write_u16(cast_length!(Self::NAME, "errorInfoLen", self.error_info.len())?);
        dst.write_slice(&self.error_info);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.error_info.len()
    }
}

impl<'de> Decode<'de> for LicensingErrorMessage {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let error_code = LicenseErrorCode::from_u32(src.read_u32())
            .ok_or_else(|| invalid_field_err!("dwErrorCode", "invalid license error code"))?;
        let state_transition = LicensingStateTransition::from_u32(src.read_u32())
            .ok_or_else(|| invalid_field_err!("dwStateTransition", "invalid licensing state transition"))?;

        let _blob_type = src.read_u16();
        let error_info_length = usize::from(src.read_u16());

        ensure_size!(in: src, size: error_info_length);
        let error_info = src.read_slice(error_info_length).to_vec();

        Ok(Self {
            error_code,
            state_transition,
            error_info,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum LicenseErrorCode {
    InvalidServerCertificate = 0x0000_0001,
    NoLicense = 0x0000_0002,
    InvalidMac = 0x0000_0003,
    InvalidScope = 0x0000_0004,
    NoLicenseServer = 0x0000_0006,
    StatusValidClient = 0x0000_0007,
    InvalidClient = 0x0000_0008,
    InvalidProductId = 0x0000_000B,
    InvalidMessageLen = 0x0000_000C,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum LicensingStateTransition {
    TotalAbort = 1,
    NoTransition = 2,
    ResetPhaseToStart = 3,
    ResendLastMessage = 4,
}

const PREAMBLE_VERSION_MASK: u8 = 0x0F;

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum PreambleType {
    LicenseRequest = 0x01,
    PlatformChallenge = 0x02,
    NewLicense = 0x03,
    UpgradeLicense = 0x04,
    LicenseInfo = 0x12,
    NewLicenseRequest = 0x13,
    PlatformChallengeResponse = 0x15,
    ErrorAlert = 0xFF,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct PreambleFlags: u8 {
        const EXTENDED_ERROR_MSG_SUPPORTED = 0x80;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum PreambleVersion {
    V2 = 2, // RDP 4.0
    V3 = 3, // RDP 5.0, 5.1, 5.2, 6.0, 6.1, 7.0, 7.1, 8.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_valid_client_round_trip() {
        let message = InitialServerLicenseMessage::new_status_valid_client_message();

        let encoded = cobalt_core::encode_vec(&message).unwrap();
        let decoded: InitialServerLicenseMessage = cobalt_core::decode(&encoded).unwrap();

        assert_eq!(decoded, message);
        assert!(matches!(
            decoded.message_type,
            InitialMessageType::StatusValidClient(LicensingErrorMessage {
                error_code: LicenseErrorCode::StatusValidClient,
                state_transition: LicensingStateTransition::NoTransition,
                ..
            })
        ));
    }
}
