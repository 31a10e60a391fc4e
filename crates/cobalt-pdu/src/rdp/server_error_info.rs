use cobalt_core::{ensure_fixed_part_size, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

/// [2.2.5.1.1] Set Error Info PDU Data (TS_SET_ERROR_INFO_PDU)
///
/// [2.2.5.1.1]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/a75e8c57-bae2-4c7c-8e6d-1b0c7b9e05be
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSetErrorInfoPdu(pub ErrorInfo);

impl ServerSetErrorInfoPdu {
    const NAME: &'static str = "ServerSetErrorInfo";

    const FIXED_PART_SIZE: usize = 4 /* errorInfo */;
}

impl Encode for ServerSetErrorInfoPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.0.as_u32());

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for ServerSetErrorInfoPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let error_info = ErrorInfo::from_u32(src.read_u32());

        Ok(Self(error_info))
    }
}

/// The error code carried by a Set Error Info PDU, surfaced verbatim on
/// disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorInfo {
    ProtocolIndependentCode(ProtocolIndependentCode),
    LicensingCode(LicensingCode),
    Unknown(u32),
}

impl ErrorInfo {
    pub fn from_u32(value: u32) -> Self {
        if let Some(code) = ProtocolIndependentCode::from_u32(value) {
            Self::ProtocolIndependentCode(code)
        } else if let Some(code) = LicensingCode::from_u32(value) {
            Self::LicensingCode(code)
        } else {
            Self::Unknown(value)
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::ProtocolIndependentCode(code) => code.to_u32().unwrap_or(0),
            Self::LicensingCode(code) => code.to_u32().unwrap_or(0),
            Self::Unknown(value) => value,
        }
    }

    pub fn description(self) -> String {
        match self {
            Self::ProtocolIndependentCode(code) => format!("[protocol independent]: {}", code.description()),
            Self::LicensingCode(code) => format!("[licensing]: {}", code.description()),
            Self::Unknown(value) => format!("unknown error info code: 0x{value:08X}"),
        }
    }
}

/// Protocol-independent error info codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ProtocolIndependentCode {
    None = 0x0000_0000,
    RpcInitiatedDisconnect = 0x0000_0001,
    RpcInitiatedLogoff = 0x0000_0002,
    IdleTimeout = 0x0000_0003,
    LogonTimeout = 0x0000_0004,
    DisconnectedByOtherConnection = 0x0000_0005,
    OutOfMemory = 0x0000_0006,
    ServerDeniedConnection = 0x0000_0007,
    ServerInsufficientPrivileges = 0x0000_0009,
    ServerFreshCredentialsRequired = 0x0000_000A,
    RpcInitiatedDisconnectByUser = 0x0000_000B,
    LogoffByUser = 0x0000_000C,
}

impl ProtocolIndependentCode {
    pub fn description(self) -> &'static str {
        match self {
            Self::None => "no error",
            Self::RpcInitiatedDisconnect => "the disconnection was initiated by an administrative tool on the server",
            Self::RpcInitiatedLogoff => "the disconnection was due to a forced logoff initiated by an administrative tool on the server",
            Self::IdleTimeout => "the idle session limit timer on the server has elapsed",
            Self::LogonTimeout => "the active session limit timer on the server has elapsed",
            Self::DisconnectedByOtherConnection => "another user connected to the session, forcing the disconnection of the current connection",
            Self::OutOfMemory => "the server ran out of available memory resources",
            Self::ServerDeniedConnection => "the server denied the connection",
            Self::ServerInsufficientPrivileges => "the user cannot connect to the server due to insufficient access privileges",
            Self::ServerFreshCredentialsRequired => "the server does not accept saved user credentials and requires that the user enter their credentials for each connection",
            Self::RpcInitiatedDisconnectByUser => "the disconnection was initiated by an administrative tool on the server running in the user's session",
            Self::LogoffByUser => "the disconnection was initiated by the user logging off their session on the server",
        }
    }
}

/// Licensing error info codes, `0x0100`..`0x010A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum LicensingCode {
    Internal = 0x0000_0100,
    NoLicenseServer = 0x0000_0101,
    NoLicense = 0x0000_0102,
    BadClientMsg = 0x0000_0103,
    HwidDoesntMatchLicense = 0x0000_0104,
    BadClientLicense = 0x0000_0105,
    CantFinishProtocol = 0x0000_0106,
    ClientEndedProtocol = 0x0000_0107,
    BadClientEncryption = 0x0000_0108,
    CantUpgradeLicense = 0x0000_0109,
    NoRemoteConnections = 0x0000_010A,
}

impl LicensingCode {
    pub fn description(self) -> &'static str {
        match self {
            Self::Internal => "an internal error has occurred in the Terminal Services licensing component",
            Self::NoLicenseServer => "a Remote Desktop License Server could not be found",
            Self::NoLicense => "there are no Client Access Licenses available for the target remote computer",
            Self::BadClientMsg => "the remote computer received an invalid licensing message from the client",
            Self::HwidDoesntMatchLicense => "the Client Access License stored by the client has been modified",
            Self::BadClientLicense => "the Client Access License stored by the client is in an invalid format",
            Self::CantFinishProtocol => "network problems have caused the licensing protocol to be terminated",
            Self::ClientEndedProtocol => "the client prematurely ended the licensing protocol",
            Self::BadClientEncryption => "a licensing message was incorrectly encrypted",
            Self::CantUpgradeLicense => "the Client Access License stored by the client could not be upgraded or renewed",
            Self::NoRemoteConnections => "the remote computer is not licensed to accept remote connections",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_codes_are_mapped() {
        assert_eq!(
            ErrorInfo::from_u32(0x0000_0003),
            ErrorInfo::ProtocolIndependentCode(ProtocolIndependentCode::IdleTimeout)
        );
        assert_eq!(
            ErrorInfo::from_u32(0x0000_010A),
            ErrorInfo::LicensingCode(LicensingCode::NoRemoteConnections)
        );
        assert_eq!(ErrorInfo::from_u32(0xDEAD_BEEF), ErrorInfo::Unknown(0xDEAD_BEEF));
    }

    #[test]
    fn code_survives_round_trip() {
        for code in [0x0000_0001, 0x0000_000C, 0x0000_0105, 0x1234_5678] {
            assert_eq!(ErrorInfo::from_u32(code).as_u32(), code);
        }
    }
}
