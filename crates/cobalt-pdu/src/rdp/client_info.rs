use core::fmt;

use bitflags::bitflags;
use cobalt_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

use crate::utils::{self, CharacterSet};

const COMPRESSION_TYPE_MASK: u32 = 0x0000_1E00;

const CODE_PAGE_SIZE: usize = 4;
const FLAGS_SIZE: usize = 4;
const DOMAIN_LENGTH_SIZE: usize = 2;
const USER_NAME_LENGTH_SIZE: usize = 2;
const PASSWORD_LENGTH_SIZE: usize = 2;
const ALTERNATE_SHELL_LENGTH_SIZE: usize = 2;
const WORK_DIR_LENGTH_SIZE: usize = 2;

const CLIENT_ADDRESS_FAMILY_SIZE: usize = 2;
const CLIENT_ADDRESS_LENGTH_SIZE: usize = 2;
const CLIENT_DIR_LENGTH_SIZE: usize = 2;
const SESSION_ID_SIZE: usize = 4;
const PERFORMANCE_FLAGS_SIZE: usize = 4;

/// [2.2.1.11.1.1] Info Packet (TS_INFO_PACKET)
///
/// [2.2.1.11.1.1]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/732394f5-e2b5-4ac5-8a0a-35345386b0d1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub credentials: Credentials,
    pub code_page: u32,
    pub flags: ClientInfoFlags,
    pub compression_type: CompressionType,
    pub alternate_shell: String,
    pub work_dir: String,
    pub extra_info: ExtendedClientInfo,
}

impl ClientInfo {
    const NAME: &'static str = "ClientInfo";

    const FIXED_PART_SIZE: usize = CODE_PAGE_SIZE
        + FLAGS_SIZE
        + DOMAIN_LENGTH_SIZE
        + USER_NAME_LENGTH_SIZE
        + PASSWORD_LENGTH_SIZE
        + ALTERNATE_SHELL_LENGTH_SIZE
        + WORK_DIR_LENGTH_SIZE;

    fn character_set(&self) -> CharacterSet {
        if self.flags.contains(ClientInfoFlags::UNICODE) {
            CharacterSet::Unicode
        } else {
            CharacterSet::Ansi
        }
    }
}

impl Encode for ClientInfo {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let character_set = self.character_set();

        dst.write_u32(self.code_page);

        let flags_with_compression_type =
            self.flags.bits() | (self.compression_type.to_u32().unwrap_or(0) << 9);
        dst.write_u32(flags_with_compression_type);

        let domain = self.credentials.domain.clone().unwrap_or_default();

        // Sizes exclude the mandatory null terminator.
        dst.write_u16(cast_length!(
            Self::NAME,
            "domainLen",
            utils::encoded_str_len(&domain, character_set, false)
        )?);
        dst.write_u16(cast_length!(
            Self::NAME,
            "userNameLen",
            utils::encoded_str_len(&self.credentials.username, character_set, false)
        )?);
        dst.write_u16(cast_length!(
            Self::NAME,
            "passwordLen",
            utils::encoded_str_len(&self.credentials.password, character_set, false)
        )?);
        dst.write_u16(cast_length!(
            Self::NAME,
            "alternateShellLen",
            utils::encoded_str_len(&self.alternate_shell, character_set, false)
        )?);
        dst.write_u16(cast_length!(
            Self::NAME,
            "workDirLen",
            utils::encoded_str_len(&self.work_dir, character_set, false)
        )?);

        utils::write_string_to_cursor(dst, &domain, character_set, true)?;
        utils::write_string_to_cursor(dst, &self.credentials.username, character_set, true)?;
        utils::write_string_to_cursor(dst, &self.credentials.password, character_set, true)?;
        utils::write_string_to_cursor(dst, &self.alternate_shell, character_set, true)?;
        utils::write_string_to_cursor(dst, &self.work_dir, character_set, true)?;

        self.extra_info.encode(dst, character_set)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let character_set = self.character_set();
        let domain = self.credentials.domain.as_deref().unwrap_or_default();

        Self::FIXED_PART_SIZE
            + utils::encoded_str_len(domain, character_set, true)
            + utils::encoded_str_len(&self.credentials.username, character_set, true)
            + utils::encoded_str_len(&self.credentials.password, character_set, true)
            + utils::encoded_str_len(&self.alternate_shell, character_set, true)
            + utils::encoded_str_len(&self.work_dir, character_set, true)
            + self.extra_info.size(character_set)
    }
}

impl<'de> Decode<'de> for ClientInfo {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let code_page = src.read_u32();
        let flags_with_compression_type = src.read_u32();

        let flags = ClientInfoFlags::from_bits_truncate(flags_with_compression_type & !COMPRESSION_TYPE_MASK);
        let compression_type =
            CompressionType::from_u32((flags_with_compression_type & COMPRESSION_TYPE_MASK) >> 9)
                .ok_or_else(|| invalid_field_err!("compressionType", "invalid compression type"))?;

        let character_set = if flags.contains(ClientInfoFlags::UNICODE) {
            CharacterSet::Unicode
        } else {
            CharacterSet::Ansi
        };

        // Sizes exclude the mandatory null terminator.
        let domain_size = usize::from(src.read_u16());
        let user_name_size = usize::from(src.read_u16());
        let password_size = usize::from(src.read_u16());
        let alternate_shell_size = usize::from(src.read_u16());
        let work_dir_size = usize::from(src.read_u16());

        let domain = read_sized_string(src, domain_size + character_set.size(), character_set)?;
        let username = read_sized_string(src, user_name_size + character_set.size(), character_set)?;
        let password = read_sized_string(src, password_size + character_set.size(), character_set)?;

        let domain = if domain.is_empty() { None } else { Some(domain) };
        let credentials = Credentials {
            username,
            password,
            domain,
        };

        let alternate_shell = read_sized_string(src, alternate_shell_size + character_set.size(), character_set)?;
        let work_dir = read_sized_string(src, work_dir_size + character_set.size(), character_set)?;

        let extra_info = ExtendedClientInfo::decode(src, character_set)?;

        Ok(Self {
            credentials,
            code_page,
            flags,
            compression_type,
            alternate_shell,
            work_dir,
            extra_info,
        })
    }
}

fn read_sized_string(src: &mut ReadCursor<'_>, size: usize, character_set: CharacterSet) -> DecodeResult<String> {
    ensure_size!(ctx: "read_sized_string", in: src, size: size);
    utils::decode_string(src.read_slice(size), character_set, false)
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // NOTE: do not show the secret (user password)
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedClientInfo {
    pub address_family: AddressFamily,
    pub address: String,
    pub dir: String,
    pub optional_data: ExtendedClientOptionalInfo,
}

impl ExtendedClientInfo {
    const NAME: &'static str = "ExtendedClientInfo";

    fn decode(src: &mut ReadCursor<'_>, character_set: CharacterSet) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: CLIENT_ADDRESS_FAMILY_SIZE + CLIENT_ADDRESS_LENGTH_SIZE);

        let address_family = AddressFamily::from_u16(src.read_u16())
            .ok_or_else(|| invalid_field_err!(Self::NAME, "addressFamily", "invalid address family"))?;

        // This size includes the length of the mandatory null terminator.
        let address_size = usize::from(src.read_u16());
        let address = read_sized_string(src, address_size, character_set)?;

        ensure_size!(ctx: Self::NAME, in: src, size: CLIENT_DIR_LENGTH_SIZE);
        let dir_size = usize::from(src.read_u16());
        let dir = read_sized_string(src, dir_size, character_set)?;

        let optional_data = ExtendedClientOptionalInfo::decode(src)?;

        Ok(Self {
            address_family,
            address,
            dir,
            optional_data,
        })
    }

    fn encode(&self, dst: &mut WriteCursor<'_>, character_set: CharacterSet) -> EncodeResult<()> {
        dst.write_u16(self.address_family.to_u16().unwrap_or(0));

        // This size includes the length of the mandatory null terminator.
        dst.write_u16(cast_length!(
            Self::NAME,
            "addressLen",
            utils::encoded_str_len(&self.address, character_set, true)
        )?);
        utils::write_string_to_cursor(dst, &self.address, character_set, true)?;

        dst.write_u16(cast_length!(
            Self::NAME,
            "dirLen",
            utils::encoded_str_len(&self.dir, character_set, true)
        )?);
        utils::write_string_to_cursor(dst, &self.dir, character_set, true)?;

        self.optional_data.encode(dst)
    }

    fn size(&self, character_set: CharacterSet) -> usize {
        CLIENT_ADDRESS_FAMILY_SIZE
            + CLIENT_ADDRESS_LENGTH_SIZE
            + utils::encoded_str_len(&self.address, character_set, true)
            + CLIENT_DIR_LENGTH_SIZE
            + utils::encoded_str_len(&self.dir, character_set, true)
            + self.optional_data.size()
    }
}

/// TS_EXTENDED_INFO_PACKET optional fields.
///
/// Everything after the client directory is optional, and each field requires
/// all previous ones to be present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedClientOptionalInfo {
    pub timezone: Option<Vec<u8>>,
    pub session_id: Option<u32>,
    pub performance_flags: Option<PerformanceFlags>,
}

impl ExtendedClientOptionalInfo {
    const NAME: &'static str = "ExtendedClientOptionalInfo";

    const TIMEZONE_SIZE: usize = 172;

    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        let mut optional_data = Self::default();

        if src.len() < Self::TIMEZONE_SIZE {
            return Ok(optional_data);
        }
        optional_data.timezone = Some(src.read_slice(Self::TIMEZONE_SIZE).to_vec());

        let Ok(session_id) = src.try_read_u32() else {
            return Ok(optional_data);
        };
        optional_data.session_id = Some(session_id);

        let Ok(performance_flags) = src.try_read_u32() else {
            return Ok(optional_data);
        };
        optional_data.performance_flags = Some(PerformanceFlags::from_bits_truncate(performance_flags));

        Ok(optional_data)
    }

    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        if let Some(ref timezone) = self.timezone {
            if timezone.len() != Self::TIMEZONE_SIZE {
                return Err(invalid_field_err!("clientTimeZone", "invalid time zone info size"));
            }
            dst.write_slice(timezone);
        }

        if let Some(session_id) = self.session_id {
            if self.timezone.is_none() {
                return Err(invalid_field_err!("clientTimeZone", "field must be present"));
            }
            dst.write_u32(session_id);
        }

        if let Some(performance_flags) = self.performance_flags {
            if self.session_id.is_none() {
                return Err(invalid_field_err!("sessionId", "field must be present"));
            }
            dst.write_u32(performance_flags.bits());
        }

        Ok(())
    }

    fn size(&self) -> usize {
        let mut size = 0;

        if self.timezone.is_some() {
            size += Self::TIMEZONE_SIZE;
        }
        if self.session_id.is_some() {
            size += SESSION_ID_SIZE;
        }
        if self.performance_flags.is_some() {
            size += PERFORMANCE_FLAGS_SIZE;
        }

        size
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum AddressFamily {
    INet = 0x0002,
    INet6 = 0x0017,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum CompressionType {
    K8 = 0,
    K64 = 1,
    Rdp6 = 2,
    Rdp61 = 3,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ClientInfoFlags: u32 {
        /// INFO_MOUSE
        const MOUSE = 0x0000_0001;
        /// INFO_DISABLECTRLALTDEL
        const DISABLE_CTRL_ALT_DEL = 0x0000_0002;
        /// INFO_AUTOLOGON
        const AUTOLOGON = 0x0000_0008;
        /// INFO_UNICODE
        const UNICODE = 0x0000_0010;
        /// INFO_MAXIMIZESHELL
        const MAXIMIZE_SHELL = 0x0000_0020;
        /// INFO_LOGONNOTIFY
        const LOGON_NOTIFY = 0x0000_0040;
        /// INFO_COMPRESSION
        const COMPRESSION = 0x0000_0080;
        /// INFO_ENABLEWINDOWSKEY
        const ENABLE_WINDOWS_KEY = 0x0000_0100;
        /// INFO_REMOTECONSOLEAUDIO
        const REMOTE_CONSOLE_AUDIO = 0x0000_2000;
        /// INFO_FORCE_ENCRYPTED_CS_PDU
        const FORCE_ENCRYPTED_CS_PDU = 0x0000_4000;
        /// INFO_RAIL
        const RAIL = 0x0000_8000;
        /// INFO_LOGONERRORS
        const LOGON_ERRORS = 0x0001_0000;
        /// INFO_MOUSE_HAS_WHEEL
        const MOUSE_HAS_WHEEL = 0x0002_0000;
        /// INFO_PASSWORD_IS_SC_PIN
        const PASSWORD_IS_SC_PIN = 0x0004_0000;
        /// INFO_NOAUDIOPLAYBACK
        const NO_AUDIO_PLAYBACK = 0x0008_0000;
        /// INFO_USING_SAVED_CREDS
        const USING_SAVED_CREDS = 0x0010_0000;
        /// INFO_AUDIOCAPTURE
        const AUDIO_CAPTURE = 0x0020_0000;
        /// INFO_VIDEO_DISABLE
        const VIDEO_DISABLE = 0x0040_0000;
        /// INFO_HIDEF_RAIL_SUPPORTED
        const HIDEF_RAIL_SUPPORTED = 0x0200_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct PerformanceFlags: u32 {
        const DISABLE_WALLPAPER = 0x0000_0001;
        const DISABLE_FULLWINDOWDRAG = 0x0000_0002;
        const DISABLE_MENUANIMATIONS = 0x0000_0004;
        const DISABLE_THEMING = 0x0000_0008;
        const DISABLE_CURSOR_SHADOW = 0x0000_0020;
        const DISABLE_CURSORSETTINGS = 0x0000_0040;
        const ENABLE_FONT_SMOOTHING = 0x0000_0080;
        const ENABLE_DESKTOP_COMPOSITION = 0x0000_0100;
    }
}

impl Default for PerformanceFlags {
    fn default() -> Self {
        Self::DISABLE_FULLWINDOWDRAG | Self::DISABLE_MENUANIMATIONS | Self::DISABLE_WALLPAPER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_info_round_trip() {
        let info = ClientInfo {
            credentials: Credentials {
                username: "User".to_owned(),
                password: "Password".to_owned(),
                domain: Some("Domain".to_owned()),
            },
            code_page: 0,
            flags: ClientInfoFlags::MOUSE | ClientInfoFlags::UNICODE,
            compression_type: CompressionType::K8,
            alternate_shell: String::new(),
            work_dir: String::new(),
            extra_info: ExtendedClientInfo {
                address_family: AddressFamily::INet,
                address: "192.168.0.100".to_owned(),
                dir: "C:\\Users".to_owned(),
                optional_data: ExtendedClientOptionalInfo::default(),
            },
        };

        let encoded = cobalt_core::encode_vec(&info).unwrap();
        assert_eq!(encoded.len(), info.size());

        let decoded: ClientInfo = cobalt_core::decode(&encoded).unwrap();
        assert_eq!(decoded, info);
    }
}
