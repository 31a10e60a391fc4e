use byteorder::{LittleEndian, ReadBytesExt as _};
use cobalt_core::{ensure_size, invalid_field_err, DecodeResult, ReadCursor, WriteCursor};
use num_derive::{FromPrimitive, ToPrimitive};

pub fn to_utf16_bytes(value: &str) -> Vec<u8> {
    value
        .encode_utf16()
        .flat_map(|i| i.to_le_bytes().to_vec())
        .collect::<Vec<u8>>()
}

pub fn from_utf16_bytes(mut value: &[u8]) -> String {
    let mut value_u16 = vec![0x00; value.len() / 2];
    value
        .read_u16_into::<LittleEndian>(value_u16.as_mut())
        .expect("read_u16_into cannot fail at this point");

    String::from_utf16_lossy(value_u16.as_ref())
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum CharacterSet {
    Ansi = 1,
    Unicode = 2,
}

impl CharacterSet {
    pub fn size(self) -> usize {
        match self {
            Self::Ansi => 1,
            Self::Unicode => 2,
        }
    }
}

/// Reads a string from the cursor using the specified character set.
///
/// If `read_null_terminator` is true, the string is read up to and including
/// the null terminator, otherwise up to the end of the cursor.
pub fn read_string_from_cursor(
    cursor: &mut ReadCursor<'_>,
    character_set: CharacterSet,
    read_null_terminator: bool,
) -> DecodeResult<String> {
    let size = if character_set == CharacterSet::Unicode {
        let code_units = if read_null_terminator {
            cursor
                .remaining()
                .chunks_exact(2)
                .position(|chunk| chunk == [0, 0])
                .map(|null_terminator_pos| null_terminator_pos + 1)
                .unwrap_or(cursor.len() / 2)
        } else {
            cursor.len() / 2
        };

        code_units * 2
    } else if read_null_terminator {
        cursor
            .remaining()
            .iter()
            .position(|&i| i == 0)
            .map(|null_terminator_pos| null_terminator_pos + 1)
            .unwrap_or(cursor.len())
    } else {
        cursor.len()
    };

    if size == 0 {
        return Ok(String::new());
    }

    let result = match character_set {
        CharacterSet::Unicode => {
            ensure_size!(ctx: "Decode string (UTF-16)", in: cursor, size: size);
            let slice = cursor.read_slice(size);

            from_utf16_bytes(slice)
        }
        CharacterSet::Ansi => {
            ensure_size!(ctx: "Decode string (UTF-8)", in: cursor, size: size);
            let slice = cursor.read_slice(size);

            String::from_utf8(slice.to_vec())
                .map_err(|_| invalid_field_err!("UTF8 decode", "buffer", "failed to decode UTF8 string"))?
        }
    };

    Ok(result.trim_end_matches('\0').into())
}

pub fn decode_string(src: &[u8], character_set: CharacterSet, read_null_terminator: bool) -> DecodeResult<String> {
    read_string_from_cursor(&mut ReadCursor::new(src), character_set, read_null_terminator)
}

/// Writes a string to the cursor, optionally with a null terminator.
pub fn write_string_to_cursor(
    cursor: &mut WriteCursor<'_>,
    value: &str,
    character_set: CharacterSet,
    write_null_terminator: bool,
) -> cobalt_core::EncodeResult<()> {
    match character_set {
        CharacterSet::Unicode => {
            let buffer = to_utf16_bytes(value);
            ensure_size!(ctx: "Encode string (UTF-16)", in: cursor, size: buffer.len() + if write_null_terminator { 2 } else { 0 });
            cursor.write_slice(&buffer);
            if write_null_terminator {
                cursor.write_u16(0);
            }
        }
        CharacterSet::Ansi => {
            ensure_size!(ctx: "Encode string (UTF-8)", in: cursor, size: value.len() + usize::from(write_null_terminator));
            cursor.write_slice(value.as_bytes());
            if write_null_terminator {
                cursor.write_u8(0);
            }
        }
    }

    Ok(())
}

/// The size in bytes of the given string when encoded with the given
/// character set, without a null terminator.
pub fn encoded_str_len(value: &str, character_set: CharacterSet, with_null_terminator: bool) -> usize {
    let len = match character_set {
        CharacterSet::Ansi => value.len(),
        CharacterSet::Unicode => value.encode_utf16().count() * 2,
    };

    len + if with_null_terminator { character_set.size() } else { 0 }
}
