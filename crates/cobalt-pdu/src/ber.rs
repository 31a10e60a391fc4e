//! BER encoding primitives for the MCS Connect Initial / Connect Response
//! sequence (T.125).

#![allow(dead_code)]

use cobalt_core::{ensure_size, invalid_field_err, DecodeResult, EncodeResult, ReadCursor, WriteCursor};

const CTX: &str = "BER";

#[repr(u8)]
enum Pc {
    Primitive = 0x00,
    Construct = 0x20,
}

#[repr(u8)]
enum Class {
    Universal = 0x00,
    Application = 0x40,
}

#[repr(u8)]
enum Tag {
    Boolean = 0x01,
    Integer = 0x02,
    OctetString = 0x04,
    Enumerated = 0x0A,
    Sequence = 0x10,
}

pub(crate) const SIZEOF_ENUMERATED: usize = 3;
pub(crate) const SIZEOF_BOOL: usize = 3;

const TAG_MASK: u8 = 0x1F;

pub(crate) fn sizeof_application_tag(tagnum: u8, length: u16) -> usize {
    let tag_len = if tagnum > 0x1E { 2 } else { 1 };

    sizeof_length(length) + tag_len
}

pub(crate) fn sizeof_sequence_tag(length: u16) -> usize {
    1 + sizeof_length(length)
}

pub(crate) fn sizeof_octet_string(length: u16) -> usize {
    1 + sizeof_length(length) + usize::from(length)
}

pub(crate) fn sizeof_integer(value: u32) -> usize {
    if value < 0x0000_0080 {
        3
    } else if value < 0x0000_8000 {
        4
    } else if value < 0x0080_0000 {
        5
    } else {
        6
    }
}

fn sizeof_length(length: u16) -> usize {
    if length > 0xFF {
        3
    } else if length > 0x7F {
        2
    } else {
        1
    }
}

pub(crate) fn write_sequence_tag(dst: &mut WriteCursor<'_>, length: u16) -> EncodeResult<()> {
    write_universal_tag(dst, Tag::Sequence, Pc::Construct)?;
    write_length(dst, length)
}

pub(crate) fn read_sequence_tag(src: &mut ReadCursor<'_>) -> DecodeResult<u16> {
    ensure_size!(ctx: CTX, in: src, size: 1);
    let identifier = src.read_u8();

    if identifier != Class::Universal as u8 | Pc::Construct as u8 | (TAG_MASK & Tag::Sequence as u8) {
        Err(invalid_field_err!(CTX, "identifier", "invalid sequence tag identifier"))
    } else {
        read_length(src)
    }
}

pub(crate) fn write_application_tag(dst: &mut WriteCursor<'_>, tagnum: u8, length: u16) -> EncodeResult<()> {
    ensure_size!(ctx: CTX, in: dst, size: sizeof_application_tag(tagnum, length));

    if tagnum > 0x1E {
        dst.write_u8(Class::Application as u8 | Pc::Construct as u8 | TAG_MASK);
        dst.write_u8(tagnum);
    } else {
        dst.write_u8(Class::Application as u8 | Pc::Construct as u8 | (TAG_MASK & tagnum));
    }

    write_length(dst, length)
}

pub(crate) fn read_application_tag(src: &mut ReadCursor<'_>, tagnum: u8) -> DecodeResult<u16> {
    ensure_size!(ctx: CTX, in: src, size: 1);
    let identifier = src.read_u8();

    if tagnum > 0x1E {
        if identifier != Class::Application as u8 | Pc::Construct as u8 | TAG_MASK {
            return Err(invalid_field_err!(CTX, "identifier", "invalid application tag identifier"));
        }

        ensure_size!(ctx: CTX, in: src, size: 1);
        if src.read_u8() != tagnum {
            return Err(invalid_field_err!(CTX, "tagnum", "invalid application tag identifier"));
        }
    } else if identifier != Class::Application as u8 | Pc::Construct as u8 | (TAG_MASK & tagnum) {
        return Err(invalid_field_err!(CTX, "identifier", "invalid application tag identifier"));
    }

    read_length(src)
}

pub(crate) fn write_enumerated(dst: &mut WriteCursor<'_>, enumerated: u8) -> EncodeResult<()> {
    write_universal_tag(dst, Tag::Enumerated, Pc::Primitive)?;
    write_length(dst, 1)?;

    ensure_size!(ctx: CTX, in: dst, size: 1);
    dst.write_u8(enumerated);

    Ok(())
}

pub(crate) fn read_enumerated(src: &mut ReadCursor<'_>, count: u8) -> DecodeResult<u8> {
    read_universal_tag(src, Tag::Enumerated, Pc::Primitive)?;

    let length = read_length(src)?;
    if length != 1 {
        return Err(invalid_field_err!(CTX, "len", "invalid enumerated len"));
    }

    ensure_size!(ctx: CTX, in: src, size: 1);
    let enumerated = src.read_u8();
    if enumerated == u8::MAX || enumerated + 1 > count {
        return Err(invalid_field_err!(CTX, "enumerated", "invalid enumerated value"));
    }

    Ok(enumerated)
}

pub(crate) fn write_integer(dst: &mut WriteCursor<'_>, value: u32) -> EncodeResult<()> {
    write_universal_tag(dst, Tag::Integer, Pc::Primitive)?;

    if value < 0x0000_0080 {
        write_length(dst, 1)?;
        ensure_size!(ctx: CTX, in: dst, size: 1);
        dst.write_u8(value as u8);
    } else if value < 0x0000_8000 {
        write_length(dst, 2)?;
        ensure_size!(ctx: CTX, in: dst, size: 2);
        dst.write_u16_be(value as u16);
    } else if value < 0x0080_0000 {
        write_length(dst, 3)?;
        ensure_size!(ctx: CTX, in: dst, size: 3);
        dst.write_u8((value >> 16) as u8);
        dst.write_u16_be((value & 0xFFFF) as u16);
    } else {
        write_length(dst, 4)?;
        ensure_size!(ctx: CTX, in: dst, size: 4);
        dst.write_u32_be(value);
    }

    Ok(())
}

pub(crate) fn read_integer(src: &mut ReadCursor<'_>) -> DecodeResult<u64> {
    read_universal_tag(src, Tag::Integer, Pc::Primitive)?;
    let length = read_length(src)?;

    match length {
        1 => {
            ensure_size!(ctx: CTX, in: src, size: 1);
            Ok(u64::from(src.read_u8()))
        }
        2 => {
            ensure_size!(ctx: CTX, in: src, size: 2);
            Ok(u64::from(src.read_u16_be()))
        }
        3 => {
            ensure_size!(ctx: CTX, in: src, size: 3);
            let a = src.read_u8();
            let b = src.read_u16_be();

            Ok(u64::from(b) + (u64::from(a) << 16))
        }
        4 => {
            ensure_size!(ctx: CTX, in: src, size: 4);
            Ok(u64::from(src.read_u32_be()))
        }
        _ => Err(invalid_field_err!(CTX, "len", "invalid integer len")),
    }
}

pub(crate) fn write_bool(dst: &mut WriteCursor<'_>, value: bool) -> EncodeResult<()> {
    write_universal_tag(dst, Tag::Boolean, Pc::Primitive)?;
    write_length(dst, 1)?;

    ensure_size!(ctx: CTX, in: dst, size: 1);
    dst.write_u8(if value { 0xFF } else { 0x00 });

    Ok(())
}

pub(crate) fn read_bool(src: &mut ReadCursor<'_>) -> DecodeResult<bool> {
    read_universal_tag(src, Tag::Boolean, Pc::Primitive)?;
    let length = read_length(src)?;

    if length != 1 {
        return Err(invalid_field_err!(CTX, "len", "invalid boolean len"));
    }

    ensure_size!(ctx: CTX, in: src, size: 1);
    Ok(src.read_u8() != 0)
}

pub(crate) fn write_octet_string(dst: &mut WriteCursor<'_>, value: &[u8]) -> EncodeResult<()> {
    write_octet_string_tag(dst, cobalt_core::cast_length!(CTX, "len", value.len())?)?;
    ensure_size!(ctx: CTX, in: dst, size: value.len());
    dst.write_slice(value);
    Ok(())
}

pub(crate) fn write_octet_string_tag(dst: &mut WriteCursor<'_>, length: u16) -> EncodeResult<()> {
    write_universal_tag(dst, Tag::OctetString, Pc::Primitive)?;
    write_length(dst, length)
}

pub(crate) fn read_octet_string(src: &mut ReadCursor<'_>) -> DecodeResult<Vec<u8>> {
    let length = usize::from(read_octet_string_tag(src)?);

    ensure_size!(ctx: CTX, in: src, size: length);
    let buffer = src.read_slice(length);

    Ok(buffer.into())
}

pub(crate) fn read_octet_string_tag(src: &mut ReadCursor<'_>) -> DecodeResult<u16> {
    read_universal_tag(src, Tag::OctetString, Pc::Primitive)?;
    read_length(src)
}

fn write_universal_tag(dst: &mut WriteCursor<'_>, tag: Tag, pc: Pc) -> EncodeResult<()> {
    ensure_size!(ctx: CTX, in: dst, size: 1);

    let identifier = Class::Universal as u8 | pc as u8 | (TAG_MASK & tag as u8);
    dst.write_u8(identifier);

    Ok(())
}

fn read_universal_tag(src: &mut ReadCursor<'_>, tag: Tag, pc: Pc) -> DecodeResult<()> {
    ensure_size!(ctx: CTX, in: src, size: 1);

    let identifier = src.read_u8();

    if identifier != Class::Universal as u8 | pc as u8 | (TAG_MASK & tag as u8) {
        Err(invalid_field_err!(CTX, "identifier", "invalid universal tag identifier"))
    } else {
        Ok(())
    }
}

fn write_length(dst: &mut WriteCursor<'_>, length: u16) -> EncodeResult<()> {
    ensure_size!(ctx: CTX, in: dst, size: sizeof_length(length));

    if length > 0xFF {
        dst.write_u8(0x80 | 0x02);
        dst.write_u16_be(length);
    } else if length > 0x7F {
        dst.write_u8(0x80 | 0x01);
        dst.write_u8(length as u8);
    } else {
        dst.write_u8(length as u8);
    }

    Ok(())
}

fn read_length(src: &mut ReadCursor<'_>) -> DecodeResult<u16> {
    ensure_size!(ctx: CTX, in: src, size: 1);
    let byte = src.read_u8();

    if byte & 0x80 != 0 {
        let len = byte & !0x80;

        match len {
            1 => {
                ensure_size!(ctx: CTX, in: src, size: 1);
                Ok(u16::from(src.read_u8()))
            }
            2 => {
                ensure_size!(ctx: CTX, in: src, size: 2);
                Ok(src.read_u16_be())
            }
            _ => Err(invalid_field_err!(CTX, "len", "invalid length of the length")),
        }
    } else {
        Ok(u16::from(byte))
    }
}
