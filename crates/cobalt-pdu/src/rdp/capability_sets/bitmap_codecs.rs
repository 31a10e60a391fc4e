use cobalt_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};

const NSCODEC_LENGTH: usize = 3;
const CODEC_HEADER_LENGTH: usize = 16 /* GUID */ + 1 /* codecId */ + 2 /* codecPropertiesLength */;

#[rustfmt::skip]
pub const GUID_NSCODEC: Guid = Guid(0xCA8D_1BB9, 0x000F, 0x154F, 0x58, 0x9F, 0xAE, 0x2D, 0x1A, 0x87, 0xE2, 0xD6);
#[rustfmt::skip]
pub const GUID_REMOTEFX: Guid = Guid(0x7677_2F12, 0xBD72, 0x4463, 0xAF, 0xB3, 0xB7, 0x3C, 0x9C, 0x6F, 0x78, 0x86);
#[rustfmt::skip]
pub const GUID_IMAGE_REMOTEFX: Guid = Guid(0x2744_CCD4, 0x9D8A, 0x4E74, 0x80, 0x3C, 0x0E, 0xCB, 0xEE, 0xA1, 0x9C, 0x54);
#[rustfmt::skip]
pub const GUID_IGNORE: Guid = Guid(0x9C43_51A6, 0x3535, 0x42AE, 0x91, 0x0C, 0xCD, 0xFC, 0xE5, 0x76, 0x0B, 0x58);

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Guid(pub u32, pub u16, pub u16, pub u8, pub u8, pub u8, pub u8, pub u8, pub u8, pub u8, pub u8);

impl Guid {
    const NAME: &'static str = "Guid";

    const FIXED_PART_SIZE: usize = 16;
}

impl Encode for Guid {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.0);
        dst.write_u16(self.1);
        dst.write_u16(self.2);
        dst.write_u8(self.3);
        dst.write_u8(self.4);
        dst.write_u8(self.5);
        dst.write_u8(self.6);
        dst.write_u8(self.7);
        dst.write_u8(self.8);
        dst.write_u8(self.9);
        dst.write_u8(self.10);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Guid {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let guid1 = src.read_u32();
        let guid2 = src.read_u16();
        let guid3 = src.read_u16();
        let guid4 = src.read_u8();
        let guid5 = src.read_u8();
        let guid6 = src.read_u8();
        let guid7 = src.read_u8();
        let guid8 = src.read_u8();
        let guid9 = src.read_u8();
        let guid10 = src.read_u8();
        let guid11 = src.read_u8();

        Ok(Guid(
            guid1, guid2, guid3, guid4, guid5, guid6, guid7, guid8, guid9, guid10, guid11,
        ))
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BitmapCodecs(pub Vec<Codec>);

impl BitmapCodecs {
    const NAME: &'static str = "BitmapCodecs";

    const FIXED_PART_SIZE: usize = 1 /* count */;
}

impl Encode for BitmapCodecs {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u8(cast_length!(Self::NAME, "len", self.0.len())?);

        for codec in self.0.iter() {
            codec.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.0.iter().map(Encode::size).sum::<usize>()
    }
}

impl<'de> Decode<'de> for BitmapCodecs {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let codecs_count = usize::from(src.read_u8());

        let mut codecs = Vec::with_capacity(codecs_count);
        for _ in 0..codecs_count {
            codecs.push(Codec::decode(src)?);
        }

        Ok(Self(codecs))
    }
}

/// TS_BITMAPCODEC
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Codec {
    /// The ID used to dispatch codec-specific surface bits payloads.
    pub id: u8,
    pub property: CodecProperty,
}

impl Codec {
    const NAME: &'static str = "Codec";

    const FIXED_PART_SIZE: usize = CODEC_HEADER_LENGTH;

    fn guid(&self) -> Guid {
        match &self.property {
            CodecProperty::NsCodec(_) => GUID_NSCODEC,
            CodecProperty::RemoteFx(_) => GUID_REMOTEFX,
            CodecProperty::ImageRemoteFx(_) => GUID_IMAGE_REMOTEFX,
            CodecProperty::Ignore => GUID_IGNORE,
        }
    }

    fn property_size(&self) -> usize {
        match &self.property {
            CodecProperty::NsCodec(_) => NSCODEC_LENGTH,
            CodecProperty::RemoteFx(buffer) | CodecProperty::ImageRemoteFx(buffer) => buffer.len(),
            CodecProperty::Ignore => 0,
        }
    }
}

impl Encode for Codec {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        self.guid().encode(dst)?;
        dst.write_u8(self.id);
        dst.write_u16(cast_length!(Self::NAME, "propertiesLen", self.property_size())?);

        match &self.property {
            CodecProperty::NsCodec(value) => value.encode(dst)?,
            CodecProperty::RemoteFx(buffer) | CodecProperty::ImageRemoteFx(buffer) => dst.write_slice(buffer),
            CodecProperty::Ignore => {}
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.property_size()
    }
}

impl<'de> Decode<'de> for Codec {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let guid = Guid::decode(src)?;
        let id = src.read_u8();
        let property_length = usize::from(src.read_u16());

        ensure_size!(in: src, size: property_length);
        let property_buffer = src.read_slice(property_length);

        let property = match guid {
            GUID_NSCODEC => CodecProperty::NsCodec(cobalt_core::decode(property_buffer)?),
            GUID_REMOTEFX => CodecProperty::RemoteFx(property_buffer.to_vec()),
            GUID_IMAGE_REMOTEFX => CodecProperty::ImageRemoteFx(property_buffer.to_vec()),
            _ => CodecProperty::Ignore,
        };

        Ok(Self { id, property })
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum CodecProperty {
    NsCodec(NsCodec),
    /// RemoteFX capability container, kept opaque: the codec itself is not
    /// implemented and surface bits carrying it are skipped.
    RemoteFx(Vec<u8>),
    ImageRemoteFx(Vec<u8>),
    Ignore,
}

/// TS_NSCODEC_CAPABILITYSET
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NsCodec {
    pub is_dynamic_fidelity_allowed: bool,
    pub is_subsampling_allowed: bool,
    /// Valid values are 1..=7.
    pub color_loss_level: u8,
}

impl NsCodec {
    const NAME: &'static str = "NsCodec";

    const FIXED_PART_SIZE: usize = NSCODEC_LENGTH;
}

impl Encode for NsCodec {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u8(u8::from(self.is_dynamic_fidelity_allowed));
        dst.write_u8(u8::from(self.is_subsampling_allowed));
        dst.write_u8(self.color_loss_level);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for NsCodec {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let is_dynamic_fidelity_allowed = src.read_u8() != 0;
        let is_subsampling_allowed = src.read_u8() != 0;

        let color_loss_level = src.read_u8();
        if !(1..=7).contains(&color_loss_level) {
            return Err(invalid_field_err!("colorLossLevel", "invalid color loss level"));
        }

        Ok(Self {
            is_dynamic_fidelity_allowed,
            is_subsampling_allowed,
            color_loss_level,
        })
    }
}

/// The codec ID this client advertises for NSCodec surface bits.
pub const CLIENT_NSCODEC_ID: u8 = 1;

/// The bitmap codecs capability set advertised by the client.
pub fn client_codecs_capabilities() -> BitmapCodecs {
    BitmapCodecs(vec![Codec {
        id: CLIENT_NSCODEC_ID,
        property: CodecProperty::NsCodec(NsCodec {
            is_dynamic_fidelity_allowed: true,
            is_subsampling_allowed: true,
            color_loss_level: 3,
        }),
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nscodec_guid_is_bit_exact() {
        let encoded = cobalt_core::encode_vec(&GUID_NSCODEC).unwrap();

        assert_eq!(
            encoded,
            vec![0xB9, 0x1B, 0x8D, 0xCA, 0x0F, 0x00, 0x4F, 0x15, 0x58, 0x9F, 0xAE, 0x2D, 0x1A, 0x87, 0xE2, 0xD6]
        );
    }

    #[test]
    fn client_codecs_round_trip() {
        let codecs = client_codecs_capabilities();

        let encoded = cobalt_core::encode_vec(&codecs).unwrap();
        let decoded: BitmapCodecs = cobalt_core::decode(&encoded).unwrap();

        assert_eq!(decoded, codecs);
    }
}
