use cobalt_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, read_padding, write_padding, Decode,
    DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

const UPDATE_TYPE_PALETTE: u16 = 0x0002;

/// TS_UPDATE_PALETTE_DATA
///
/// Feeds the per-session 8-bpp palette.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteUpdateData {
    pub entries: Vec<PaletteEntry>,
}

impl PaletteUpdateData {
    const NAME: &'static str = "TS_UPDATE_PALETTE_DATA";
    const FIXED_PART_SIZE: usize = 2 /* updateType */ + 2 /* pad */ + 4 /* numberColors */;
}

impl Encode for PaletteUpdateData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(UPDATE_TYPE_PALETTE);
        write_padding!(dst, 2);
        dst.write_u32(cast_length!(Self::NAME, "numberColors", self.entries.len())?);

        for entry in self.entries.iter() {
            dst.write_u8(entry.red);
            dst.write_u8(entry.green);
            dst.write_u8(entry.blue);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.entries.len() * 3
    }
}

impl<'de> Decode<'de> for PaletteUpdateData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let update_type = src.read_u16();
        if update_type != UPDATE_TYPE_PALETTE {
            return Err(invalid_field_err!("updateType", "invalid palette update type"));
        }

        read_padding!(src, 2);

        let number_colors = src.read_u32() as usize;
        if number_colors > 256 {
            return Err(invalid_field_err!("numberColors", "invalid palette entry count"));
        }

        ensure_size!(in: src, size: number_colors * 3);

        let mut entries = Vec::with_capacity(number_colors);
        for _ in 0..number_colors {
            entries.push(PaletteEntry {
                red: src.read_u8(),
                green: src.read_u8(),
                blue: src.read_u8(),
            });
        }

        Ok(Self { entries })
    }
}

/// TS_PALETTE_ENTRY
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PaletteEntry {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}
