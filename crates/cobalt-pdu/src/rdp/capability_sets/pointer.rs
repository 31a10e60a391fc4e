use cobalt_core::{ensure_size, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor};

const POINTER_LENGTH: usize = 6;
const POINTER_SHORT_LENGTH: usize = 4;

/// Pointer Capability Set.
///
/// Some servers send the 4-byte short form without `pointerCacheSize`; both
/// shapes are accepted when decoding.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Pointer {
    pub color_pointer_cache_size: u16,
    pub pointer_cache_size: u16,
}

impl Pointer {
    const NAME: &'static str = "Pointer";

    const FIXED_PART_SIZE: usize = POINTER_LENGTH;
}

impl Encode for Pointer {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: Self::FIXED_PART_SIZE);

        dst.write_u16(1); // colorPointerFlag
        dst.write_u16(self.color_pointer_cache_size);
        dst.write_u16(self.pointer_cache_size);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Pointer {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: POINTER_SHORT_LENGTH);

        let _color_pointer_flag = src.read_u16() != 0;
        let color_pointer_cache_size = src.read_u16();
        let pointer_cache_size = src.try_read_u16().unwrap_or(color_pointer_cache_size);

        Ok(Pointer {
            color_pointer_cache_size,
            pointer_cache_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_is_accepted() {
        let buffer = [0x01, 0x00, 0x14, 0x00];

        let pointer: Pointer = cobalt_core::decode(&buffer).unwrap();

        assert_eq!(pointer.color_pointer_cache_size, 0x14);
        assert_eq!(pointer.pointer_cache_size, 0x14);
    }

    #[test]
    fn full_form_round_trip() {
        let pointer = Pointer {
            color_pointer_cache_size: 32,
            pointer_cache_size: 32,
        };

        let encoded = cobalt_core::encode_vec(&pointer).unwrap();
        let decoded: Pointer = cobalt_core::decode(&encoded).unwrap();

        assert_eq!(decoded, pointer);
    }
}
