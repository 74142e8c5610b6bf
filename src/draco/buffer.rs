use super::{DracoError, DracoResult};

/// Little-endian cursor over a Draco bitstream.
#[derive(Clone, Debug)]
pub(crate) struct DecoderBuffer<'a> {
    data: &'a [u8],
    pos: usize,
    version: (u8, u8),
}

impl<'a> DecoderBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            version: (0, 0),
        }
    }

    pub fn set_version(&mut self, major: u8, minor: u8) {
        self.version = (major, minor);
    }

    pub fn version_at_least(&self, major: u8, minor: u8) -> bool {
        self.version >= (major, minor)
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn bytes(&mut self, len: usize) -> DracoResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(DracoError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(DracoError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> DracoResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> DracoResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn i8(&mut self) -> DracoResult<i8> {
        Ok(i8::from_le_bytes(self.array()?))
    }

    pub fn u16(&mut self) -> DracoResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> DracoResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> DracoResult<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> DracoResult<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// Unsigned LEB128.
    pub fn varint(&mut self) -> DracoResult<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DracoError::Malformed("varint overflow"))
    }

    pub fn varint_u32(&mut self) -> DracoResult<u32> {
        u32::try_from(self.varint()?).map_err(|_| DracoError::Malformed("varint exceeds 32 bits"))
    }

    /// Reads an LSB-first bit field starting at the cursor. The cursor moves
    /// past every byte the reader touched once it is finished.
    pub fn bit_reader(&mut self) -> BitReader<'a> {
        BitReader {
            data: &self.data[self.pos..],
            bit: 0,
        }
    }

    pub fn finish_bits(&mut self, reader: BitReader<'a>) {
        self.pos += reader.bit.div_ceil(8).min(reader.data.len());
    }
}

pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    bit: usize,
}

impl BitReader<'_> {
    pub fn bits(&mut self, count: u32) -> DracoResult<u32> {
        if count > 32 {
            return Err(DracoError::Malformed("bit field wider than 32 bits"));
        }
        let mut value = 0u32;
        for i in 0..count {
            let byte = *self.data.get(self.bit >> 3).ok_or(DracoError::Truncated)?;
            value |= u32::from((byte >> (self.bit & 7)) & 1) << i;
            self.bit += 1;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_is_little_endian_base_128() {
        let mut buffer = DecoderBuffer::new(&[0x05, 0xac, 0x02, 0x80]);
        assert_eq!(buffer.varint().unwrap(), 5);
        assert_eq!(buffer.varint().unwrap(), 300);
        assert_eq!(buffer.varint(), Err(DracoError::Truncated));
    }

    #[test]
    fn bits_are_read_lsb_first_and_consume_whole_bytes() {
        let mut buffer = DecoderBuffer::new(&[0b1011_0110, 0x01, 0xff]);
        let mut bits = buffer.bit_reader();
        assert_eq!(bits.bits(3).unwrap(), 0b110);
        assert_eq!(bits.bits(6).unwrap(), 0b1_10110);
        buffer.finish_bits(bits);
        assert_eq!(buffer.u8().unwrap(), 0xff);
    }
}
