use super::buffer::DecoderBuffer;
use super::{DracoError, DracoResult};

const TAGGED: u8 = 0;
const RAW: u8 = 1;
const TAG_BIT_LENGTH: u32 = 5;
const IO_BASE: u32 = 256;
const MAX_RAW_BIT_LENGTH: u8 = 18;

/// rANS precision used for an alphabet whose symbols span `bit_length` bits.
fn precision_bits(bit_length: u32) -> u32 {
    ((3 * bit_length) / 2).clamp(12, 20)
}

/// Table-driven rANS decoder over a probability table sent ahead of the data.
struct RansSymbolDecoder<'a> {
    precision: u32,
    probabilities: Vec<u32>,
    cumulative: Vec<u32>,
    lookup: Vec<u32>,
    data: &'a [u8],
    offset: usize,
    state: u32,
}

impl<'a> RansSymbolDecoder<'a> {
    fn create(buffer: &mut DecoderBuffer<'a>, bit_length: u32) -> DracoResult<Self> {
        let num_symbols = buffer.varint_u32()?;
        if (num_symbols / 64) as usize > buffer.remaining() {
            return Err(DracoError::Malformed("symbol table larger than stream"));
        }

        let num_symbols = num_symbols as usize;
        let mut probabilities = vec![0u32; num_symbols];
        let mut i = 0;
        while i < num_symbols {
            let head = buffer.u8()?;
            let token = head & 3;
            if token == 3 {
                // Run of zero-probability symbols.
                let run = usize::from(head >> 2);
                if i + run >= num_symbols {
                    return Err(DracoError::Malformed("zero run past alphabet"));
                }
                i += run + 1;
            } else {
                let mut probability = u32::from(head >> 2);
                for b in 0..u32::from(token) {
                    probability |= u32::from(buffer.u8()?) << (8 * (b + 1) - 2);
                }
                probabilities[i] = probability;
                i += 1;
            }
        }

        let precision = 1u32 << precision_bits(bit_length);
        let mut cumulative = Vec::with_capacity(num_symbols);
        let mut lookup = vec![0u32; precision as usize];
        let mut total = 0u32;
        for (symbol, &probability) in probabilities.iter().enumerate() {
            cumulative.push(total);
            let end = total
                .checked_add(probability)
                .filter(|&end| end <= precision)
                .ok_or(DracoError::Malformed("symbol probabilities exceed precision"))?;
            lookup[total as usize..end as usize].fill(symbol as u32);
            total = end;
        }
        if num_symbols > 0 && total != precision {
            return Err(DracoError::Malformed("symbol probabilities do not sum to precision"));
        }

        Ok(Self {
            precision,
            probabilities,
            cumulative,
            lookup,
            data: &[],
            offset: 0,
            state: 0,
        })
    }

    fn num_symbols(&self) -> usize {
        self.probabilities.len()
    }

    fn start(&mut self, buffer: &mut DecoderBuffer<'a>) -> DracoResult<()> {
        let len = buffer.varint()?;
        let len = usize::try_from(len).map_err(|_| DracoError::Truncated)?;
        let data = buffer.bytes(len)?;
        if data.is_empty() {
            return Err(DracoError::Malformed("empty rANS payload"));
        }

        let last = data[len - 1];
        let (header_len, state) = match last >> 6 {
            0 => (1, u32::from(last & 0x3f)),
            1 if len >= 2 => (2, u32::from(u16::from_le_bytes([data[len - 2], last])) & 0x3fff),
            2 if len >= 3 => (3, u32::from_le_bytes([data[len - 3], data[len - 2], last, 0]) & 0x3f_ffff),
            3 if len >= 4 => (
                4,
                u32::from_le_bytes([data[len - 4], data[len - 3], data[len - 2], last]) & 0x3fff_ffff,
            ),
            _ => return Err(DracoError::Truncated),
        };

        let base = self.precision * 4;
        self.state = state + base;
        if u64::from(self.state) >= u64::from(base) * u64::from(IO_BASE) {
            return Err(DracoError::Malformed("rANS state out of range"));
        }
        self.data = data;
        self.offset = len - header_len;
        Ok(())
    }

    fn symbol(&mut self) -> u32 {
        let base = self.precision * 4;
        while self.state < base && self.offset > 0 {
            self.offset -= 1;
            self.state = self.state * IO_BASE + u32::from(self.data[self.offset]);
        }
        let quotient = self.state / self.precision;
        let remainder = self.state % self.precision;
        let symbol = self.lookup[remainder as usize];
        let index = symbol as usize;
        self.state = quotient * self.probabilities[index] + remainder - self.cumulative[index];
        symbol
    }
}

/// Entropy-coded unsigned values, raw or tagged with a per-entry bit length.
pub(crate) fn decode_symbols(
    buffer: &mut DecoderBuffer<'_>,
    num_values: usize,
    num_components: usize,
) -> DracoResult<Vec<u32>> {
    if num_values == 0 {
        return Ok(Vec::new());
    }
    match buffer.u8()? {
        TAGGED => decode_tagged(buffer, num_values, num_components.max(1)),
        RAW => decode_raw(buffer, num_values),
        _ => Err(DracoError::Malformed("unknown symbol coding")),
    }
}

fn decode_raw(buffer: &mut DecoderBuffer<'_>, num_values: usize) -> DracoResult<Vec<u32>> {
    let bit_length = buffer.u8()?;
    if bit_length == 0 || bit_length > MAX_RAW_BIT_LENGTH {
        return Err(DracoError::Malformed("raw symbol bit length out of range"));
    }
    let mut decoder = RansSymbolDecoder::create(buffer, u32::from(bit_length))?;
    if decoder.num_symbols() == 0 {
        return Err(DracoError::Malformed("empty symbol alphabet"));
    }
    decoder.start(buffer)?;
    Ok((0..num_values).map(|_| decoder.symbol()).collect())
}

fn decode_tagged(buffer: &mut DecoderBuffer<'_>, num_values: usize, num_components: usize) -> DracoResult<Vec<u32>> {
    let mut tags = RansSymbolDecoder::create(buffer, TAG_BIT_LENGTH)?;
    tags.start(buffer)?;
    if tags.num_symbols() == 0 {
        return Err(DracoError::Malformed("empty tag alphabet"));
    }

    let mut values = Vec::with_capacity(num_values);
    let mut bits = buffer.bit_reader();
    while values.len() < num_values {
        let bit_length = tags.symbol();
        for _ in 0..num_components {
            values.push(bits.bits(bit_length)?);
        }
    }
    buffer.finish_bits(bits);
    values.truncate(num_values);
    Ok(values)
}

/// Undoes the zig-zag folding applied to signed values before entropy coding.
pub(crate) fn to_signed(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}
