//! Transport framings.
//!
//! A framing turns encrypted frames into bytes for a stream socket and finds
//! frame boundaries in the bytes read back.  It does no I/O: [`Framing::pack`]
//! appends to an output buffer and [`Framing::unpack`] reports where the next
//! complete packet sits inside an input buffer, or `None` if more bytes are
//! needed.
//!
//! Three framings are provided:
//!
//! * [`Abridged`]: `0xef` init byte, then `[len/4 as 1 or 4 bytes][payload]`.
//! * [`Intermediate`]: `0xeeeeeeee` init, then `[4-byte LE length][payload]`.
//! * [`Full`]: no init; `[len][seq][payload][crc32]` with a running
//!   sequence number and a CRC-32 over everything before it.

use std::fmt;

/// Framing-level errors.
#[derive(Clone, Debug, PartialEq)]
pub enum FramingError {
    /// The declared length is impossible for this framing.
    BadLength {
        /// The length read from the header.
        len: u32,
    },
    /// The CRC-32 trailer does not match the packet.
    BadCrc {
        /// Checksum computed over the received packet.
        expected: u32,
        /// Checksum carried in the trailer.
        got: u32,
    },
    /// The packet's sequence number is not the next one.
    BadSeq {
        /// Sequence number the reader expected.
        expected: u32,
        /// Sequence number carried in the packet.
        got: u32,
    },
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength { len } => write!(f, "bad packet length {len}"),
            Self::BadCrc { expected, got } => {
                write!(f, "CRC mismatch (computed {expected:#010x}, trailer {got:#010x})")
            }
            Self::BadSeq { expected, got } => write!(f, "bad sequence number {got} (expected {expected})"),
        }
    }
}

impl std::error::Error for FramingError {}

/// Location of one complete packet inside an input buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnpackedOffset {
    /// First byte of the payload.
    pub data_start: usize,
    /// One past the last byte of the payload.
    pub data_end: usize,
    /// Where the next packet starts.
    pub next_offset: usize,
}

/// A stream framing.
pub trait Framing: Send {
    /// Bytes to write once, right after the socket connects.
    fn init(&self) -> &'static [u8];

    /// Append the framed `payload` to `out`.
    fn pack(&mut self, payload: &[u8], out: &mut Vec<u8>);

    /// Find the first complete packet in `input`.
    ///
    /// Returns `Ok(None)` when `input` does not yet hold a whole packet.
    fn unpack(&mut self, input: &[u8]) -> Result<Option<UnpackedOffset>, FramingError>;

    /// Forget per-connection state (sequence counters).
    fn reset(&mut self);
}

// ─── Abridged ────────────────────────────────────────────────────────────────

/// [MTProto Abridged] framing.
///
/// [MTProto Abridged]: https://core.telegram.org/mtproto/mtproto-transports#abridged
#[derive(Clone, Debug, Default)]
pub struct Abridged;

impl Framing for Abridged {
    fn init(&self) -> &'static [u8] {
        &[0xef]
    }

    fn pack(&mut self, payload: &[u8], out: &mut Vec<u8>) {
        let words = payload.len() / 4;
        if words < 0x7f {
            out.push(words as u8);
        } else {
            out.extend_from_slice(&[
                0x7f,
                (words & 0xff) as u8,
                ((words >> 8) & 0xff) as u8,
                ((words >> 16) & 0xff) as u8,
            ]);
        }
        out.extend_from_slice(payload);
    }

    fn unpack(&mut self, input: &[u8]) -> Result<Option<UnpackedOffset>, FramingError> {
        let Some(&first) = input.first() else { return Ok(None) };
        let (header, words) = if first < 0x7f {
            (1, first as usize)
        } else {
            if input.len() < 4 {
                return Ok(None);
            }
            (4, input[1] as usize | (input[2] as usize) << 8 | (input[3] as usize) << 16)
        };
        let end = header + words * 4;
        if input.len() < end {
            return Ok(None);
        }
        Ok(Some(UnpackedOffset { data_start: header, data_end: end, next_offset: end }))
    }

    fn reset(&mut self) {}
}

// ─── Intermediate ────────────────────────────────────────────────────────────

/// [MTProto Intermediate] framing.
///
/// [MTProto Intermediate]: https://core.telegram.org/mtproto/mtproto-transports#intermediate
#[derive(Clone, Debug, Default)]
pub struct Intermediate;

impl Framing for Intermediate {
    fn init(&self) -> &'static [u8] {
        &[0xee, 0xee, 0xee, 0xee]
    }

    fn pack(&mut self, payload: &[u8], out: &mut Vec<u8>) {
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
    }

    fn unpack(&mut self, input: &[u8]) -> Result<Option<UnpackedOffset>, FramingError> {
        if input.len() < 4 {
            return Ok(None);
        }
        let len = read_u32(input, 0);
        if len < 4 {
            return Err(FramingError::BadLength { len });
        }
        let end = 4 + len as usize;
        if input.len() < end {
            return Ok(None);
        }
        Ok(Some(UnpackedOffset { data_start: 4, data_end: end, next_offset: end }))
    }

    fn reset(&mut self) {}
}

// ─── Full ────────────────────────────────────────────────────────────────────

/// [MTProto Full] framing.
///
/// [MTProto Full]: https://core.telegram.org/mtproto/mtproto-transports#full
#[derive(Clone, Debug, Default)]
pub struct Full {
    send_seq: u32,
    recv_seq: u32,
}

impl Full {
    /// `len || seq` in front, `crc32` behind.
    const OVERHEAD: usize = 12;
}

impl Framing for Full {
    fn init(&self) -> &'static [u8] {
        &[]
    }

    fn pack(&mut self, payload: &[u8], out: &mut Vec<u8>) {
        let start = out.len();
        let total_len = (payload.len() + Self::OVERHEAD) as u32;
        out.extend_from_slice(&total_len.to_le_bytes());
        out.extend_from_slice(&self.send_seq.to_le_bytes());
        out.extend_from_slice(payload);
        let crc = crc32_ieee(&out[start..]);
        out.extend_from_slice(&crc.to_le_bytes());
        self.send_seq = self.send_seq.wrapping_add(1);
    }

    fn unpack(&mut self, input: &[u8]) -> Result<Option<UnpackedOffset>, FramingError> {
        if input.len() < 4 {
            return Ok(None);
        }
        let len = read_u32(input, 0);
        if (len as usize) < Self::OVERHEAD {
            return Err(FramingError::BadLength { len });
        }
        let end = len as usize;
        if input.len() < end {
            return Ok(None);
        }

        let got = read_u32(input, end - 4);
        let expected = crc32_ieee(&input[..end - 4]);
        if got != expected {
            return Err(FramingError::BadCrc { expected, got });
        }
        let seq = read_u32(input, 4);
        if seq != self.recv_seq {
            return Err(FramingError::BadSeq { expected: self.recv_seq, got: seq });
        }
        self.recv_seq = self.recv_seq.wrapping_add(1);
        Ok(Some(UnpackedOffset { data_start: 8, data_end: end - 4, next_offset: end }))
    }

    fn reset(&mut self) {
        self.send_seq = 0;
        self.recv_seq = 0;
    }
}

fn read_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

// ─── CRC-32 (IEEE 802.3 polynomial) ──────────────────────────────────────────

/// Compute CRC-32 using the standard IEEE 802.3 polynomial.
pub fn crc32_ieee(data: &[u8]) -> u32 {
    const POLY: u32 = 0xedb88320;
    let mut crc: u32 = 0xffffffff;
    for &byte in data {
        let mut b = byte as u32;
        for _ in 0..8 {
            let mix = (crc ^ b) & 1;
            crc >>= 1;
            if mix != 0 { crc ^= POLY; }
            b >>= 1;
        }
    }
    crc ^ 0xffffffff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_check_value() {
        assert_eq!(crc32_ieee(b"123456789"), 0xcbf43926);
    }
}
