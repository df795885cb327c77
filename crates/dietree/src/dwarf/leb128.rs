//! LEB128 (Little Endian Base 128) encoding/decoding.
//!
//! DWARF uses LEB128 for variable-length integers. This encoding uses
//! 7 bits per byte, with the high bit indicating continuation.

use crate::ParseError;

/// Decode an unsigned LEB128 value from bytes.
/// Returns the value and the number of bytes consumed.
pub fn decode_uleb128(data: &[u8]) -> Result<(u64, usize), ParseError> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    let mut index = 0;

    loop {
        if index >= data.len() {
            return Err(ParseError::TruncatedData {
                expected: index + 1,
                actual: data.len(),
                context: "ULEB128 value",
            });
        }

        let byte = data[index];
        index += 1;

        let low_bits = (byte & 0x7F) as u64;

        // Digits past bit 63 must be zero
        if shift >= 64 {
            if low_bits != 0 {
                return Err(ParseError::Overflow {
                    context: "ULEB128 value",
                });
            }
        } else {
            if shift == 63 && low_bits > 1 {
                return Err(ParseError::Overflow {
                    context: "ULEB128 value",
                });
            }
            result |= low_bits << shift;
        }
        shift += 7;

        // High bit clear means this is the last byte
        if byte & 0x80 == 0 {
            break;
        }
    }

    Ok((result, index))
}

/// Decode a signed LEB128 value from bytes.
/// Returns the value and the number of bytes consumed.
pub fn decode_sleb128(data: &[u8]) -> Result<(i64, usize), ParseError> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    let mut index = 0;
    let mut last_byte;

    loop {
        if index >= data.len() {
            return Err(ParseError::TruncatedData {
                expected: index + 1,
                actual: data.len(),
                context: "SLEB128 value",
            });
        }

        let byte = data[index];
        last_byte = byte;
        index += 1;

        let low_bits = (byte & 0x7F) as i64;
        if shift < 64 {
            result |= low_bits << shift;
        }
        shift += 7;

        if byte & 0x80 == 0 {
            break;
        }

        if shift >= 70 {
            return Err(ParseError::Overflow {
                context: "SLEB128 value",
            });
        }
    }

    // Sign extend if the sign bit (bit 6 of last byte) is set
    if shift < 64 && (last_byte & 0x40) != 0 {
        result |= !0i64 << shift;
    }

    Ok((result, index))
}

/// Encode an unsigned value as LEB128.
pub fn encode_uleb128(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Encode a signed value as LEB128.
pub fn encode_sleb128(mut value: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}
