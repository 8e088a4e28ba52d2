//! Varint and length-prefixed buffer framing
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::error::{SkiError, SkiResult};

/// Largest buffer length a length prefix may declare (31 bits)
pub const MAX_VAR_BUF_LEN: u64 = (1 << 31) - 1;

fn unexpected_eof() -> SkiError {
    SkiError::DecodeFailed("unexpected EOF".to_string())
}

fn int_overflow() -> SkiError {
    SkiError::DecodeFailed("varint overflow".to_string())
}

/// Append `v` in base-128 varint form
pub fn write_varint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8 & 0x7F) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

/// Append `varint(data.len()) || data`
pub fn append_var_buf(buf: &mut Vec<u8>, data: &[u8]) -> SkiResult<()> {
    let len = data.len() as u64;
    if len > MAX_VAR_BUF_LEN {
        return Err(SkiError::PayloadTooLarge {
            size: len,
            max: MAX_VAR_BUF_LEN,
        });
    }
    write_varint(buf, len);
    buf.extend_from_slice(data);
    Ok(())
}

/// Read a varint at `offset`, returning the value and the offset past it
pub fn read_varint(data: &[u8], offset: usize) -> SkiResult<(u64, usize)> {
    let mut value = 0u64;
    let mut offset = offset;
    let mut shift = 0u32;

    loop {
        if shift >= 64 {
            return Err(int_overflow());
        }
        let b = *data.get(offset).ok_or_else(unexpected_eof)?;
        offset += 1;
        value |= u64::from(b & 0x7F) << shift;
        if b < 0x80 {
            return Ok((value, offset));
        }
        shift += 7;
    }
}

/// Read a buffer written by [`append_var_buf`], returning it and the offset past it
pub fn read_var_buf(data: &[u8], offset: usize) -> SkiResult<(&[u8], usize)> {
    let mut len = 0u64;
    let mut offset = offset;
    let mut shift = 0u32;

    loop {
        if shift >= 31 {
            return Err(int_overflow());
        }
        let b = *data.get(offset).ok_or_else(unexpected_eof)?;
        offset += 1;
        len |= u64::from(b & 0x7F) << shift;
        if b < 0x80 {
            break;
        }
        shift += 7;
    }

    if len > MAX_VAR_BUF_LEN {
        return Err(int_overflow());
    }

    let end = offset
        .checked_add(len as usize)
        .filter(|end| *end <= data.len())
        .ok_or_else(unexpected_eof)?;

    Ok((&data[offset..end], end))
}

/// Read a varint that must fit in a `u32`
pub(crate) fn read_u32(data: &[u8], offset: usize) -> SkiResult<(u32, usize)> {
    let (value, offset) = read_varint(data, offset)?;
    let value = u32::try_from(value).map_err(|_| int_overflow())?;
    Ok((value, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_boundaries() {
        for v in [0u64, 1, 127, 128, 300, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, v);
            let (decoded, end) = read_varint(&buf, 0).unwrap();
            assert_eq!(decoded, v);
            assert_eq!(end, buf.len());
        }

        let mut buf = Vec::new();
        write_varint(&mut buf, 300);
        assert_eq!(buf, vec![0xAC, 0x02]);
    }

    #[test]
    fn test_var_buf_sequence() {
        let mut buf = Vec::new();
        append_var_buf(&mut buf, b"first").unwrap();
        append_var_buf(&mut buf, b"").unwrap();
        append_var_buf(&mut buf, &[7u8; 200]).unwrap();

        let (first, offset) = read_var_buf(&buf, 0).unwrap();
        let (empty, offset) = read_var_buf(&buf, offset).unwrap();
        let (big, offset) = read_var_buf(&buf, offset).unwrap();
        assert_eq!(first, b"first");
        assert!(empty.is_empty());
        assert_eq!(big, &[7u8; 200][..]);
        assert_eq!(offset, buf.len());
    }

    #[test]
    fn test_var_buf_overrun_is_eof() {
        let mut buf = Vec::new();
        append_var_buf(&mut buf, b"truncated payload").unwrap();
        buf.truncate(buf.len() - 3);
        let err = read_var_buf(&buf, 0).unwrap_err();
        assert!(matches!(err, SkiError::DecodeFailed(ref m) if m.contains("EOF")));

        assert!(read_var_buf(&[], 0).is_err());
        assert!(read_var_buf(&[0x80], 0).is_err());
    }

    #[test]
    fn test_var_buf_length_over_31_bits() {
        // Five continuation bytes push the shift past 31 bits
        let buf = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let err = read_var_buf(&buf, 0).unwrap_err();
        assert!(matches!(err, SkiError::DecodeFailed(ref m) if m.contains("overflow")));

        // Declares 2^31 bytes in five bytes
        let mut buf = Vec::new();
        write_varint(&mut buf, 1 << 31);
        let err = read_var_buf(&buf, 0).unwrap_err();
        assert!(matches!(err, SkiError::DecodeFailed(ref m) if m.contains("overflow")));
    }

    #[test]
    fn test_varint_too_long() {
        let buf = [0xFFu8; 11];
        assert!(read_varint(&buf, 0).is_err());
    }

    #[test]
    fn test_read_u32_rejects_wide_values() {
        let mut buf = Vec::new();
        write_varint(&mut buf, u64::from(u32::MAX) + 1);
        assert!(read_u32(&buf, 0).is_err());
    }
}
