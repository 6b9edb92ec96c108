//! A small, purpose-built RLP codec for the WBFT extra-data record
//! (spec §6). Scoped to exactly the shapes that record needs — lists,
//! byte strings, and fixed-width unsigned integers — rather than a
//! general-purpose RLP library.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RlpError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("expected a list")]
    ExpectedList,
    #[error("expected a byte string")]
    ExpectedString,
    #[error("length prefix overflow")]
    LengthOverflow,
    #[error("trailing bytes after decoding item")]
    TrailingBytes,
}

pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        return vec![data[0]];
    }
    let mut out = Vec::with_capacity(data.len() + 9);
    encode_len(&mut out, data.len(), 0x80);
    out.extend_from_slice(data);
    out
}

pub fn encode_u128(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    encode_bytes(&bytes[first_nonzero..])
}

pub fn encode_u32(value: u32) -> Vec<u8> {
    encode_u128(value as u128)
}

pub fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = items.iter().map(|i| i.len()).sum();
    let mut out = Vec::with_capacity(payload_len + 9);
    encode_len(&mut out, payload_len, 0xc0);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn encode_len(out: &mut Vec<u8>, len: usize, offset: u8) {
    if len <= 55 {
        out.push(offset + len as u8);
    } else {
        let len_bytes = minimal_be_bytes(len as u128);
        out.push(offset + 55 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
}

fn minimal_be_bytes(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    bytes[first_nonzero..].to_vec()
}

/// A cursor over an RLP-encoded byte slice, one item at a time.
pub struct Decoder<'a> {
    buf: &'a [u8],
}

enum Kind {
    String,
    List,
}

struct ItemHeader {
    kind: Kind,
    payload_offset: usize,
    payload_len: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn peek_header(&self) -> Result<ItemHeader, RlpError> {
        let first = *self.buf.first().ok_or(RlpError::UnexpectedEof)?;
        match first {
            0x00..=0x7f => Ok(ItemHeader { kind: Kind::String, payload_offset: 0, payload_len: 1 }),
            0x80..=0xb7 => {
                let len = (first - 0x80) as usize;
                Ok(ItemHeader { kind: Kind::String, payload_offset: 1, payload_len: len })
            }
            0xb8..=0xbf => {
                let len_of_len = (first - 0xb7) as usize;
                let len = read_be_len(self.buf, 1, len_of_len)?;
                Ok(ItemHeader { kind: Kind::String, payload_offset: 1 + len_of_len, payload_len: len })
            }
            0xc0..=0xf7 => {
                let len = (first - 0xc0) as usize;
                Ok(ItemHeader { kind: Kind::List, payload_offset: 1, payload_len: len })
            }
            0xf8..=0xff => {
                let len_of_len = (first - 0xf7) as usize;
                let len = read_be_len(self.buf, 1, len_of_len)?;
                Ok(ItemHeader { kind: Kind::List, payload_offset: 1 + len_of_len, payload_len: len })
            }
        }
    }

    /// Decodes the next item as a byte string and advances past it.
    pub fn decode_bytes(&mut self) -> Result<&'a [u8], RlpError> {
        let header = self.peek_header()?;
        let Kind::String = header.kind else { return Err(RlpError::ExpectedString) };

        if header.payload_offset == 0 {
            // Single byte in [0x00, 0x7f], self-encoding.
            let value = &self.buf[0..1];
            self.buf = &self.buf[1..];
            return Ok(value);
        }

        let start = header.payload_offset;
        let end = start
            .checked_add(header.payload_len)
            .ok_or(RlpError::LengthOverflow)?;
        let value = self.buf.get(start..end).ok_or(RlpError::UnexpectedEof)?;
        self.buf = &self.buf[end..];
        Ok(value)
    }

    /// Decodes the next item as a list, returning a sub-decoder scoped to
    /// its payload, and advances past the whole list.
    pub fn decode_list(&mut self) -> Result<Decoder<'a>, RlpError> {
        let header = self.peek_header()?;
        let Kind::List = header.kind else { return Err(RlpError::ExpectedList) };

        let start = header.payload_offset;
        let end = start
            .checked_add(header.payload_len)
            .ok_or(RlpError::LengthOverflow)?;
        let payload = self.buf.get(start..end).ok_or(RlpError::UnexpectedEof)?;
        self.buf = &self.buf[end..];
        Ok(Decoder::new(payload))
    }

    pub fn decode_u32(&mut self) -> Result<u32, RlpError> {
        Ok(self.decode_u128()? as u32)
    }

    pub fn decode_u128(&mut self) -> Result<u128, RlpError> {
        let bytes = self.decode_bytes()?;
        if bytes.len() > 16 {
            return Err(RlpError::LengthOverflow);
        }
        let mut buf = [0u8; 16];
        buf[16 - bytes.len()..].copy_from_slice(bytes);
        Ok(u128::from_be_bytes(buf))
    }

    pub fn decode_fixed<const N: usize>(&mut self) -> Result<[u8; N], RlpError> {
        let bytes = self.decode_bytes()?;
        bytes.try_into().map_err(|_| RlpError::LengthOverflow)
    }

    pub fn finish(self) -> Result<(), RlpError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(RlpError::TrailingBytes)
        }
    }
}

fn read_be_len(buf: &[u8], offset: usize, len_of_len: usize) -> Result<usize, RlpError> {
    let slice = buf
        .get(offset..offset + len_of_len)
        .ok_or(RlpError::UnexpectedEof)?;
    if len_of_len > 8 {
        return Err(RlpError::LengthOverflow);
    }
    let mut padded = [0u8; 8];
    padded[8 - len_of_len..].copy_from_slice(slice);
    Ok(u64::from_be_bytes(padded) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_bytes_short() {
        let data = b"hello";
        let enc = encode_bytes(data);
        let mut dec = Decoder::new(&enc);
        assert_eq!(dec.decode_bytes().unwrap(), data);
    }

    #[test]
    fn roundtrip_bytes_long() {
        let data = vec![0xABu8; 100];
        let enc = encode_bytes(&data);
        let mut dec = Decoder::new(&enc);
        assert_eq!(dec.decode_bytes().unwrap(), &data[..]);
    }

    #[test]
    fn roundtrip_list() {
        let items = vec![encode_bytes(b"a"), encode_bytes(b"bb"), encode_u32(42)];
        let enc = encode_list(&items);
        let mut dec = Decoder::new(&enc);
        let mut inner = dec.decode_list().unwrap();
        assert_eq!(inner.decode_bytes().unwrap(), b"a");
        assert_eq!(inner.decode_bytes().unwrap(), b"bb");
        assert_eq!(inner.decode_u32().unwrap(), 42);
        inner.finish().unwrap();
    }

    #[test]
    fn single_byte_self_encodes() {
        let enc = encode_bytes(&[0x05]);
        assert_eq!(enc, vec![0x05]);
    }
}
