//! Thrift binary-protocol reader and writer
//!
//! Collector payloads arrive as Thrift structs serialised with the binary
//! protocol. The subset needed here is small and closed (strings, i64 and
//! lists of strings, big-endian, field-id framing), so it is implemented
//! directly rather than pulling in a full Thrift runtime.
//!
//! Unknown fields are skipped so newer collectors remain decodable.

use crate::error::ProtocolError;

#[cfg(test)]
#[path = "thrift_test.rs"]
mod tests;

/// Wire types of the Thrift binary protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TType {
    Stop = 0,
    Bool = 2,
    Byte = 3,
    Double = 4,
    I16 = 6,
    I32 = 8,
    I64 = 10,
    String = 11,
    Struct = 12,
    Map = 13,
    Set = 14,
    List = 15,
}

impl TType {
    fn from_wire(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0 => Ok(Self::Stop),
            2 => Ok(Self::Bool),
            3 => Ok(Self::Byte),
            4 => Ok(Self::Double),
            6 => Ok(Self::I16),
            8 => Ok(Self::I32),
            10 => Ok(Self::I64),
            11 => Ok(Self::String),
            12 => Ok(Self::Struct),
            13 => Ok(Self::Map),
            14 => Ok(Self::Set),
            15 => Ok(Self::List),
            other => Err(ProtocolError::UnknownWireType(other)),
        }
    }
}

/// Cursor-style reader over a Thrift binary-encoded buffer
pub struct ThriftReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ThriftReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset into the buffer
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let remaining = self.buf.len() - self.pos;
        if remaining < n {
            return Err(ProtocolError::truncated(self.pos, n - remaining));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        let b = self.take(8)?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        Ok(f64::from_bits(self.read_i64()? as u64))
    }

    /// Read a length-prefixed byte string
    pub fn read_bytes(&mut self) -> Result<&'a [u8], ProtocolError> {
        let pos = self.pos;
        let len = self.read_i32()?;
        if len < 0 || len as usize > self.buf.len() {
            return Err(ProtocolError::invalid_length(pos, len));
        }
        self.take(len as usize)
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self, field: &'static str) -> Result<String, ProtocolError> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8 { field })
    }

    /// Read the next field header
    ///
    /// Returns `None` on the struct's stop marker.
    pub fn read_field_header(&mut self) -> Result<Option<(TType, i16)>, ProtocolError> {
        let ttype = TType::from_wire(self.read_u8()?)?;
        if ttype == TType::Stop {
            return Ok(None);
        }
        let id = self.read_i16()?;
        Ok(Some((ttype, id)))
    }

    /// Read a list header, returning `(element type, count)`
    pub fn read_list_header(&mut self) -> Result<(TType, usize), ProtocolError> {
        let pos = self.pos;
        let elem = TType::from_wire(self.read_u8()?)?;
        let count = self.read_i32()?;
        if count < 0 {
            return Err(ProtocolError::invalid_length(pos, count));
        }
        Ok((elem, count as usize))
    }

    /// Skip a value of the given type
    ///
    /// Used for fields this decoder does not recognise.
    pub fn skip(&mut self, ttype: TType) -> Result<(), ProtocolError> {
        match ttype {
            TType::Stop => Ok(()),
            TType::Bool | TType::Byte => self.take(1).map(|_| ()),
            TType::I16 => self.take(2).map(|_| ()),
            TType::I32 => self.take(4).map(|_| ()),
            TType::I64 | TType::Double => self.take(8).map(|_| ()),
            TType::String => self.read_bytes().map(|_| ()),
            TType::Struct => {
                while let Some((ftype, _)) = self.read_field_header()? {
                    self.skip(ftype)?;
                }
                Ok(())
            }
            TType::List | TType::Set => {
                let (elem, count) = self.read_list_header()?;
                for _ in 0..count {
                    self.skip(elem)?;
                }
                Ok(())
            }
            TType::Map => {
                let pos = self.pos;
                let ktype = TType::from_wire(self.read_u8()?)?;
                let vtype = TType::from_wire(self.read_u8()?)?;
                let count = self.read_i32()?;
                if count < 0 {
                    return Err(ProtocolError::invalid_length(pos, count));
                }
                for _ in 0..count {
                    self.skip(ktype)?;
                    self.skip(vtype)?;
                }
                Ok(())
            }
        }
    }
}

/// Thrift binary-protocol writer
///
/// The encode side of the payload round trip. Field values are written in
/// ascending field-id order by convention, matching what collectors emit.
#[derive(Default)]
pub struct ThriftWriter {
    buf: Vec<u8>,
}

impl ThriftWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_string_field(&mut self, id: i16, value: &str) {
        self.field_header(TType::String, id);
        self.write_len_prefixed(value.as_bytes());
    }

    pub fn write_i64_field(&mut self, id: i16, value: i64) {
        self.field_header(TType::I64, id);
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_string_list_field(&mut self, id: i16, values: &[String]) {
        self.field_header(TType::List, id);
        self.buf.push(TType::String as u8);
        self.buf.extend_from_slice(&(values.len() as i32).to_be_bytes());
        for v in values {
            self.write_len_prefixed(v.as_bytes());
        }
    }

    /// Terminate the struct and return the encoded bytes
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(TType::Stop as u8);
        self.buf
    }

    fn field_header(&mut self, ttype: TType, id: i16) {
        self.buf.push(ttype as u8);
        self.buf.extend_from_slice(&id.to_be_bytes());
    }

    fn write_len_prefixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
        self.buf.extend_from_slice(bytes);
    }
}
