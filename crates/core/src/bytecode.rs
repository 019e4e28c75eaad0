//! Positioned read/write over a growable byte buffer, and the bytecode
//! container layout from spec §3/§6.
//!
//! Mirrors the teacher's `seq-core::son` serialization module in spirit
//! (a small, dependency-free binary codec alongside the value model) but
//! implements the exact little-endian, length-prefixed layout the spec
//! pins down rather than a free-form notation.

use crate::error::JinxError;
use crate::value::{Guid, Value, ValueType};

pub const BYTECODE_SIGNATURE: u32 = u32::from_le_bytes(*b"JINX");
pub const DEBUG_SIGNATURE: u32 = u32::from_le_bytes(*b"JDBG");
pub const BYTECODE_VERSION: u32 = 1;

/// Appends primitives to a growable buffer, little-endian throughout.
#[derive(Default)]
pub struct ByteCodeWriter {
    buf: Vec<u8>,
}

impl ByteCodeWriter {
    pub fn new() -> Self {
        ByteCodeWriter { buf: Vec::new() }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed (u32), NUL-terminated UTF-8 string. The NUL is
    /// written but not counted in the length prefix, per spec §6.
    pub fn write_string(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    /// Number of bytes `write_string(s)` would append: the u32 length
    /// prefix, `s`'s own bytes, and the trailing NUL.
    pub fn encoded_string_len(s: &str) -> usize {
        4 + s.len() + 1
    }

    pub fn write_buffer(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_guid(&mut self, g: Guid) {
        self.buf.extend_from_slice(&g.to_bytes());
    }

    /// Back-patch a previously written u32 (used for jump targets).
    pub fn patch_u32(&mut self, at: usize, v: u32) {
        self.buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Discard everything written after `len`. Used by the parser's
    /// function-call matcher to roll back a trial emission of a candidate
    /// signature that turned out not to match.
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    /// Serialize a `Value` for embedding as a `PushVal` immediate.
    pub fn write_value(&mut self, v: &Value) -> Result<(), JinxError> {
        self.write_u8(v.type_of() as u8);
        match v {
            Value::Null => {}
            Value::Integer(i) => self.write_i64(*i),
            Value::Number(n) => self.write_f64(*n),
            Value::Boolean(b) => self.write_u8(*b as u8),
            Value::String(s) => self.write_string(s),
            Value::Guid(g) => self.write_guid(*g),
            Value::Function(id) => self.write_u64(*id),
            Value::ValueType(t) => self.write_u8(*t as u8),
            other => {
                return Err(JinxError::format(format!(
                    "value of type {} is not serializable as a bytecode literal",
                    other.type_of()
                )));
            }
        }
        Ok(())
    }
}

/// Reads primitives from a byte slice, tracking a cursor position.
pub struct ByteCodeReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCodeReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteCodeReader { buf, pos: 0 }
    }

    pub fn with_pos(buf: &'a [u8], pos: usize) -> Self {
        ByteCodeReader { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn need(&self, n: usize) -> Result<(), JinxError> {
        if self.pos + n > self.buf.len() {
            Err(JinxError::format("unexpected end of bytecode buffer"))
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, JinxError> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16, JinxError> {
        self.need(2)?;
        let v = u16::from_le_bytes(self.buf[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32, JinxError> {
        self.need(4)?;
        let v = u32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64, JinxError> {
        self.need(8)?;
        let v = u64::from_le_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32, JinxError> {
        self.need(4)?;
        let v = i32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    pub fn read_i64(&mut self) -> Result<i64, JinxError> {
        self.need(8)?;
        let v = i64::from_le_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    pub fn read_f64(&mut self) -> Result<f64, JinxError> {
        self.need(8)?;
        let v = f64::from_le_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    pub fn read_string(&mut self) -> Result<String, JinxError> {
        let len = self.read_u32()? as usize;
        self.need(len + 1)?;
        let bytes = &self.buf[self.pos..self.pos + len];
        let s = std::str::from_utf8(bytes)
            .map_err(|e| JinxError::format(format!("invalid UTF-8 string in bytecode: {e}")))?
            .to_string();
        self.pos += len + 1; // skip trailing NUL
        Ok(s)
    }

    pub fn read_buffer(&mut self) -> Result<Vec<u8>, JinxError> {
        let len = self.read_u32()? as usize;
        self.need(len)?;
        let bytes = self.buf[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_guid(&mut self) -> Result<Guid, JinxError> {
        self.need(16)?;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + 16]);
        self.pos += 16;
        Ok(Guid::from_bytes(bytes))
    }

    pub fn read_value(&mut self) -> Result<Value, JinxError> {
        let tag = self.read_u8()?;
        let ty = ValueType::from_u8(tag)
            .ok_or_else(|| JinxError::format(format!("unknown value tag {tag}")))?;
        Ok(match ty {
            ValueType::Null => Value::Null,
            ValueType::Integer => Value::Integer(self.read_i64()?),
            ValueType::Number => Value::Number(self.read_f64()?),
            ValueType::Boolean => Value::Boolean(self.read_u8()? != 0),
            ValueType::String => Value::String(self.read_string()?),
            ValueType::Guid => Value::Guid(self.read_guid()?),
            ValueType::Function => Value::Function(self.read_u64()?),
            ValueType::ValueType => {
                let inner = self.read_u8()?;
                Value::ValueType(
                    ValueType::from_u8(inner)
                        .ok_or_else(|| JinxError::format("unknown value-type tag"))?,
                )
            }
            other => {
                return Err(JinxError::format(format!(
                    "value of type {other} is not deserializable from bytecode"
                )));
            }
        })
    }
}

/// Parsed view of the fixed bytecode header plus the script-name field
/// (spec §3 items 1–2): `HEADER_LEN` covers only the three fixed-width
/// fields (signature/version/dataSize) — the name that follows is variable
/// length, so `Header::read` consumes it too and leaves the reader
/// positioned at the start of the instruction stream (item 3).
#[derive(Debug, Clone)]
pub struct Header {
    pub signature: u32,
    pub version: u32,
    /// Bytes after the fixed header fields up to end-of-instructions
    /// (i.e. covering the script-name field and the instruction stream),
    /// excluding the optional debug section.
    pub data_size: u32,
    pub name: String,
}

pub const HEADER_LEN: usize = 4 + 4 + 4;

impl Header {
    pub fn read(reader: &mut ByteCodeReader) -> Result<Self, JinxError> {
        let signature = reader.read_u32()?;
        if signature != BYTECODE_SIGNATURE {
            return Err(JinxError::format("bad bytecode signature"));
        }
        let version = reader.read_u32()?;
        if version != BYTECODE_VERSION {
            return Err(JinxError::format(format!(
                "unsupported bytecode version {version}"
            )));
        }
        let data_size = reader.read_u32()?;
        let name = reader.read_string()?;
        Ok(Header {
            signature,
            version,
            data_size,
            name,
        })
    }

    /// `data_size` must already cover the encoded `name` plus the
    /// instruction stream that follows it (`encoded_string_len(name) +
    /// instructions.len()`) — the caller computes this before the
    /// instruction buffer is known to `write`, since it's a header field.
    pub fn write(writer: &mut ByteCodeWriter, data_size: u32, name: &str) {
        writer.write_u32(BYTECODE_SIGNATURE);
        writer.write_u32(BYTECODE_VERSION);
        writer.write_u32(data_size);
        writer.write_string(name);
    }
}

/// One `(opcode position, source line)` row of the optional `JDBG` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub opcode_position: u32,
    pub line_number: u32,
}

/// `strip_debug_info`: if there's no trailing debug section, return the
/// input unchanged; otherwise return a new buffer truncated to
/// `header + dataSize` bytes. (Resolves the reference's dead no-op branch,
/// see spec §9 Open Questions.)
pub fn strip_debug_info(bytecode: &[u8]) -> Result<Vec<u8>, JinxError> {
    let mut reader = ByteCodeReader::new(bytecode);
    let header = Header::read(&mut reader)?;
    let truncated_len = HEADER_LEN + header.data_size as usize;
    if truncated_len >= bytecode.len() {
        return Ok(bytecode.to_vec());
    }
    Ok(bytecode[..truncated_len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: &Value) -> Value {
        let mut w = ByteCodeWriter::new();
        w.write_value(v).unwrap();
        let bytes = w.into_bytes();
        let mut r = ByteCodeReader::new(&bytes);
        r.read_value().unwrap()
    }

    #[test]
    fn integer_roundtrip() {
        assert!(matches!(roundtrip(&Value::Integer(-42)), Value::Integer(-42)));
    }

    #[test]
    fn string_roundtrip() {
        assert!(matches!(roundtrip(&Value::String("hi".into())), Value::String(s) if s == "hi"));
    }

    #[test]
    fn guid_roundtrip() {
        let g = Guid::new(1, 2, 3, [4, 5, 6, 7, 8, 9, 10, 11]);
        assert!(matches!(roundtrip(&Value::Guid(g)), Value::Guid(g2) if g2 == g));
    }

    #[test]
    fn boolean_roundtrip() {
        assert!(matches!(roundtrip(&Value::Boolean(true)), Value::Boolean(true)));
        assert!(matches!(roundtrip(&Value::Boolean(false)), Value::Boolean(false)));
    }

    #[test]
    fn strip_debug_noop_without_section() {
        let mut w = ByteCodeWriter::new();
        let name_len = ByteCodeWriter::encoded_string_len("t") as u32;
        Header::write(&mut w, name_len, "t");
        let buf = w.into_bytes();
        let stripped = strip_debug_info(&buf).unwrap();
        assert_eq!(stripped, buf);
    }

    #[test]
    fn strip_debug_truncates_section() {
        let mut w = ByteCodeWriter::new();
        let header_pos = w.position();
        Header::write(&mut w, 0, "t");
        let data_start = w.position();
        w.write_u8(0xAB); // pretend instruction byte
        let data_size = (w.position() - data_start) as u32;
        w.patch_u32(header_pos + 8, data_size);
        w.write_u32(DEBUG_SIGNATURE);
        w.write_u32(0);
        w.write_u32(0);
        let buf = w.into_bytes();
        let stripped = strip_debug_info(&buf).unwrap();
        assert_eq!(stripped.len(), HEADER_LEN + data_size as usize);
    }

    #[test]
    fn header_round_trips_script_name() {
        let mut w = ByteCodeWriter::new();
        Header::write(&mut w, ByteCodeWriter::encoded_string_len("my-script") as u32, "my-script");
        let buf = w.into_bytes();
        let mut r = ByteCodeReader::new(&buf);
        let header = Header::read(&mut r).unwrap();
        assert_eq!(header.name, "my-script");
        assert_eq!(r.position(), buf.len());
    }
}
