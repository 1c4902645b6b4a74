use super::values::TypedValue;
use super::{BinaryXmlError, BinaryXmlResult};

/// Growable little-endian buffer for re-encoding chunks.
///
/// Chunk sizes are never written by hand: [`ChunkWriter::chunk`] measures
/// whatever its body emits and patches the size field afterwards.
#[derive(Debug, Default)]
pub(crate) struct ChunkWriter {
    buf: Vec<u8>,
}

impl ChunkWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub(crate) fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub(crate) fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub(crate) fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub(crate) fn pad_to_four(&mut self) -> &mut Self {
        let padding = (4 - self.buf.len() % 4) % 4;
        self.buf.resize(self.buf.len() + padding, 0);
        self
    }

    /// 8 byte `Res_value`: size, res0, type and data.
    pub(crate) fn typed_value(&mut self, value: &TypedValue) -> &mut Self {
        self.u16(8).u8(0).u8(value.value_type.code()).u32(value.data)
    }

    /// Writes a chunk header, runs `body`, pads to four bytes and fills in
    /// the chunk size.
    pub(crate) fn chunk<F>(&mut self, chunk_type: u16, header_size: u16, body: F) -> BinaryXmlResult<()>
    where
        F: FnOnce(&mut Self) -> BinaryXmlResult<()>,
    {
        let start = self.buf.len();
        self.u16(chunk_type).u16(header_size).u32(0);
        body(self)?;
        self.pad_to_four();
        let size = u32::try_from(self.buf.len() - start).map_err(|_| {
            BinaryXmlError::invalid(format!("Chunk [0x{chunk_type:04X}] exceeds 4 GiB"))
        })?;
        self.buf[start + 4..start + 8].copy_from_slice(&size.to_le_bytes());
        Ok(())
    }

    /// UTF-16 unit count and byte count (each 1 or 2 bytes), the bytes, then a NUL.
    pub(crate) fn utf8_string(&mut self, text: &str) -> BinaryXmlResult<()> {
        self.utf8_length(text.encode_utf16().count())?;
        self.utf8_length(text.len())?;
        self.bytes(text.as_bytes()).u8(0);
        Ok(())
    }

    fn utf8_length(&mut self, len: usize) -> BinaryXmlResult<()> {
        match len {
            0..=0x7F => {
                self.u8(len as u8);
            }
            0x80..=0x7FFF => {
                self.u8(0x80 | (len >> 8) as u8).u8(len as u8);
            }
            _ => {
                return Err(BinaryXmlError::invalid(format!(
                    "String of length {len} does not fit a UTF-8 string pool"
                )))
            }
        }
        Ok(())
    }

    /// Unit count (2 or 4 bytes), the UTF-16 units, then a NUL unit.
    pub(crate) fn utf16_string(&mut self, text: &str) -> &mut Self {
        let units: Vec<u16> = text.encode_utf16().collect();
        match u16::try_from(units.len()) {
            Ok(len) if len < 0x8000 => {
                self.u16(len);
            }
            _ => {
                let len = units.len();
                self.u16(0x8000 | ((len >> 16) & 0x7FFF) as u16).u16(len as u16);
            }
        }
        for unit in units {
            self.u16(unit);
        }
        self.u16(0)
    }
}
