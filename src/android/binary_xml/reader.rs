use super::{BinaryXmlError, BinaryXmlResult, RES_STRING_POOL_TYPE, XML_IDENTIFIER};
use bitflags::bitflags;
use log::{trace, warn};
use nom::number::complete::{le_u16, le_u32};
use nom::sequence::tuple;
use nom::IResult;
use std::borrow::Cow;

/// File header (8 bytes) plus string pool header (28 bytes).
pub(crate) const HEADER_SIZE: usize = 36;
/// The string pool chunk begins right after the 8 byte file header.
pub(crate) const STRING_POOL_START: usize = 8;

bitflags! {
    /// Flags word of the string pool header.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct StringPoolFlags: u32 {
        const SORTED = 0x0000_0001;
        const UTF8 = 0x0000_0100;
    }
}

/// Little-endian cursor over a borrowed document.
///
/// Every read is bounds checked and reports the offset it failed at.
pub(crate) struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        BinaryReader { data, pos: 0 }
    }

    pub(crate) fn at(data: &'a [u8], pos: usize) -> Self {
        BinaryReader { data, pos }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.pos == self.data.len()
    }

    fn take(&mut self, count: usize, what: &str) -> BinaryXmlResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| BinaryXmlError::truncated(what, self.pos))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> BinaryXmlResult<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    pub(crate) fn read_u16(&mut self) -> BinaryXmlResult<u16> {
        let bytes = self.take(2, "u16")?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> BinaryXmlResult<u32> {
        let bytes = self.take(4, "u32")?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_i32(&mut self) -> BinaryXmlResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub(crate) fn seek(&mut self, offset: usize) -> BinaryXmlResult<()> {
        if offset > self.data.len() {
            return Err(BinaryXmlError::invalid(format!(
                "Attempted to seek to {offset} past end of document ({} bytes)",
                self.data.len()
            )));
        }
        self.pos = offset;
        Ok(())
    }

    pub(crate) fn skip(&mut self, count: usize) -> BinaryXmlResult<()> {
        self.take(count, "chunk body").map(|_| ())
    }

    /// Reads an 8 byte chunk header whose chunk must fit in the buffer.
    pub(crate) fn read_chunk_header(&mut self) -> BinaryXmlResult<ChunkHeader> {
        let start = self.pos;
        let chunk_type = self.read_u16()?;
        let header_size = self.read_u16()?;
        let chunk_size = self.read_u32()?;
        if header_size < 8 || chunk_size < u32::from(header_size) {
            return Err(BinaryXmlError::invalid(format!(
                "Chunk [0x{chunk_type:04X}] at {start} has header {header_size} and size {chunk_size}"
            )));
        }
        let header = ChunkHeader {
            chunk_type,
            header_size,
            chunk_size,
            start,
        };
        match start.checked_add(chunk_size as usize) {
            Some(end) if end <= self.data.len() => Ok(header),
            _ => Err(BinaryXmlError::invalid(format!(
                "Chunk [0x{chunk_type:04X}] at {start} runs past the end of the document"
            ))),
        }
    }

    /// Pool entry in the UTF-8 layout; falls back to modified UTF-8.
    fn read_utf8_entry(&mut self) -> BinaryXmlResult<String> {
        let offset = self.pos;
        let _utf16_units = self.read_utf8_length()?;
        let byte_len = self.read_utf8_length()?;
        let bytes = self.take(byte_len, "UTF-8 string")?;
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => Cow::Borrowed(text),
            Err(_) => cesu8::from_java_cesu8(bytes).map_err(|_| {
                BinaryXmlError::invalid(format!("String at {offset} is not valid UTF-8"))
            })?,
        };
        Ok(text.into_owned())
    }

    fn read_utf16_entry(&mut self) -> BinaryXmlResult<String> {
        let offset = self.pos;
        let unit_count = self.read_utf16_length()?;
        let bytes = self.take(unit_count.saturating_mul(2), "UTF-16 string")?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units)
            .map_err(|err| BinaryXmlError::invalid(format!("String at {offset}: {err}")))
    }

    /// One byte, or two when the high bit of the first is set.
    fn read_utf8_length(&mut self) -> BinaryXmlResult<usize> {
        let first = self.read_u8()? as usize;
        if first & 0x80 == 0 {
            return Ok(first);
        }
        Ok(((first & 0x7F) << 8) | self.read_u8()? as usize)
    }

    /// One unit, or two when the high bit of the first is set.
    fn read_utf16_length(&mut self) -> BinaryXmlResult<usize> {
        let first = self.read_u16()? as usize;
        if first & 0x8000 == 0 {
            return Ok(first);
        }
        Ok(((first & 0x7FFF) << 16) | self.read_u16()? as usize)
    }
}

/// Type and extent of one chunk, as read by [`BinaryReader::read_chunk_header`].
pub(crate) struct ChunkHeader {
    pub(crate) chunk_type: u16,
    pub(crate) header_size: u16,
    pub(crate) chunk_size: u32,
    pub(crate) start: usize,
}

impl ChunkHeader {
    pub(crate) fn end(&self) -> usize {
        self.start + self.chunk_size as usize
    }

    pub(crate) fn body_start(&self) -> usize {
        self.start + self.header_size as usize
    }
}

/// The fixed 36 byte prefix of every binary XML document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BinaryXmlHeader {
    pub magic: u32,
    /// Size of the whole XML chunk, i.e. of the document.
    pub document_size: u32,
    pub string_table_marker: u16,
    pub header_size: u16,
    /// Size of the string pool chunk.
    pub chunk_size: u32,
    pub string_count: u32,
    pub style_count: u32,
    pub flags: StringPoolFlags,
    /// Offset of the string data, relative to the string pool chunk.
    pub strings_offset: u32,
    pub styles_offset: u32,
}

impl BinaryXmlHeader {
    pub fn is_utf8(&self) -> bool {
        self.flags.contains(StringPoolFlags::UTF8)
    }

    /// Absolute offset of the first string byte.
    pub(crate) fn strings_base(&self) -> usize {
        if self.strings_offset != 0 {
            STRING_POOL_START + self.strings_offset as usize
        } else {
            HEADER_SIZE + 4 * (self.string_count as usize + self.style_count as usize)
        }
    }

    /// Absolute offset one past the string pool chunk.
    pub(crate) fn pool_end(&self) -> usize {
        STRING_POOL_START + self.chunk_size as usize
    }
}

fn parse_header(input: &[u8]) -> IResult<&[u8], BinaryXmlHeader> {
    let (input, (magic, document_size, string_table_marker, header_size, chunk_size)) =
        tuple((le_u32, le_u32, le_u16, le_u16, le_u32))(input)?;
    let (input, (string_count, style_count, flags, strings_offset, styles_offset)) =
        tuple((le_u32, le_u32, le_u32, le_u32, le_u32))(input)?;
    Ok((
        input,
        BinaryXmlHeader {
            magic,
            document_size,
            string_table_marker,
            header_size,
            chunk_size,
            string_count,
            style_count,
            flags: StringPoolFlags::from_bits_retain(flags),
            strings_offset,
            styles_offset,
        },
    ))
}

/// Reads and validates the document header.
pub fn read_header(data: &[u8]) -> BinaryXmlResult<BinaryXmlHeader> {
    let (_, header) = parse_header(data).map_err(|_| {
        BinaryXmlError::invalid(format!(
            "Binary XML header needs {HEADER_SIZE} bytes, found {}",
            data.len()
        ))
    })?;
    if header.magic != XML_IDENTIFIER {
        return Err(BinaryXmlError::invalid(format!(
            "Unexpected magic number 0x{:08X}",
            header.magic
        )));
    }
    if header.string_table_marker != RES_STRING_POOL_TYPE {
        return Err(BinaryXmlError::invalid(format!(
            "Missing string table marker (found 0x{:04X})",
            header.string_table_marker
        )));
    }
    Ok(header)
}

/// Decoded, index-addressed string table of a document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StringPool {
    strings: Vec<String>,
    flags: StringPoolFlags,
}

impl StringPool {
    /// Decodes the string pool of `data`.
    ///
    /// A document with a bad magic number or string table marker yields an empty
    /// pool and a warning; a pool whose offsets point outside the document is an
    /// error.
    pub fn read(data: &[u8]) -> BinaryXmlResult<Self> {
        match read_header(data) {
            Ok(header) => Self::read_with_header(data, &header),
            Err(err) => {
                warn!("unable to get strings; {err}");
                Ok(StringPool::default())
            }
        }
    }

    pub(crate) fn read_with_header(data: &[u8], header: &BinaryXmlHeader) -> BinaryXmlResult<Self> {
        let limit = header.pool_end();
        if limit > data.len() {
            return Err(BinaryXmlError::invalid(format!(
                "String pool chunk ends at {limit}, past end of document ({} bytes)",
                data.len()
            )));
        }

        let string_count = header.string_count as usize;
        let mut reader = BinaryReader::at(data, HEADER_SIZE);
        let mut offsets = Vec::with_capacity(string_count.min(data.len() / 4));
        for _ in 0..string_count {
            offsets.push(reader.read_u32()? as usize);
        }

        let base = header.strings_base();
        let is_utf8 = header.is_utf8();
        let pool = &data[..limit];
        let mut strings = Vec::with_capacity(offsets.len());
        for offset in offsets {
            let absolute = base.checked_add(offset).ok_or_else(|| {
                BinaryXmlError::invalid(format!("String offset {offset} overflows"))
            })?;
            let mut entry = BinaryReader::at(pool, absolute);
            let text = if is_utf8 {
                entry.read_utf8_entry()?
            } else {
                entry.read_utf16_entry()?
            };
            trace!("string #{} [{}]", strings.len(), text);
            strings.push(text);
        }

        Ok(StringPool {
            strings,
            flags: header.flags,
        })
    }

    pub fn get(&self, idx: u32) -> Option<&str> {
        self.strings.get(idx as usize).map(|s| s.as_str())
    }

    /// Resolves a signed string reference; negative indices mean "absent" and
    /// resolve to an empty string.
    pub fn resolve(&self, idx: i32) -> BinaryXmlResult<String> {
        if idx < 0 {
            return Ok(String::new());
        }
        self.get(idx as u32).map(str::to_string).ok_or_else(|| {
            BinaryXmlError::invalid(format!(
                "String index {idx} out of range for pool of {} strings",
                self.strings.len()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn is_utf8(&self) -> bool {
        self.flags.contains(StringPoolFlags::UTF8)
    }

    pub fn flags(&self) -> StringPoolFlags {
        self.flags
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(|s| s.as_str())
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, StringPoolFlags) {
        (self.strings, self.flags)
    }
}
