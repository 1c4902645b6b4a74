use super::reader::BinaryReader;
use super::values::{render_value, TypedValue, ValueType};
use super::visitor::BinaryXmlVisitor;
use super::{BinaryXmlResult, StringPool, XML_ATTRS_MARKER};
use indexmap::IndexMap;
use log::{debug, info, warn};
use std::ops::ControlFlow;

/// Decoded attributes of a start tag, in declaration order.
pub type Attributes = IndexMap<String, String>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StartTag {
    pub name: String,
    /// Namespace URI, empty when the tag has none.
    pub namespace: String,
    pub attributes: Attributes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EndTag {
    pub name: String,
    pub namespace: String,
}

/// One decoded node of the chunk stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlElement {
    Start(StartTag),
    End(EndTag),
    CData(String),
    /// The document could not be decoded any further.
    Invalid(String),
}

impl XmlElement {
    /// Hands the element to the matching visitor callback.
    pub fn accept<V: BinaryXmlVisitor + ?Sized>(&self, visitor: &mut V) -> ControlFlow<()> {
        match self {
            XmlElement::Start(tag) => visitor.visit_start(tag),
            XmlElement::End(tag) => visitor.visit_end(tag),
            XmlElement::CData(text) => visitor.visit_cdata(text),
            XmlElement::Invalid(reason) => {
                visitor.visit_invalid(reason);
                ControlFlow::Break(())
            }
        }
    }
}

/// Raw 20 byte `ResXMLTree_attribute` record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AttributeRecord {
    pub(crate) namespace: u32,
    pub(crate) name: u32,
    pub(crate) value: TypedValue,
}

impl AttributeRecord {
    pub(crate) fn read(reader: &mut BinaryReader<'_>) -> BinaryXmlResult<Self> {
        let namespace = reader.read_u32()?;
        let name = reader.read_u32()?;
        let raw_value = reader.read_u32()?;
        reader.read_u16()?; // value size
        reader.read_u8()?; // res0
        let data_type = reader.read_u8()?;
        let data = reader.read_u32()?;
        Ok(AttributeRecord {
            namespace,
            name,
            value: TypedValue::new(ValueType::from(data_type), raw_value, data),
        })
    }
}

/// Decodes a start element chunk; the reader sits just past its 8 byte header.
pub(crate) fn decode_start_element(
    reader: &mut BinaryReader<'_>,
    strings: &StringPool,
) -> BinaryXmlResult<StartTag> {
    reader.read_u32()?; // line number
    reader.read_u32()?; // comment
    let namespace = strings.resolve(reader.read_i32()?)?;
    let name = strings.resolve(reader.read_i32()?)?;
    let attributes = decode_attributes(reader, strings)?;

    info!("start tag [{name}] namespace [{namespace}]");
    Ok(StartTag {
        name,
        namespace,
        attributes,
    })
}

fn decode_attributes(
    reader: &mut BinaryReader<'_>,
    strings: &StringPool,
) -> BinaryXmlResult<Attributes> {
    let mut attributes = Attributes::new();
    let marker = reader.read_u32()?;
    if marker != XML_ATTRS_MARKER {
        warn!("unexpected attributes marker 0x{marker:08X}");
        return Ok(attributes);
    }

    let count = reader.read_u16()?;
    reader.read_u16()?; // id index
    reader.read_u32()?; // class and style indices

    for _ in 0..count {
        let record = AttributeRecord::read(reader)?;
        let name = strings.resolve(record.name as i32)?;
        if name.is_empty() {
            warn!("unexpected empty attribute name");
            continue;
        }
        let value = render_value(&record.value, strings)?;
        info!("  attribute [{name}] value [{value}]");
        attributes.insert(name, value);
    }
    Ok(attributes)
}

/// Decodes an end element chunk; the reader sits just past its 8 byte header.
pub(crate) fn decode_end_element(
    reader: &mut BinaryReader<'_>,
    strings: &StringPool,
) -> BinaryXmlResult<EndTag> {
    reader.read_u32()?; // line number
    reader.read_u32()?; // comment
    let namespace = strings.resolve(reader.read_i32()?)?;
    let name = strings.resolve(reader.read_i32()?)?;

    info!("end tag [{name}] namespace [{namespace}]");
    Ok(EndTag { name, namespace })
}

/// Decodes a cdata chunk; the reader sits just past its 8 byte header.
pub(crate) fn decode_cdata(
    reader: &mut BinaryReader<'_>,
    strings: &StringPool,
) -> BinaryXmlResult<String> {
    reader.read_u32()?; // line number
    reader.read_u32()?; // comment
    let text = strings.resolve(reader.read_i32()?)?;
    reader.read_u32()?; // typed value size, res0 and type
    reader.read_u32()?; // typed value data

    debug!("handling cdata tag [{text}]");
    Ok(text)
}
