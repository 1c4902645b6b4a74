use super::element::AttributeRecord;
use super::reader::{read_header, BinaryReader, ChunkHeader, StringPool, StringPoolFlags};
use super::traverse::traverse;
use super::values::{ManifestValue, TypedValue, ValueType};
use super::visitor::{local_name, AttributesSetterVisitor};
use super::writer::ChunkWriter;
use super::{
    join_path, BinaryXmlError, BinaryXmlResult, ANDROID_NAMESPACE_URI, NO_ENTRY_INDEX,
    RES_STRING_POOL_TYPE, RES_XML_CDATA_TYPE, RES_XML_END_ELEMENT_TYPE,
    RES_XML_END_NAMESPACE_TYPE, RES_XML_RESOURCE_MAP_TYPE, RES_XML_START_ELEMENT_TYPE,
    RES_XML_START_NAMESPACE_TYPE, RES_XML_TYPE,
};
use log::{debug, warn};

const STRING_POOL_HEADER_SIZE: u16 = 28;
const NODE_HEADER_SIZE: u16 = 16;
const ATTRIBUTE_SIZE: u16 = 20;

/// Resource ids of the `android:` attributes the mutation path knows how to add.
const FRAMEWORK_ATTRIBUTES: &[(&str, u32)] = &[
    ("theme", 0x0101_0000),
    ("label", 0x0101_0001),
    ("icon", 0x0101_0002),
    ("name", 0x0101_0003),
    ("permission", 0x0101_0006),
    ("hasCode", 0x0101_000c),
    ("enabled", 0x0101_000e),
    ("debuggable", 0x0101_000f),
    ("exported", 0x0101_0010),
    ("process", 0x0101_0011),
    ("minSdkVersion", 0x0101_020c),
    ("versionCode", 0x0101_021b),
    ("versionName", 0x0101_021c),
    ("targetSdkVersion", 0x0101_0270),
    ("testOnly", 0x0101_0272),
    ("allowBackup", 0x0101_0280),
    ("extractNativeLibs", 0x0101_04ea),
    ("usesCleartextTraffic", 0x0101_04ec),
    ("networkSecurityConfig", 0x0101_0527),
];

fn framework_attribute_id(name: &str) -> Option<u32> {
    let (prefix, local) = match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    };
    if !matches!(prefix, None | Some("android")) {
        return None;
    }
    FRAMEWORK_ATTRIBUTES
        .iter()
        .find(|(attr, _)| *attr == local)
        .map(|(_, id)| *id)
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct NamespaceNode {
    line: u32,
    comment: u32,
    prefix: u32,
    uri: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ElementNode {
    line: u32,
    comment: u32,
    namespace: u32,
    name: u32,
    /// 1-based positions of the `id`, `class` and `style` attributes, 0 if absent.
    id_index: u16,
    class_index: u16,
    style_index: u16,
    attributes: Vec<AttributeRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct EndElementNode {
    line: u32,
    comment: u32,
    namespace: u32,
    name: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct CDataNode {
    line: u32,
    comment: u32,
    text: u32,
    value_type: ValueType,
    data: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Node {
    StartNamespace(NamespaceNode),
    EndNamespace(NamespaceNode),
    StartElement(ElementNode),
    EndElement(EndElementNode),
    CData(CDataNode),
}

/// Owned chunk-level model of a binary XML document.
///
/// Every string reference is a pool index; [`BinaryXmlDocument::to_bytes`]
/// re-derives all sizes and offsets, so edits never patch bytes in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryXmlDocument {
    strings: Vec<String>,
    flags: StringPoolFlags,
    resource_map: Vec<u32>,
    nodes: Vec<Node>,
}

impl BinaryXmlDocument {
    pub fn from_bytes(data: &[u8]) -> BinaryXmlResult<Self> {
        let mut reader = BinaryReader::new(data);
        let xml_header = reader.read_chunk_header()?;
        if xml_header.chunk_type != RES_XML_TYPE {
            return Err(BinaryXmlError::invalid(
                "Binary XML does not start with RES_XML_TYPE header",
            ));
        }
        let header = read_header(data)?;
        if header.style_count > 0 {
            warn!("dropping {} string pool styles", header.style_count);
        }
        let (strings, flags) = StringPool::read_with_header(data, &header)?.into_parts();
        reader.seek(header.pool_end())?;

        let mut document = BinaryXmlDocument {
            strings,
            flags,
            resource_map: Vec::new(),
            nodes: Vec::new(),
        };

        let xml_end = xml_header.end();
        while reader.position() < xml_end {
            let chunk = reader.read_chunk_header()?;
            match chunk.chunk_type {
                RES_XML_RESOURCE_MAP_TYPE => {
                    reader.seek(chunk.body_start())?;
                    while reader.position() + 4 <= chunk.end() {
                        document.resource_map.push(reader.read_u32()?);
                    }
                }
                RES_XML_START_NAMESPACE_TYPE | RES_XML_END_NAMESPACE_TYPE => {
                    let (line, comment) = read_node_header(&mut reader, &chunk)?;
                    let node = NamespaceNode {
                        line,
                        comment,
                        prefix: reader.read_u32()?,
                        uri: reader.read_u32()?,
                    };
                    document.nodes.push(if chunk.chunk_type == RES_XML_START_NAMESPACE_TYPE {
                        Node::StartNamespace(node)
                    } else {
                        Node::EndNamespace(node)
                    });
                }
                RES_XML_START_ELEMENT_TYPE => {
                    let element = read_element(&mut reader, &chunk)?;
                    document.nodes.push(Node::StartElement(element));
                }
                RES_XML_END_ELEMENT_TYPE => {
                    let (line, comment) = read_node_header(&mut reader, &chunk)?;
                    document.nodes.push(Node::EndElement(EndElementNode {
                        line,
                        comment,
                        namespace: reader.read_u32()?,
                        name: reader.read_u32()?,
                    }));
                }
                RES_XML_CDATA_TYPE => {
                    let (line, comment) = read_node_header(&mut reader, &chunk)?;
                    let text = reader.read_u32()?;
                    reader.read_u16()?; // value size
                    reader.read_u8()?; // res0
                    let value_type = ValueType::from(reader.read_u8()?);
                    let data = reader.read_u32()?;
                    document.nodes.push(Node::CData(CDataNode {
                        line,
                        comment,
                        text,
                        value_type,
                        data,
                    }));
                }
                RES_STRING_POOL_TYPE => warn!("ignoring extra string pool at {}", chunk.start),
                other => warn!("dropping unknown chunk [0x{other:04X}] at {}", chunk.start),
            }
            reader.seek(chunk.end())?;
        }

        debug!(
            "decoded binary XML: {} strings, {} resource ids, {} nodes",
            document.strings.len(),
            document.resource_map.len(),
            document.nodes.len()
        );
        Ok(document)
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn resource_map(&self) -> &[u32] {
        &self.resource_map
    }

    pub fn is_utf8(&self) -> bool {
        self.flags.contains(StringPoolFlags::UTF8)
    }

    /// Resource id mapped to an attribute name, if the name is in the mapped
    /// prefix of the pool.
    pub fn resource_id_of(&self, name: &str) -> Option<u32> {
        self.strings
            .iter()
            .zip(&self.resource_map)
            .find(|(string, id)| string.as_str() == name && **id != 0)
            .map(|(_, id)| *id)
    }

    /// Number of start elements.
    pub fn element_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::StartElement(_)))
            .count()
    }

    fn element(&self, ordinal: usize) -> BinaryXmlResult<&ElementNode> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::StartElement(element) => Some(element),
                _ => None,
            })
            .nth(ordinal)
            .ok_or_else(|| BinaryXmlError::MalformedManifest(format!("no start element #{ordinal}")))
    }

    fn element_mut(&mut self, ordinal: usize) -> BinaryXmlResult<&mut ElementNode> {
        self.nodes
            .iter_mut()
            .filter_map(|node| match node {
                Node::StartElement(element) => Some(element),
                _ => None,
            })
            .nth(ordinal)
            .ok_or_else(|| BinaryXmlError::MalformedManifest(format!("no start element #{ordinal}")))
    }

    /// Sets `name` to `value` on the `ordinal`-th start element (document order).
    ///
    /// Every existing record with the same local name is retyped in place. A
    /// prefixed name only matches records in that prefix's namespace; a bare
    /// name matches any namespace. Otherwise a new record is inserted, and
    /// framework attributes such as `debuggable` get the android namespace
    /// and a resource map entry.
    pub fn set_attribute(&mut self, ordinal: usize, name: &str, value: &str) -> BinaryXmlResult<()> {
        let local = local_name(name);
        let namespace = self.namespace_of(name)?;
        let manifest_value = ManifestValue::infer(value);
        let matching: Vec<usize> = self
            .element(ordinal)?
            .attributes
            .iter()
            .enumerate()
            .filter(|(_, attr)| {
                self.strings.get(attr.name as usize).map(String::as_str) == Some(local)
                    && namespace.map_or(true, |ns| ns == attr.namespace)
            })
            .map(|(position, _)| position)
            .collect();

        if !matching.is_empty() {
            let typed = self.encode_value(&manifest_value);
            let element = self.element_mut(ordinal)?;
            for position in matching {
                element.attributes[position].value = typed;
            }
            return Ok(());
        }

        // Name first: it may insert into the pool and renumber indices.
        let (name_index, resource_id) = self.attribute_name_index(name)?;
        let namespace = match (self.namespace_of(name)?, resource_id) {
            (Some(namespace), _) => namespace,
            (None, Some(_)) => self.android_namespace_index(),
            (None, None) => NO_ENTRY_INDEX,
        };
        let typed = self.encode_value(&manifest_value);
        let position = self.insertion_point(ordinal, resource_id)?;
        let element = self.element_mut(ordinal)?;
        element.attributes.insert(
            position,
            AttributeRecord {
                namespace,
                name: name_index,
                value: typed,
            },
        );
        for index in [
            &mut element.id_index,
            &mut element.class_index,
            &mut element.style_index,
        ] {
            if *index != 0 && *index as usize > position {
                *index += 1;
            }
        }
        Ok(())
    }

    /// Namespace URI index for the prefix of `name`, `None` when unprefixed.
    ///
    /// `android` always resolves, to `NO_ENTRY` when the URI is not in the pool.
    fn namespace_of(&self, name: &str) -> BinaryXmlResult<Option<u32>> {
        let Some((prefix, _)) = name.rsplit_once(':') else {
            return Ok(None);
        };
        if prefix == "android" {
            return Ok(Some(self.android_namespace_index()));
        }
        self.nodes
            .iter()
            .find_map(|node| match node {
                Node::StartNamespace(ns)
                    if self.strings.get(ns.prefix as usize).map(String::as_str) == Some(prefix) =>
                {
                    Some(ns.uri)
                }
                _ => None,
            })
            .map(Some)
            .ok_or_else(|| {
                BinaryXmlError::MalformedManifest(format!("undeclared namespace prefix [{prefix}]"))
            })
    }

    fn encode_value(&mut self, value: &ManifestValue) -> TypedValue {
        let string_index = match value {
            ManifestValue::String(text) => Some(self.intern(text)),
            _ => None,
        };
        value.encode(string_index)
    }

    fn android_namespace_index(&self) -> u32 {
        self.strings
            .iter()
            .position(|s| s == ANDROID_NAMESPACE_URI)
            .map_or(NO_ENTRY_INDEX, |idx| idx as u32)
    }

    /// Index of an existing string, appending it to the pool when absent.
    fn intern(&mut self, value: &str) -> u32 {
        if let Some(idx) = self.strings.iter().position(|s| s == value) {
            return idx as u32;
        }
        self.strings.push(value.to_string());
        (self.strings.len() - 1) as u32
    }

    /// Like [`Self::intern`], but never returns a slot that carries a resource id.
    fn intern_unmapped(&mut self, value: &str) -> u32 {
        let mapped = self.resource_map.len().min(self.strings.len());
        match self.strings[mapped..].iter().position(|s| s == value) {
            Some(idx) => (mapped + idx) as u32,
            None => {
                self.strings.push(value.to_string());
                (self.strings.len() - 1) as u32
            }
        }
    }

    fn attribute_name_index(&mut self, name: &str) -> BinaryXmlResult<(u32, Option<u32>)> {
        let local = local_name(name);
        let Some(id) = framework_attribute_id(name) else {
            return Ok((self.intern_unmapped(local), None));
        };

        if let Some(idx) = self
            .resource_map
            .iter()
            .zip(&self.strings)
            .position(|(mapped, string)| *mapped == id && string == local)
        {
            return Ok((idx as u32, Some(id)));
        }

        // Mapped names occupy the first `resource_map.len()` pool slots.
        let at = self.resource_map.len();
        if at > self.strings.len() {
            return Err(BinaryXmlError::invalid(format!(
                "Resource map has {at} entries for a pool of {} strings",
                self.strings.len()
            )));
        }
        self.insert_string(at, local);
        self.resource_map.push(id);
        Ok((at as u32, Some(id)))
    }

    fn insertion_point(&self, ordinal: usize, resource_id: Option<u32>) -> BinaryXmlResult<usize> {
        let element = self.element(ordinal)?;
        let Some(id) = resource_id else {
            return Ok(element.attributes.len());
        };
        // Attributes are ordered by resource id, unmapped ones last.
        Ok(element
            .attributes
            .iter()
            .position(|attr| match self.resource_map.get(attr.name as usize) {
                Some(&other) if other != 0 => other > id,
                _ => true,
            })
            .unwrap_or(element.attributes.len()))
    }

    /// Inserts a string at `at`, shifting every reference to a later slot.
    fn insert_string(&mut self, at: usize, value: &str) {
        self.strings.insert(at, value.to_string());
        let at = at as u32;
        self.remap_indices(|idx| {
            if idx != NO_ENTRY_INDEX && idx >= at {
                idx + 1
            } else {
                idx
            }
        });
    }

    fn remap_indices(&mut self, remap: impl Fn(u32) -> u32) {
        let remap_value = |value: &mut TypedValue| {
            value.raw_value = remap(value.raw_value);
            if value.value_type == ValueType::String {
                value.data = remap(value.data);
            }
        };
        for node in &mut self.nodes {
            match node {
                Node::StartNamespace(ns) | Node::EndNamespace(ns) => {
                    ns.comment = remap(ns.comment);
                    ns.prefix = remap(ns.prefix);
                    ns.uri = remap(ns.uri);
                }
                Node::StartElement(element) => {
                    element.comment = remap(element.comment);
                    element.namespace = remap(element.namespace);
                    element.name = remap(element.name);
                    for attr in &mut element.attributes {
                        attr.namespace = remap(attr.namespace);
                        attr.name = remap(attr.name);
                        remap_value(&mut attr.value);
                    }
                }
                Node::EndElement(element) => {
                    element.comment = remap(element.comment);
                    element.namespace = remap(element.namespace);
                    element.name = remap(element.name);
                }
                Node::CData(cdata) => {
                    cdata.comment = remap(cdata.comment);
                    cdata.text = remap(cdata.text);
                    if cdata.value_type == ValueType::String {
                        cdata.data = remap(cdata.data);
                    }
                }
            }
        }
    }

    /// Encodes the document, re-deriving every chunk size and string offset.
    pub fn to_bytes(&self) -> BinaryXmlResult<Vec<u8>> {
        let mut out = ChunkWriter::new();
        out.chunk(RES_XML_TYPE, 8, |out| {
            self.encode_string_pool(out)?;
            if !self.resource_map.is_empty() {
                out.chunk(RES_XML_RESOURCE_MAP_TYPE, 8, |out| {
                    for id in &self.resource_map {
                        out.u32(*id);
                    }
                    Ok(())
                })?;
            }
            self.nodes.iter().try_for_each(|node| node.encode(out))
        })?;
        Ok(out.into_bytes())
    }

    fn encode_string_pool(&self, out: &mut ChunkWriter) -> BinaryXmlResult<()> {
        let mut data = ChunkWriter::new();
        let mut offsets = Vec::with_capacity(self.strings.len());
        for s in &self.strings {
            offsets.push(data.len() as u32);
            if self.is_utf8() {
                data.utf8_string(s)?;
            } else {
                data.utf16_string(s);
            }
        }
        data.pad_to_four();

        let count = self.strings.len() as u32;
        out.chunk(RES_STRING_POOL_TYPE, STRING_POOL_HEADER_SIZE, |out| {
            out.u32(count)
                .u32(0) // styles
                // Inserted strings break any sort order.
                .u32(self.flags.difference(StringPoolFlags::SORTED).bits())
                .u32(u32::from(STRING_POOL_HEADER_SIZE) + count * 4)
                .u32(0);
            for offset in &offsets {
                out.u32(*offset);
            }
            out.bytes(data.as_bytes());
            Ok(())
        })
    }
}

impl Node {
    fn encode(&self, out: &mut ChunkWriter) -> BinaryXmlResult<()> {
        let (chunk_type, line, comment) = match self {
            Node::StartNamespace(ns) => (RES_XML_START_NAMESPACE_TYPE, ns.line, ns.comment),
            Node::EndNamespace(ns) => (RES_XML_END_NAMESPACE_TYPE, ns.line, ns.comment),
            Node::StartElement(element) => (RES_XML_START_ELEMENT_TYPE, element.line, element.comment),
            Node::EndElement(element) => (RES_XML_END_ELEMENT_TYPE, element.line, element.comment),
            Node::CData(cdata) => (RES_XML_CDATA_TYPE, cdata.line, cdata.comment),
        };
        out.chunk(chunk_type, NODE_HEADER_SIZE, |out| {
            out.u32(line).u32(comment);
            match self {
                Node::StartNamespace(ns) | Node::EndNamespace(ns) => {
                    out.u32(ns.prefix).u32(ns.uri);
                }
                Node::StartElement(element) => {
                    let count = u16::try_from(element.attributes.len()).map_err(|_| {
                        BinaryXmlError::invalid("Element has more than 65535 attributes")
                    })?;
                    out.u32(element.namespace)
                        .u32(element.name)
                        .u16(ATTRIBUTE_SIZE) // attributes start right after this extension
                        .u16(ATTRIBUTE_SIZE)
                        .u16(count)
                        .u16(element.id_index)
                        .u16(element.class_index)
                        .u16(element.style_index);
                    for attr in &element.attributes {
                        out.u32(attr.namespace)
                            .u32(attr.name)
                            .u32(attr.value.raw_value)
                            .typed_value(&attr.value);
                    }
                }
                Node::EndElement(element) => {
                    out.u32(element.namespace).u32(element.name);
                }
                Node::CData(cdata) => {
                    out.u32(cdata.text)
                        .typed_value(&TypedValue::new(cdata.value_type, NO_ENTRY_INDEX, cdata.data));
                }
            }
            Ok(())
        })
    }
}

/// Reads line number and comment, leaving the reader at the chunk body.
fn read_node_header(reader: &mut BinaryReader<'_>, chunk: &ChunkHeader) -> BinaryXmlResult<(u32, u32)> {
    let line = reader.read_u32()?;
    let comment = reader.read_u32()?;
    reader.seek(chunk.body_start())?;
    Ok((line, comment))
}

fn read_element(reader: &mut BinaryReader<'_>, chunk: &ChunkHeader) -> BinaryXmlResult<ElementNode> {
    let (line, comment) = read_node_header(reader, chunk)?;
    let ext_start = reader.position();
    let namespace = reader.read_u32()?;
    let name = reader.read_u32()?;
    let attribute_start = reader.read_u16()? as usize;
    let attribute_size = reader.read_u16()? as usize;
    let attribute_count = reader.read_u16()? as usize;
    let id_index = reader.read_u16()?;
    let class_index = reader.read_u16()?;
    let style_index = reader.read_u16()?;
    if attribute_count > 0 && attribute_size < ATTRIBUTE_SIZE as usize {
        return Err(BinaryXmlError::invalid(format!(
            "Attribute size {attribute_size} too small in element at {}",
            chunk.start
        )));
    }

    let mut attributes = Vec::with_capacity(attribute_count);
    for idx in 0..attribute_count {
        let offset = ext_start + attribute_start + idx * attribute_size;
        if offset + ATTRIBUTE_SIZE as usize > chunk.end() {
            return Err(BinaryXmlError::invalid(format!(
                "Attribute #{idx} exceeds element chunk at {}",
                chunk.start
            )));
        }
        reader.seek(offset)?;
        attributes.push(AttributeRecord::read(reader)?);
    }

    Ok(ElementNode {
        line,
        comment,
        namespace,
        name,
        id_index,
        class_index,
        style_index,
        attributes,
    })
}

/// Locates the elements matching `path` with an [`AttributesSetterVisitor`],
/// applies the attribute to the decoded document and re-encodes it.
pub(crate) fn set_element_attribute<S: AsRef<str>>(
    data: &[u8],
    path: &[S],
    name: &str,
    value: &str,
) -> BinaryXmlResult<Vec<u8>> {
    let mut setter = AttributesSetterVisitor::new(path, name, value);
    traverse(data, &mut setter)?;
    if setter.targets().is_empty() {
        warn!("unable to find [{}] to set [{name}]", join_path(path));
        return Err(BinaryXmlError::MalformedManifest(format!(
            "no element at {}",
            join_path(path)
        )));
    }

    let mut document = BinaryXmlDocument::from_bytes(data)?;
    setter.apply(&mut document)?;
    document.to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::android::binary_xml::{get_element_attributes, render_as_xml_text};
    use crate::tests::fixtures::{
        sample_manifest, sample_manifest_builder, FixtureAttr, FixtureBuilder, ATTR_DEBUGGABLE,
        ATTR_LABEL,
    };

    const TOOLS_NAMESPACE_URI: &str = "http://schemas.android.com/tools";

    /// Name, namespace URI and value of every record on an element, duplicates included.
    fn records_of(document: &BinaryXmlDocument, ordinal: usize) -> Vec<(String, String, TypedValue)> {
        let string = |idx: u32| document.strings().get(idx as usize).cloned().unwrap_or_default();
        document
            .element(ordinal)
            .expect("element")
            .attributes
            .iter()
            .map(|attr| (string(attr.name), string(attr.namespace), attr.value))
            .collect()
    }

    const APPLICATION: usize = 2;

    #[test]
    fn reencodes_untouched_documents_byte_for_byte() {
        for utf8 in [true, false] {
            let original = sample_manifest_builder(None, utf8).build();
            let document = BinaryXmlDocument::from_bytes(&original).expect("decode");
            assert_eq!(document.is_utf8(), utf8);
            assert_eq!(document.element_count(), 4);
            assert_eq!(document.to_bytes().expect("encode"), original);
        }
    }

    #[test]
    fn inserting_framework_attribute_extends_resource_map() {
        let original = sample_manifest(None);
        let mut document = BinaryXmlDocument::from_bytes(&original).expect("decode");
        let mapped_before = document.resource_map().len();
        document
            .set_attribute(APPLICATION, "debuggable", "true")
            .expect("set");

        assert_eq!(document.resource_map().len(), mapped_before + 1);
        assert_eq!(document.strings()[mapped_before], "debuggable");
        assert_eq!(document.resource_id_of("debuggable"), Some(ATTR_DEBUGGABLE));

        let patched = document.to_bytes().expect("encode");
        let attributes = get_element_attributes(&patched, &["application"]).expect("query");
        assert_eq!(attributes["debuggable"], "true");
        assert_eq!(attributes["label"], "@res/0x7F010000");

        // Every other string reference survived the renumbering.
        let before = render_as_xml_text(&original).expect("render original");
        let after = render_as_xml_text(&patched).expect("render patched");
        assert_eq!(
            after,
            before.replace(
                "<application label=\"@res/0x7F010000\">",
                "<application label=\"@res/0x7F010000\" debuggable=\"true\">"
            )
        );
    }

    #[test]
    fn inserted_attributes_follow_resource_id_order() {
        let original = sample_manifest(None);
        let mut document = BinaryXmlDocument::from_bytes(&original).expect("decode");
        // `theme` (0x01010000) sorts before `label` (0x01010001).
        document.set_attribute(APPLICATION, "android:theme", "@0x7f020000").expect("set");
        let patched = document.to_bytes().expect("encode");
        let attributes = get_element_attributes(&patched, &["application"]).expect("query");
        assert_eq!(attributes.keys().collect::<Vec<_>>(), vec!["theme", "label"]);
        assert_eq!(attributes["theme"], "@res/0x7F020000");
        assert_eq!(document.resource_id_of("label"), Some(ATTR_LABEL));
    }

    #[test]
    fn overwriting_retypes_existing_attribute() {
        let original = sample_manifest(Some(false));
        let mut document = BinaryXmlDocument::from_bytes(&original).expect("decode");
        let strings_before = document.strings().len();
        document.set_attribute(APPLICATION, "debuggable", "true").expect("set");
        assert_eq!(document.strings().len(), strings_before);

        let patched = document.to_bytes().expect("encode");
        assert_eq!(patched.len(), original.len());
        let attributes = get_element_attributes(&patched, &["application"]).expect("query");
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes["debuggable"], "true");
    }

    #[test]
    fn overwrites_every_duplicate_record() {
        let mut builder = FixtureBuilder::utf8();
        builder
            .map_attribute("debuggable", ATTR_DEBUGGABLE)
            .start_namespace("android", ANDROID_NAMESPACE_URI)
            .start_element(
                "application",
                &[
                    FixtureAttr::boolean("debuggable", false).android(),
                    FixtureAttr::boolean("debuggable", false).android(),
                ],
            )
            .end_element("application")
            .end_namespace("android", ANDROID_NAMESPACE_URI);
        let original = builder.build();

        let mut document = BinaryXmlDocument::from_bytes(&original).expect("decode");
        document.set_attribute(0, "android:debuggable", "true").expect("set");
        let patched = document.to_bytes().expect("encode");
        assert_eq!(patched.len(), original.len());

        let reparsed = BinaryXmlDocument::from_bytes(&patched).expect("decode patched");
        let records = records_of(&reparsed, 0);
        assert_eq!(records.len(), 2);
        for (name, _, value) in records {
            assert_eq!(name, "debuggable");
            assert_eq!(value, TypedValue::new(ValueType::IntBoolean, NO_ENTRY_INDEX, 0xFFFF_FFFF));
        }
    }

    #[test]
    fn undeclared_prefix_is_malformed() {
        let mut document = BinaryXmlDocument::from_bytes(&sample_manifest(None)).expect("decode");
        assert!(matches!(
            document.set_attribute(APPLICATION, "tools:label", "@0x7f010001"),
            Err(BinaryXmlError::MalformedManifest(_))
        ));
        let patched = document.to_bytes().expect("encode");
        let attributes = get_element_attributes(&patched, &["application"]).expect("query");
        assert_eq!(attributes["label"], "@res/0x7F010000");
    }

    #[test]
    fn prefixed_names_only_match_their_namespace() {
        let mut builder = FixtureBuilder::utf8();
        builder
            .map_attribute("label", ATTR_LABEL)
            .start_namespace("android", ANDROID_NAMESPACE_URI)
            .start_namespace("tools", TOOLS_NAMESPACE_URI)
            .start_element("application", &[FixtureAttr::reference("label", 0x7f01_0000).android()])
            .end_element("application")
            .end_namespace("tools", TOOLS_NAMESPACE_URI)
            .end_namespace("android", ANDROID_NAMESPACE_URI);
        let mut document = BinaryXmlDocument::from_bytes(&builder.build()).expect("decode");

        let reference = |id| TypedValue::new(ValueType::Reference, NO_ENTRY_INDEX, id);

        document.set_attribute(0, "tools:label", "@0x7f010001").expect("set tools");
        assert_eq!(document.resource_map(), &[ATTR_LABEL]);
        let reparsed = BinaryXmlDocument::from_bytes(&document.to_bytes().expect("encode"))
            .expect("decode patched");
        assert_eq!(
            records_of(&reparsed, 0),
            vec![
                ("label".to_string(), ANDROID_NAMESPACE_URI.to_string(), reference(0x7f01_0000)),
                ("label".to_string(), TOOLS_NAMESPACE_URI.to_string(), reference(0x7f01_0001)),
            ]
        );

        document.set_attribute(0, "android:label", "@0x7f010002").expect("set android");
        let records = records_of(&document, 0);
        assert_eq!(records[0].2, reference(0x7f01_0002));
        assert_eq!(records[1].2, reference(0x7f01_0001));
    }

    #[test]
    fn plain_attributes_are_appended_with_string_values() {
        let original = sample_manifest(None);
        let mut document = BinaryXmlDocument::from_bytes(&original).expect("decode");
        let mapped_before = document.resource_map().len();
        document.set_attribute(0, "sharedUserLabel2", "shared label").expect("set");
        assert_eq!(document.resource_map().len(), mapped_before);

        let patched = document.to_bytes().expect("encode");
        let attributes = get_element_attributes(&patched, &["manifest"]).expect("query");
        assert_eq!(attributes.keys().last().map(String::as_str), Some("sharedUserLabel2"));
        assert_eq!(attributes["sharedUserLabel2"], "shared label");
        assert_eq!(attributes["package"], "com.example.app");
    }

    #[test]
    fn unknown_ordinal_is_malformed() {
        let mut document = BinaryXmlDocument::from_bytes(&sample_manifest(None)).expect("decode");
        assert!(matches!(
            document.set_attribute(10, "debuggable", "true"),
            Err(BinaryXmlError::MalformedManifest(_))
        ));
    }

    #[test]
    fn framework_ids_only_apply_to_android_names() {
        assert_eq!(framework_attribute_id("debuggable"), Some(ATTR_DEBUGGABLE));
        assert_eq!(framework_attribute_id("android:debuggable"), Some(ATTR_DEBUGGABLE));
        assert_eq!(framework_attribute_id("tools:debuggable"), None);
        assert_eq!(framework_attribute_id("package"), None);
    }
}
