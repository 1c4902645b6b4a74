use super::element::{decode_cdata, decode_end_element, decode_start_element, XmlElement};
use super::reader::{read_header, BinaryReader, BinaryXmlHeader, StringPool, STRING_POOL_START};
use super::visitor::BinaryXmlVisitor;
use super::{
    BinaryXmlError, BinaryXmlResult, RES_XML_CDATA_TYPE, RES_XML_END_ELEMENT_TYPE,
    RES_XML_END_NAMESPACE_TYPE, RES_XML_RESOURCE_MAP_TYPE, RES_XML_START_ELEMENT_TYPE,
    RES_XML_START_NAMESPACE_TYPE,
};
use log::{debug, trace, warn};

const CHUNK_HEADER_SIZE: usize = 8;

/// Walks the chunk stream of `data`, handing every decoded element to `visitor`.
///
/// Structural problems deliver a single [`XmlElement::Invalid`] to the visitor
/// and are returned as [`BinaryXmlError::InvalidDocument`].
pub fn traverse<V: BinaryXmlVisitor + ?Sized>(data: &[u8], visitor: &mut V) -> BinaryXmlResult<()> {
    let result = walk(data, visitor);
    if let Err(err) = &result {
        warn!("abandoning binary XML traversal: {err}");
        let _ = XmlElement::Invalid(err.to_string()).accept(visitor);
    }
    result
}

/// Offset of the first chunk after the string pool.
pub(crate) fn xml_chunk_offset(data: &[u8], header: &BinaryXmlHeader) -> BinaryXmlResult<usize> {
    if header.chunk_size as usize >= data.len() {
        return Err(BinaryXmlError::invalid(format!(
            "String pool chunk size {} does not fit a document of {} bytes",
            header.chunk_size,
            data.len()
        )));
    }
    Ok(STRING_POOL_START + header.chunk_size as usize)
}

fn walk<V: BinaryXmlVisitor + ?Sized>(data: &[u8], visitor: &mut V) -> BinaryXmlResult<()> {
    let header = read_header(data)?;
    let strings = StringPool::read_with_header(data, &header)?;
    let body = xml_chunk_offset(data, &header)?;

    let mut reader = BinaryReader::at(data, body);
    reader.seek(body)?;
    loop {
        if reader.is_at_end() {
            debug!("document ended without an end namespace chunk");
            return Ok(());
        }

        let chunk_start = reader.position();
        let tag = reader.read_u16()?;
        if tag == RES_XML_END_NAMESPACE_TYPE {
            return Ok(());
        }
        let header_size = reader.read_u16()?;
        let chunk_size = reader.read_u32()? as usize;
        trace!("chunk at {chunk_start}: tag = [0x{tag:04X}], headerSize = [{header_size}], chunkSize = [{chunk_size}]");

        let element = match tag {
            RES_XML_START_NAMESPACE_TYPE | RES_XML_RESOURCE_MAP_TYPE => {
                let body_size = chunk_size.checked_sub(CHUNK_HEADER_SIZE).ok_or_else(|| {
                    BinaryXmlError::invalid(format!(
                        "Chunk at {chunk_start} declares size {chunk_size}"
                    ))
                })?;
                reader.skip(body_size)?;
                continue;
            }
            RES_XML_START_ELEMENT_TYPE => {
                XmlElement::Start(decode_start_element(&mut reader, &strings)?)
            }
            RES_XML_END_ELEMENT_TYPE => XmlElement::End(decode_end_element(&mut reader, &strings)?),
            RES_XML_CDATA_TYPE => XmlElement::CData(decode_cdata(&mut reader, &strings)?),
            other => {
                warn!("skipping unknown tag [0x{other:04X}] at {chunk_start}");
                continue;
            }
        };

        let chunk_end = chunk_start
            .checked_add(chunk_size)
            .filter(|end| *end <= reader.len() && *end >= reader.position())
            .ok_or_else(|| {
                BinaryXmlError::invalid(format!(
                    "Chunk at {chunk_start} with size {chunk_size} does not cover its contents"
                ))
            })?;
        reader.seek(chunk_end)?;

        if element.accept(visitor).is_break() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::android::binary_xml::element::{EndTag, StartTag};
    use crate::tests::fixtures::{FixtureAttr, FixtureBuilder};
    use std::ops::ControlFlow;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl BinaryXmlVisitor for Recorder {
        fn visit_start(&mut self, element: &StartTag) -> ControlFlow<()> {
            self.events.push(format!("start {}", element.name));
            ControlFlow::Continue(())
        }

        fn visit_end(&mut self, element: &EndTag) -> ControlFlow<()> {
            self.events.push(format!("end {}", element.name));
            ControlFlow::Continue(())
        }

        fn visit_cdata(&mut self, text: &str) -> ControlFlow<()> {
            self.events.push(format!("cdata {text}"));
            ControlFlow::Continue(())
        }

        fn visit_invalid(&mut self, reason: &str) {
            self.events.push(format!("invalid {reason}"));
        }
    }

    fn small_document() -> FixtureBuilder {
        let mut builder = FixtureBuilder::utf8();
        builder.start_namespace("android", crate::android::binary_xml::ANDROID_NAMESPACE_URI);
        builder.start_element("manifest", &[FixtureAttr::string("package", "com.example")]);
        builder.cdata("hello");
        builder.start_element("application", &[]);
        builder.end_element("application");
        builder.end_element("manifest");
        builder.end_namespace("android", crate::android::binary_xml::ANDROID_NAMESPACE_URI);
        builder
    }

    #[test]
    fn visits_elements_in_document_order() {
        let doc = small_document().build();
        let mut recorder = Recorder::default();
        traverse(&doc, &mut recorder).expect("traverse");
        assert_eq!(
            recorder.events,
            vec![
                "start manifest",
                "cdata hello",
                "start application",
                "end application",
                "end manifest"
            ]
        );
    }

    #[test]
    fn unknown_chunks_are_skipped_header_only() {
        let mut builder = FixtureBuilder::utf8();
        builder.start_element("manifest", &[]);
        // An unknown chunk consisting of nothing but its 8 byte header.
        builder.raw_chunk(0x0200, &[]);
        builder.end_element("manifest");
        let doc = builder.build();
        let mut recorder = Recorder::default();
        traverse(&doc, &mut recorder).expect("traverse");
        assert_eq!(recorder.events, vec!["start manifest", "end manifest"]);
    }

    #[test]
    fn document_without_namespaces_ends_at_buffer_end() {
        let mut builder = FixtureBuilder::utf16();
        builder.start_element("manifest", &[]);
        builder.end_element("manifest");
        let mut recorder = Recorder::default();
        traverse(&builder.build(), &mut recorder).expect("traverse");
        assert_eq!(recorder.events, vec!["start manifest", "end manifest"]);
    }

    #[test]
    fn truncated_document_delivers_one_invalid_element() {
        let doc = small_document().build();
        let truncated = &doc[..doc.len() - 30];
        let mut recorder = Recorder::default();
        let err = traverse(truncated, &mut recorder).unwrap_err();
        assert!(matches!(err, BinaryXmlError::InvalidDocument(_)));
        let invalid: Vec<_> = recorder
            .events
            .iter()
            .filter(|event| event.starts_with("invalid"))
            .collect();
        assert_eq!(invalid.len(), 1);
        assert!(recorder.events.last().unwrap().starts_with("invalid"));
    }

    #[test]
    fn bad_magic_is_invalid_before_any_element() {
        let mut doc = small_document().build();
        doc[0] = 0;
        let mut recorder = Recorder::default();
        assert!(traverse(&doc, &mut recorder).is_err());
        assert_eq!(recorder.events.len(), 1);
        assert!(recorder.events[0].starts_with("invalid"));
    }

    #[test]
    fn oversized_pool_chunk_is_invalid() {
        let mut doc = small_document().build();
        let len = doc.len() as u32;
        doc[12..16].copy_from_slice(&len.to_le_bytes());
        let mut recorder = Recorder::default();
        assert!(traverse(&doc, &mut recorder).is_err());
        assert_eq!(recorder.events.len(), 1);
    }
}
