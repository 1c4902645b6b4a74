//! Android binary XML (`AXML`) decoding and patching.
//!
//! A compiled `AndroidManifest.xml` is a flat stream of chunks:
//!
//! ```text
//! [file header + string pool header]   36 bytes
//! [string offsets]                      4 * string count
//! [strings]
//! [resource map, namespace, element and cdata chunks]
//! ```
//!
//! Read-only operations walk the chunk stream once with [`traverse`] and feed
//! every decoded [`XmlElement`] to a [`BinaryXmlVisitor`]. Mutation decodes
//! the whole document into a [`BinaryXmlDocument`], edits it and re-encodes
//! every chunk, so no offset is ever patched in place.

mod document;
mod element;
mod reader;
mod traverse;
mod values;
mod visitor;
mod writer;

pub use document::BinaryXmlDocument;
pub use element::{Attributes, EndTag, StartTag, XmlElement};
pub use reader::{read_header, BinaryXmlHeader, StringPool, StringPoolFlags};
pub use traverse::traverse;
pub use values::{render_value, ManifestValue, TypedValue, ValueType};
pub use visitor::{
    AttributesCollector, AttributesSetterVisitor, BinaryXmlVisitor, ElementFinder, RenderOptions,
    StringXmlVisitor, TagStack,
};

pub(crate) const RES_XML_TYPE: u16 = 0x0003;
pub(crate) const RES_STRING_POOL_TYPE: u16 = 0x0001;
pub(crate) const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;
pub(crate) const RES_XML_START_NAMESPACE_TYPE: u16 = 0x0100;
pub(crate) const RES_XML_END_NAMESPACE_TYPE: u16 = 0x0101;
pub(crate) const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
pub(crate) const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
pub(crate) const RES_XML_CDATA_TYPE: u16 = 0x0104;

/// `RES_XML_TYPE` with an 8 byte header, read as one little-endian word.
pub(crate) const XML_IDENTIFIER: u32 = 0x0008_0003;
/// Attribute start and attribute size (both 20) of a start element chunk.
pub(crate) const XML_ATTRS_MARKER: u32 = 0x0014_0014;

pub(crate) const NO_ENTRY_INDEX: u32 = 0xFFFF_FFFF;

pub const ANDROID_NAMESPACE_URI: &str = "http://schemas.android.com/apk/res/android";
pub const MANIFEST_TAG: &str = "manifest";
pub const APPLICATION_TAG: &str = "application";

/// Result alias for binary XML operations.
pub type BinaryXmlResult<T> = Result<T, BinaryXmlError>;

/// Errors surfaced by the binary XML helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryXmlError {
    /// The buffer is not a readable binary XML document: bad magic, missing string
    /// table, truncated chunk or an unresolved string index.
    InvalidDocument(String),
    /// The document is readable but does not contain the addressed element.
    MalformedManifest(String),
}

impl BinaryXmlError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        BinaryXmlError::InvalidDocument(msg.into())
    }

    pub(crate) fn truncated(what: &str, offset: usize) -> Self {
        BinaryXmlError::InvalidDocument(format!(
            "Unexpected end of binary XML reading {what} at offset {offset}"
        ))
    }
}

impl std::fmt::Display for BinaryXmlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryXmlError::InvalidDocument(msg) => write!(f, "Invalid binary XML: {msg}"),
            BinaryXmlError::MalformedManifest(msg) => write!(f, "Malformed manifest: {msg}"),
        }
    }
}

impl std::error::Error for BinaryXmlError {}

/// Renders the whole document as indented XML text.
pub fn render_as_xml_text(data: &[u8]) -> BinaryXmlResult<String> {
    render_with_options(data, RenderOptions::default())
}

/// Renders the whole document using custom [`RenderOptions`].
pub fn render_with_options(data: &[u8], options: RenderOptions) -> BinaryXmlResult<String> {
    let mut visitor = StringXmlVisitor::with_options(options);
    traverse(data, &mut visitor)?;
    Ok(visitor.into_string())
}

/// Returns `true` when a start tag named `tag` appears anywhere in the document.
pub fn has_element(data: &[u8], tag: &str) -> BinaryXmlResult<bool> {
    let mut finder = ElementFinder::new(&[tag]);
    traverse(data, &mut finder)?;
    Ok(finder.found())
}

/// A manifest is considered valid when it declares an `<application>` element.
pub fn is_valid_manifest(data: &[u8]) -> BinaryXmlResult<bool> {
    has_element(data, APPLICATION_TAG)
}

/// Collects the decoded attributes of the first element matching `path`.
///
/// `path` is matched against the innermost open tags, so `["application"]`
/// finds `<application>` at any depth and `["manifest", "application"]` only
/// the one directly below `<manifest>`.
pub fn get_element_attributes<S: AsRef<str>>(
    data: &[u8],
    path: &[S],
) -> BinaryXmlResult<Attributes> {
    let mut collector = AttributesCollector::new(path);
    traverse(data, &mut collector)?;
    collector
        .into_attributes()
        .ok_or_else(|| BinaryXmlError::MalformedManifest(format!("no element at {}", join_path(path))))
}

/// Sets `name` to `value` on every element matching `path` and returns the
/// re-encoded document. The input buffer is never modified.
pub fn set_attribute<S: AsRef<str>>(
    data: &[u8],
    path: &[S],
    name: &str,
    value: &str,
) -> BinaryXmlResult<Vec<u8>> {
    document::set_element_attribute(data, path, name, value)
}

pub(crate) fn join_path<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|segment| segment.as_ref())
        .collect::<Vec<_>>()
        .join("/")
}
