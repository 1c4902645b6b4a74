use super::document::BinaryXmlDocument;
use super::element::{Attributes, EndTag, StartTag};
use super::BinaryXmlResult;
use log::{info, warn};
use quick_xml::escape::escape;
use std::ops::ControlFlow;

/// Receives decoded elements in document order.
///
/// Returning [`ControlFlow::Break`] stops the traversal early.
pub trait BinaryXmlVisitor {
    fn visit_start(&mut self, element: &StartTag) -> ControlFlow<()>;

    fn visit_end(&mut self, element: &EndTag) -> ControlFlow<()>;

    /// Character data is not part of the rendered tree.
    fn visit_cdata(&mut self, _text: &str) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn visit_invalid(&mut self, reason: &str);
}

/// Names of the currently open tags, outermost first.
#[derive(Clone, Debug, Default)]
pub struct TagStack {
    open: Vec<String>,
}

impl TagStack {
    pub fn push(&mut self, name: &str) {
        self.open.push(name.to_string());
    }

    pub fn pop(&mut self) {
        self.open.pop();
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// A path matches when it equals the innermost `path.len()` open tags.
    pub fn matches<S: AsRef<str>>(&self, path: &[S]) -> bool {
        if path.is_empty() || path.len() > self.open.len() {
            return false;
        }
        let tail = &self.open[self.open.len() - path.len()..];
        tail.iter().zip(path).all(|(open, want)| open == want.as_ref())
    }
}

fn owned_path<S: AsRef<str>>(path: &[S]) -> Vec<String> {
    path.iter().map(|segment| segment.as_ref().to_string()).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderOptions {
    /// Spaces per nesting level.
    pub indent: usize,
    pub xml_declaration: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            indent: 2,
            xml_declaration: true,
        }
    }
}

/// Rebuilds indented XML text; every start tag gets an explicit close tag.
#[derive(Debug)]
pub struct StringXmlVisitor {
    xml: String,
    depth: usize,
    options: RenderOptions,
}

impl StringXmlVisitor {
    pub fn new() -> Self {
        Self::with_options(RenderOptions::default())
    }

    pub fn with_options(options: RenderOptions) -> Self {
        let mut xml = String::new();
        if options.xml_declaration {
            xml.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        }
        StringXmlVisitor {
            xml,
            depth: 0,
            options,
        }
    }

    pub fn into_string(self) -> String {
        self.xml
    }

    fn indent(&mut self) {
        let width = self.depth * self.options.indent;
        self.xml.extend(std::iter::repeat(' ').take(width));
    }
}

impl Default for StringXmlVisitor {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryXmlVisitor for StringXmlVisitor {
    fn visit_start(&mut self, element: &StartTag) -> ControlFlow<()> {
        self.indent();
        self.xml.push('<');
        self.xml.push_str(&element.name);
        for (name, value) in &element.attributes {
            self.xml.push(' ');
            self.xml.push_str(name);
            self.xml.push_str("=\"");
            self.xml.push_str(&escape(value.as_str()));
            self.xml.push('"');
        }
        self.xml.push_str(">\n");
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn visit_end(&mut self, element: &EndTag) -> ControlFlow<()> {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.xml.push_str("</");
        self.xml.push_str(&element.name);
        self.xml.push_str(">\n");
        ControlFlow::Continue(())
    }

    fn visit_invalid(&mut self, reason: &str) {
        warn!("rendering stopped: {reason}");
    }
}

/// Existence probe for a tag path.
#[derive(Debug)]
pub struct ElementFinder {
    path: Vec<String>,
    stack: TagStack,
    found: bool,
}

impl ElementFinder {
    pub fn new<S: AsRef<str>>(path: &[S]) -> Self {
        ElementFinder {
            path: owned_path(path),
            stack: TagStack::default(),
            found: false,
        }
    }

    pub fn found(&self) -> bool {
        self.found
    }
}

impl BinaryXmlVisitor for ElementFinder {
    fn visit_start(&mut self, element: &StartTag) -> ControlFlow<()> {
        self.stack.push(&element.name);
        if self.stack.matches(&self.path) {
            self.found = true;
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    fn visit_end(&mut self, _element: &EndTag) -> ControlFlow<()> {
        self.stack.pop();
        ControlFlow::Continue(())
    }

    fn visit_invalid(&mut self, _reason: &str) {
        self.found = false;
    }
}

/// Captures the attributes of the first element matching a tag path.
#[derive(Debug)]
pub struct AttributesCollector {
    path: Vec<String>,
    stack: TagStack,
    attributes: Option<Attributes>,
}

impl AttributesCollector {
    pub fn new<S: AsRef<str>>(path: &[S]) -> Self {
        AttributesCollector {
            path: owned_path(path),
            stack: TagStack::default(),
            attributes: None,
        }
    }

    /// `None` when no element matched.
    pub fn into_attributes(self) -> Option<Attributes> {
        self.attributes
    }
}

impl BinaryXmlVisitor for AttributesCollector {
    fn visit_start(&mut self, element: &StartTag) -> ControlFlow<()> {
        self.stack.push(&element.name);
        if self.stack.matches(&self.path) {
            self.attributes = Some(element.attributes.clone());
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    fn visit_end(&mut self, _element: &EndTag) -> ControlFlow<()> {
        self.stack.pop();
        ControlFlow::Continue(())
    }

    fn visit_invalid(&mut self, _reason: &str) {
        self.attributes = None;
    }
}

/// Records which start elements match a tag path so the attribute can be set
/// on the decoded [`BinaryXmlDocument`] afterwards.
#[derive(Debug)]
pub struct AttributesSetterVisitor {
    path: Vec<String>,
    name: String,
    value: String,
    stack: TagStack,
    ordinal: usize,
    targets: Vec<usize>,
}

impl AttributesSetterVisitor {
    pub fn new<S: AsRef<str>>(path: &[S], name: &str, value: &str) -> Self {
        AttributesSetterVisitor {
            path: owned_path(path),
            name: name.to_string(),
            value: value.to_string(),
            stack: TagStack::default(),
            ordinal: 0,
            targets: Vec::new(),
        }
    }

    /// Ordinals (in start-tag order) of the matched elements.
    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    /// Writes the attribute into every matched element of `document`.
    pub fn apply(&self, document: &mut BinaryXmlDocument) -> BinaryXmlResult<()> {
        for &ordinal in &self.targets {
            document.set_attribute(ordinal, &self.name, &self.value)?;
        }
        Ok(())
    }
}

impl BinaryXmlVisitor for AttributesSetterVisitor {
    fn visit_start(&mut self, element: &StartTag) -> ControlFlow<()> {
        self.stack.push(&element.name);
        if self.stack.matches(&self.path) {
            let local = local_name(&self.name);
            match element.attributes.get(local) {
                Some(current) => info!(
                    "setting [{}] on [{}]: [{current}] -> [{}]",
                    local, element.name, self.value
                ),
                None => info!("adding [{}=\"{}\"] to [{}]", local, self.value, element.name),
            }
            self.targets.push(self.ordinal);
        }
        self.ordinal += 1;
        ControlFlow::Continue(())
    }

    fn visit_end(&mut self, _element: &EndTag) -> ControlFlow<()> {
        self.stack.pop();
        ControlFlow::Continue(())
    }

    fn visit_invalid(&mut self, _reason: &str) {
        self.targets.clear();
    }
}

/// `android:debuggable` -> `debuggable`.
pub(crate) fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}
