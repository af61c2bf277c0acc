//! Minimal XML Element Tree
//!
//! RunSettings documents are small, so they are read fully into an owned
//! element tree, inspected or edited structurally, and written back with a
//! canonical indented formatter. Writing the same tree twice always yields
//! the same bytes.

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use fine_coverage_core::{CoreError, CoreResult};

/// A node inside an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
}

/// An owned XML element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder: add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Builder: add a child element.
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Builder: add a text node.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Parse a document and return its root element.
    ///
    /// The declaration, processing instructions, doctype, and anything outside
    /// the root element are discarded. Whitespace-only text is dropped.
    pub fn parse(text: &str) -> CoreResult<XmlElement> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    return Err(CoreError::parse(format!(
                        "Invalid XML at position {}: {}",
                        reader.error_position(),
                        e
                    )))
                }
            };
            match event {
                Event::Start(ref e) => {
                    stack.push(element_from_start(e)?);
                }
                Event::Empty(ref e) => {
                    let element = element_from_start(e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| CoreError::parse("Unbalanced end tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(ref e) => {
                    let text = e
                        .unescape()
                        .map_err(|e| CoreError::parse(format!("Invalid text content: {}", e)))?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Text(text.into_owned()));
                    }
                }
                Event::CData(ref e) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(XmlNode::CData(String::from_utf8_lossy(e).into_owned()));
                    }
                }
                Event::Comment(ref e) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(XmlNode::Comment(String::from_utf8_lossy(e).into_owned()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(CoreError::parse(format!(
                "Unclosed element <{}>",
                stack.last().map(|e| e.name.as_str()).unwrap_or_default()
            )));
        }
        root.ok_or_else(|| CoreError::parse("Document has no root element"))
    }

    /// Write the element as a canonical document with an XML declaration and
    /// two-space indentation.
    pub fn to_document_string(&self) -> CoreResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(write_error)?;
        write_element(&mut writer, self)?;
        String::from_utf8(writer.into_inner())
            .map_err(|e| CoreError::internal(format!("XML output is not UTF-8: {}", e)))
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|e| e.name == name)
    }

    /// Follow a chain of child element names.
    pub fn descendant(&self, path: &[&str]) -> Option<&XmlElement> {
        path.iter().try_fold(self, |current, name| current.child(name))
    }

    /// Return the named child, appending an empty one when absent.
    pub fn get_or_create_child(&mut self, name: &str) -> &mut XmlElement {
        let index = match self
            .children
            .iter()
            .position(|c| matches!(c, XmlNode::Element(e) if e.name == name))
        {
            Some(index) => index,
            None => {
                self.children.push(XmlNode::Element(XmlElement::new(name)));
                self.children.len() - 1
            }
        };
        match &mut self.children[index] {
            XmlNode::Element(e) => e,
            _ => unreachable!("index points at an element"),
        }
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    /// Concatenated text and CDATA content of this element.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) | XmlNode::CData(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![XmlNode::Text(text.into())];
    }
}

fn element_from_start(start: &BytesStart<'_>) -> CoreResult<XmlElement> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| CoreError::parse(format!("Invalid attribute: {}", e)))?;
        let value = attr
            .unescape_value()
            .map_err(|e| CoreError::parse(format!("Invalid attribute value: {}", e)))?;
        element.attributes.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            value.into_owned(),
        ));
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) -> CoreResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None => {
            if root.is_some() {
                return Err(CoreError::parse("Document has more than one root element"));
            }
            *root = Some(element);
        }
    }
    Ok(())
}

fn write_error(e: impl std::fmt::Display) -> CoreError {
    CoreError::internal(format!("Failed to write XML: {}", e))
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> CoreResult<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(write_error);
    }

    writer.write_event(Event::Start(start)).map_err(write_error)?;
    for child in &element.children {
        match child {
            XmlNode::Element(e) => write_element(writer, e)?,
            XmlNode::Text(t) => writer.write_event(Event::Text(BytesText::new(t))).map_err(write_error)?,
            XmlNode::CData(t) => writer.write_event(Event::CData(BytesCData::new(t.as_str()))).map_err(write_error)?,
            XmlNode::Comment(t) => writer
                .write_event(Event::Comment(BytesText::from_escaped(t.as_str())))
                .map_err(write_error)?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(write_error)
}

/// Parse and rewrite a document in canonical form.
pub fn canonicalize(text: &str) -> CoreResult<String> {
    XmlElement::parse(text)?.to_document_string()
}

/// Escape a value for use as element text or an attribute value.
pub fn escape(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}
