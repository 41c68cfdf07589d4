//! Minimal attributed element tree for reading manifests, and a thin
//! indenting writer for producing them. Both sit on `quick-xml`.

use crate::error::{ErrorKind, MhlError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("document is not valid UTF-8")]
    Encoding,
    #[error("malformed XML at byte {position}: {source}")]
    Syntax {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
    #[error("{0}")]
    Structure(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Character content with surrounding whitespace removed.
    pub fn text(&self) -> &str {
        self.text.trim()
    }
}

fn syntax(reader: &Reader<&[u8]>, source: quick_xml::Error) -> XmlError {
    XmlError::Syntax { position: reader.buffer_position() as u64, source }
}

fn element_from(reader: &Reader<&[u8]>, start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let name = std::str::from_utf8(start.name().as_ref()).map_err(|_| XmlError::Encoding)?.to_owned();
    let mut el = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| syntax(reader, e.into()))?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(|_| XmlError::Encoding)?.to_owned();
        let value = attr.unescape_value().map_err(|e| syntax(reader, e))?.into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, el: XmlElement) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(el);
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlError::Structure("more than one root element".into()));
    }
    *root = Some(el);
    Ok(())
}

/// Parse a whole document into its root element.
pub fn parse_document(bytes: &[u8]) -> Result<XmlElement, XmlError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|_| XmlError::Encoding)?;
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    loop {
        let event = reader.read_event().map_err(|e| syntax(&reader, e))?;
        match event {
            Event::Start(e) => {
                let el = element_from(&reader, &e)?;
                stack.push(el);
            }
            Event::Empty(e) => {
                let el = element_from(&reader, &e)?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::End(_) => {
                let el = stack.pop().ok_or_else(|| XmlError::Structure("unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape().map_err(|e| syntax(&reader, e))?);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    let raw = c.into_inner();
                    top.text.push_str(std::str::from_utf8(&raw).map_err(|_| XmlError::Encoding)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(XmlError::Structure("unexpected end of document".into()));
    }
    root.ok_or_else(|| XmlError::Structure("document has no root element".into()))
}

/// Indenting writer; text is escaped on the way out.
pub struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlWriter {
    pub fn new() -> Self {
        Self { inner: Writer::new_with_indent(Vec::new(), b' ', 2) }
    }

    fn emit(&mut self, event: Event<'_>) -> Result<()> {
        self.inner
            .write_event(event)
            .map_err(|e| MhlError::new(ErrorKind::InternalError, format!("XML serialization failed: {e}")))
    }

    pub fn declaration(&mut self) -> Result<()> {
        self.emit(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    }

    pub fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let mut el = BytesStart::new(name);
        for &(k, v) in attributes {
            el.push_attribute((k, v));
        }
        self.emit(Event::Start(el))
    }

    pub fn end(&mut self, name: &str) -> Result<()> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    /// `<name>text</name>` on one line.
    pub fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.emit(Event::Start(BytesStart::new(name)))?;
        self.emit(Event::Text(BytesText::new(text)))?;
        self.emit(Event::End(BytesEnd::new(name)))
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = self.inner.into_inner();
        out.push(b'\n');
        out
    }
}
