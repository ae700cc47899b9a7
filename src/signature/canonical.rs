//! Order-preserving XML tree and its canonical serialization.
//!
//! The canonical form is what gets signed, so it must be a pure function of the logical
//! document: authored element order, no whitespace between tags, empty elements written as
//! open/close pairs and text runs collapsed to single spaces.

use crate::error::{GatewayError, Result};
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// Collapses every whitespace run to one space and trims both ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// An element whose only content is `value`.
    pub fn leaf(name: impl Into<String>, value: impl Display) -> Self {
        let mut element = Self::new(name);
        let text = value.to_string();
        if !text.is_empty() {
            element.children.push(XmlNode::Text(text));
        }
        element
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn with(mut self, child: XmlElement) -> Self {
        self.push(child);
        self
    }

    pub fn with_text(self, name: &str, value: impl Display) -> Self {
        self.with(Self::leaf(name, value))
    }

    /// Appends the leaf only when `value` is present.
    pub fn with_optional<T: Display>(self, name: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.with_text(name, v),
            None => self,
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    /// Direct text content, whitespace-normalized.
    pub fn text(&self) -> String {
        let joined = self
            .children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect::<Vec<_>>()
            .join(" ");
        normalize_text(&joined)
    }

    /// Text of the named child; `None` when the child is absent or empty.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(XmlElement::text)
            .filter(|t| !t.is_empty())
    }

    pub fn to_canonical(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.to_canonical().into_bytes()
    }

    fn write_canonical(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(normalize_text(value).as_str()));
            out.push('"');
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlNode::Element(e) => e.write_canonical(out),
                XmlNode::Text(t) => {
                    let text = normalize_text(t);
                    out.push_str(&partial_escape(text.as_str()));
                }
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let mut element = Self::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
        for attr in start.attributes() {
            let attr = attr.map_err(|e| GatewayError::Malformed(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    fn push_text(&mut self, text: &str) {
        let text = normalize_text(text);
        if text.is_empty() {
            return;
        }
        if let Some(XmlNode::Text(previous)) = self.children.last_mut() {
            previous.push(' ');
            previous.push_str(&text);
        } else {
            self.children.push(XmlNode::Text(text));
        }
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.push(element);
        Ok(())
    } else if root.is_some() {
        Err(GatewayError::Malformed("multiple root elements".into()))
    } else {
        *root = Some(element);
        Ok(())
    }
}

/// Parses a document into a tree, dropping declarations, comments and inter-tag whitespace.
pub fn parse(xml: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(XmlElement::from_start(&start)?),
            Event::Empty(start) => {
                let element = XmlElement::from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| GatewayError::Malformed("unbalanced closing tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                match stack.last_mut() {
                    Some(parent) => parent.push_text(&text),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(GatewayError::Malformed(
                            "text outside the root element".into(),
                        ));
                    }
                }
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.push_text(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(GatewayError::Malformed("unclosed element".into()));
    }
    root.ok_or_else(|| GatewayError::Malformed("empty document".into()))
}

/// Parses `xml` and returns its canonical serialization.
pub fn canonicalize(xml: &str) -> Result<String> {
    Ok(parse(xml)?.to_canonical())
}
