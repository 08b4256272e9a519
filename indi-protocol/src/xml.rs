//! Minimal element tree for one top-level INDI element.
use std::borrow::Cow;

use indexmap::IndexMap;
use quick_xml::{Reader, events::BytesStart, events::Event};

use crate::error::ParseError;

/// A node below an element.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),
    /// Character data, trimmed of surrounding whitespace.
    Text(String),
    /// Raw content of a CDATA section.
    Data(Vec<u8>),
}

impl Node {
    /// The text of this node: its own string for text nodes,
    /// the concatenated descendant text for elements.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Node::Element(element) => Cow::Owned(element.text()),
            Node::Text(text) => Cow::Borrowed(text),
            Node::Data(_) => Cow::Borrowed(""),
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Element {
    name: String,
    attributes: IndexMap<String, String>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Element {
        Element {
            name: name.into(),
            ..Element::default()
        }
    }

    /// Adds an attribute. A repeated name replaces the earlier value.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Element {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: Node) -> Element {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Concatenation of all descendant text nodes in document order.
    pub fn text(&self) -> String {
        let mut text = String::new();
        self.collect_text(&mut text);
        text
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Element(element) => element.collect_text(out),
                Node::Text(text) => out.push_str(text),
                Node::Data(_) => {}
            }
        }
    }

    /// Builds the tree of a single complete element.
    pub fn parse(xml: &str) -> Result<Element, ParseError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    if root.is_some() {
                        return Err(ParseError::MultipleRoots);
                    }
                    stack.push(Self::from_start(&start)?);
                }
                Event::Empty(start) => {
                    if root.is_some() {
                        return Err(ParseError::MultipleRoots);
                    }
                    let element = Self::from_start(&start)?;
                    Self::attach(&mut stack, &mut root, element);
                }
                Event::End(end) => {
                    let element = stack.pop().ok_or_else(|| {
                        ParseError::UnbalancedClose(
                            String::from_utf8_lossy(end.name().as_ref()).into_owned(),
                        )
                    })?;
                    Self::attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    let text = text.unescape()?;
                    let text = text.trim();
                    if let Some(parent) = stack.last_mut() {
                        if !text.is_empty() {
                            parent.children.push(Node::Text(text.to_string()));
                        }
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Data(data.into_inner().into_owned()));
                    }
                }
                Event::Eof => break,
                // declarations, comments and processing instructions carry no INDI content
                _ => {}
            }
        }

        if let Some(open) = stack.pop() {
            return Err(ParseError::Unclosed(open.name));
        }
        root.ok_or(ParseError::Empty)
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Element, ParseError> {
        let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
        for attribute in start.attributes() {
            let attribute = attribute?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            element.attributes.insert(key, value);
        }
        Ok(element)
    }

    fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(Node::Element(element)),
            None => *root = Some(element),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_attributes_and_children() {
        let element = Element::parse(
            r#"<defTextVector device="Mount" name="INFO" label="Info &amp; more">
                <defText name="A">  first  </defText>
                <defText name="B"/>
            </defTextVector>"#,
        )
        .unwrap();
        assert_eq!(element.name(), "defTextVector");
        assert_eq!(element.attr("device"), Some("Mount"));
        assert_eq!(element.attr("label"), Some("Info & more"));
        assert_eq!(element.attr("group"), None);

        let children: Vec<_> = element.child_elements().collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].attr("name"), Some("A"));
        assert_eq!(children[0].text(), "first");
        assert_eq!(children[1].text(), "");
    }

    #[test]
    fn text_concatenates_descendants() {
        let element = Element::parse("<a>one<b>two<c>three</c></b>four</a>").unwrap();
        assert_eq!(element.text(), "onetwothreefour");
        assert_eq!(element.children()[0].text(), "one");
    }

    #[test]
    fn cdata_becomes_data_node() {
        let element = Element::parse("<oneBLOB><![CDATA[\x01raw]]></oneBLOB>").unwrap();
        assert_eq!(element.children(), &[Node::Data(b"\x01raw".to_vec())]);
        assert_eq!(element.text(), "");
    }

    #[test]
    fn duplicate_attribute_keeps_last_value() {
        let element = Element::new("x")
            .with_attribute("name", "first")
            .with_attribute("name", "second");
        assert_eq!(element.attr("name"), Some("second"));
    }

    #[test]
    fn rejects_mismatched_and_unclosed() {
        assert!(Element::parse("<a><b></a></b>").is_err());
        assert!(Element::parse("<a><b></b>").is_err());
        assert!(matches!(Element::parse("   "), Err(ParseError::Empty)));
        assert!(matches!(
            Element::parse("<a/><b/>"),
            Err(ParseError::MultipleRoots)
        ));
    }
}
