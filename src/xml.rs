//! Generic XML document tree.
//!
//! Description documents, SOAP responses and command-protocol bodies are all
//! parsed into a [`Tree`]: elements holding only text become scalars,
//! attributes are stored under `@name`, and repeated sibling elements collapse
//! into an array in document order.

use crate::error::{FritzError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

const ATTRIBUTE_PREFIX: &str = "@";
const TEXT_KEY: &str = "#text";

/// A parsed XML value.
#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
    /// Text content of a leaf element
    Scalar(String),
    /// Repeated sibling elements sharing one name
    Array(Vec<Tree>),
    /// Element with attributes or child elements, keys in document order
    Object(Vec<(String, Tree)>),
}

impl Tree {
    /// Parse an XML document. The returned object has the root element as its
    /// only entry.
    pub fn parse(input: &str) -> Result<Tree> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        // Frame 0 is the document itself
        let mut stack: Vec<Frame> = vec![Frame::new(String::new())];

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(Frame::open(&e)?),
                Event::Empty(e) => {
                    let frame = Frame::open(&e)?;
                    let (name, node) = frame.close();
                    current(&mut stack)?.insert(name, node);
                }
                Event::End(_) => {
                    if stack.len() < 2 {
                        return Err(FritzError::Protocol("unbalanced end tag".to_string()));
                    }
                    if let Some(frame) = stack.pop() {
                        let (name, node) = frame.close();
                        current(&mut stack)?.insert(name, node);
                    }
                }
                Event::Text(t) => {
                    let text = t.unescape()?;
                    current(&mut stack)?.text.push_str(&text);
                }
                Event::CData(c) => {
                    let raw = c.into_inner();
                    current(&mut stack)?
                        .text
                        .push_str(&String::from_utf8_lossy(&raw));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if stack.len() != 1 {
            return Err(FritzError::Protocol("unexpected end of document".to_string()));
        }
        let document = stack.pop().map(|f| f.entries).unwrap_or_default();
        if document.is_empty() {
            return Err(FritzError::Protocol("empty document".to_string()));
        }
        Ok(Tree::Object(document))
    }

    /// Returns the value of a direct child key.
    pub fn get(&self, key: &str) -> Option<&Tree> {
        match self {
            Tree::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Follows a chain of child keys.
    pub fn path(&self, keys: &[&str]) -> Option<&Tree> {
        keys.iter().try_fold(self, |node, key| node.get(key))
    }

    /// Returns the value of an attribute stored under `@name`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.get(&format!("{}{}", ATTRIBUTE_PREFIX, name))
            .and_then(Tree::as_str)
    }

    /// Returns the text of a scalar, or the text part of a mixed element.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tree::Scalar(s) => Some(s.as_str()),
            Tree::Object(_) => self.get(TEXT_KEY).and_then(Tree::as_str),
            Tree::Array(_) => None,
        }
    }

    /// Views a value as a list: arrays yield their items, anything else
    /// yields itself. Lists with a single element parse as plain values, so
    /// callers iterating over list elements use this.
    pub fn as_list(&self) -> &[Tree] {
        match self {
            Tree::Array(items) => items,
            other => std::slice::from_ref(other),
        }
    }

    /// Depth-first, left-to-right search for the first entry named `key`.
    ///
    /// Order is tree order: repeated siblings were merged into one array at
    /// the position of the first of them, so a later sibling can be searched
    /// before elements that precede it in the document.
    pub fn find(&self, key: &str) -> Option<&Tree> {
        match self {
            Tree::Scalar(_) => None,
            Tree::Array(items) => items.iter().find_map(|item| item.find(key)),
            Tree::Object(entries) => entries.iter().find_map(|(k, v)| {
                if k == key { Some(v) } else { v.find(key) }
            }),
        }
    }
}

/// Returns true if the text looks like an embedded XML fragment such as
/// `<List><Item>..</Item></List>`.
pub(crate) fn looks_like_document(text: &str) -> bool {
    let text = text.trim();
    text.len() > 2 && text.starts_with('<') && text.ends_with('>')
}

fn current(stack: &mut [Frame]) -> Result<&mut Frame> {
    stack
        .last_mut()
        .ok_or_else(|| FritzError::Protocol("unbalanced document".to_string()))
}

/// An element being assembled while its children are read.
struct Frame {
    name: String,
    entries: Vec<(String, Tree)>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            entries: Vec::new(),
            text: String::new(),
        }
    }

    fn open(start: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut frame = Frame::new(name);
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref());
            let value = attr.unescape_value()?;
            frame.entries.push((
                format!("{}{}", ATTRIBUTE_PREFIX, key),
                Tree::Scalar(value.into_owned()),
            ));
        }
        Ok(frame)
    }

    fn insert(&mut self, name: String, node: Tree) {
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, Tree::Array(items))) => items.push(node),
            Some((_, existing)) => {
                let first = std::mem::replace(existing, Tree::Array(Vec::new()));
                *existing = Tree::Array(vec![first, node]);
            }
            None => self.entries.push((name, node)),
        }
    }

    fn close(self) -> (String, Tree) {
        if self.entries.is_empty() {
            return (self.name, Tree::Scalar(self.text));
        }
        let mut entries = self.entries;
        if !self.text.is_empty() {
            entries.push((TEXT_KEY.to_string(), Tree::Scalar(self.text)));
        }
        (self.name, Tree::Object(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_and_repeated() {
        let doc = r#"<?xml version="1.0"?>
            <root xmlns="urn:dslforum-org:device-1-0">
                <device>
                    <friendlyName>FRITZ!Box 7590</friendlyName>
                    <serviceList>
                        <service><serviceType>a</serviceType></service>
                        <service><serviceType>b</serviceType></service>
                    </serviceList>
                </device>
            </root>"#;
        let tree = Tree::parse(doc).unwrap();
        let root = tree.get("root").unwrap();
        assert_eq!(root.attr("xmlns"), Some("urn:dslforum-org:device-1-0"));
        assert_eq!(
            root.path(&["device", "friendlyName"]).and_then(Tree::as_str),
            Some("FRITZ!Box 7590")
        );
        let services = root.path(&["device", "serviceList", "service"]).unwrap();
        assert_eq!(services.as_list().len(), 2);
        assert_eq!(
            services.as_list()[1].get("serviceType").and_then(Tree::as_str),
            Some("b")
        );
    }

    #[test]
    fn test_single_element_list() {
        let tree = Tree::parse("<a><item>1</item></a>").unwrap();
        let item = tree.path(&["a", "item"]).unwrap();
        assert_eq!(item.as_list().len(), 1);
        assert_eq!(item.as_list()[0].as_str(), Some("1"));
    }

    #[test]
    fn test_attributes_and_empty_elements() {
        let tree =
            Tree::parse(r#"<colordefaults><hs hue_index="1"><color sat="100" hue="35" val="255"/></hs></colordefaults>"#)
                .unwrap();
        let hs = tree.path(&["colordefaults", "hs"]).unwrap();
        assert_eq!(hs.attr("hue_index"), Some("1"));
        let color = hs.get("color").unwrap();
        assert_eq!(color.attr("hue"), Some("35"));
        assert_eq!(color.attr("val"), Some("255"));

        let empty = Tree::parse("<Rights/>").unwrap();
        assert_eq!(empty.get("Rights"), Some(&Tree::Scalar(String::new())));
    }

    #[test]
    fn test_escaped_text_is_unescaped() {
        let tree = Tree::parse("<r><v>&lt;List&gt;&lt;/List&gt;</v></r>").unwrap();
        let v = tree.path(&["r", "v"]).and_then(Tree::as_str).unwrap();
        assert_eq!(v, "<List></List>");
        assert!(looks_like_document(v));
        assert!(!looks_like_document("plain"));
    }

    #[test]
    fn test_find_is_depth_first_left_to_right() {
        let tree = Tree::parse(
            "<r><a><x>1</x><target>deep-left</target></a><b><target>right</target></b><target>top</target></r>",
        )
        .unwrap();
        assert_eq!(tree.find("target").and_then(Tree::as_str), Some("deep-left"));
    }

    #[test]
    fn test_find_continues_past_branches_without_match() {
        let tree = Tree::parse("<r><a><x>1</x></a><b><y>2</y></b></r>").unwrap();
        assert_eq!(tree.find("y").and_then(Tree::as_str), Some("2"));
        assert!(tree.find("z").is_none());
    }

    #[test]
    fn test_find_descends_into_arrays() {
        let tree = Tree::parse("<r><i><n>1</n></i><i><m>2</m></i></r>").unwrap();
        assert_eq!(tree.find("m").and_then(Tree::as_str), Some("2"));
    }

    #[test]
    fn test_find_follows_merged_sibling_order() {
        let tree = Tree::parse("<r><a><z/></a><b><t>B</t></b><a><t>A</t></a></r>").unwrap();
        assert_eq!(tree.find("t").and_then(Tree::as_str), Some("A"));
        assert_eq!(tree.path(&["b", "t"]).and_then(Tree::as_str), Some("B"));
    }

    #[test]
    fn test_malformed_document() {
        assert!(Tree::parse("").is_err());
        assert!(Tree::parse("<a><b></a>").is_err());
    }
}
