//! Minimal owned XML tree for per-item normalisation.
//!
//! Source documents are first cut into one fragment per item with
//! [`split_elements`]; each fragment is then parsed on its own with
//! [`parse_fragment`], so a malformed item cannot spoil its neighbours.
//! Element and attribute names are matched on their local part, ignoring
//! namespace prefixes.

use quick_xml::events::Event;
use quick_xml::Reader;

use super::NormaliseError;

#[derive(Debug, Clone, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub content: Vec<XmlContent>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlContent {
    Text(String),
    Element(XmlNode),
}

fn xml_err(e: impl std::fmt::Display) -> NormaliseError {
    NormaliseError::Xml(e.to_string())
}

fn local(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn start_node(e: &quick_xml::events::BytesStart<'_>) -> Result<XmlNode, NormaliseError> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        attrs.push((local(attr.key.local_name().as_ref()), value));
    }
    Ok(XmlNode {
        name: local(e.local_name().as_ref()),
        attrs,
        content: Vec::new(),
    })
}

/// Parse one element (and its subtree) into an [`XmlNode`].
pub fn parse_fragment(xml: &str) -> Result<XmlNode, NormaliseError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlNode> = Vec::new();

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => stack.push(start_node(&e)?),
            Event::Empty(e) => {
                let node = start_node(&e)?;
                match stack.last_mut() {
                    Some(parent) => parent.content.push(XmlContent::Element(node)),
                    None => return Ok(node),
                }
            }
            Event::Text(e) => {
                if let Some(parent) = stack.last_mut() {
                    let text = e.unescape().map_err(xml_err)?.into_owned();
                    parent.content.push(XmlContent::Text(text));
                }
            }
            Event::CData(e) => {
                if let Some(parent) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    parent.content.push(XmlContent::Text(text));
                }
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| NormaliseError::Xml("unbalanced end tag".into()))?;
                match stack.last_mut() {
                    Some(parent) => parent.content.push(XmlContent::Element(node)),
                    None => return Ok(node),
                }
            }
            Event::Eof => {
                return Err(NormaliseError::Xml(if stack.is_empty() {
                    "no element found".into()
                } else {
                    "unexpected end of document".into()
                }));
            }
            _ => {}
        }
    }
}

/// Cut `doc` into one raw fragment per `tag` element (local name).
///
/// Only `tag` itself is tracked for nesting, and end-tag names are not
/// checked here: a mismatched close tag inside one item stays inside that
/// item's fragment, and [`parse_fragment`] rejects it on its own. Nested
/// occurrences of `tag` stay inside their outer fragment.
pub fn split_elements(doc: &str, tag: &str) -> Result<Vec<String>, NormaliseError> {
    let mut reader = Reader::from_str(doc);
    reader.config_mut().check_end_names = false;

    let mut fragments = Vec::new();
    // (byte offset of the item's `<`, nesting depth of `tag`)
    let mut open: Option<(usize, usize)> = None;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) if e.local_name().as_ref() == tag.as_bytes() => {
                open = match open {
                    Some((start, depth)) => Some((start, depth + 1)),
                    None => {
                        let end = reader.buffer_position() as usize;
                        Some((end - e.len() - 2, 1))
                    }
                };
            }
            Event::End(e) if e.local_name().as_ref() == tag.as_bytes() => {
                if let Some((start, depth)) = open {
                    open = if depth > 1 {
                        Some((start, depth - 1))
                    } else {
                        let end = reader.buffer_position() as usize;
                        fragments.push(doc[start..end].to_string());
                        None
                    };
                }
            }
            Event::Empty(e) if open.is_none() && e.local_name().as_ref() == tag.as_bytes() => {
                let end = reader.buffer_position() as usize;
                fragments.push(doc[end - e.len() - 3..end].to_string());
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(fragments)
}

impl XmlNode {
    /// First direct child element named `name`.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.content.iter().find_map(|c| match c {
            XmlContent::Element(node) if node.name == name => Some(node),
            _ => None,
        })
    }

    /// Direct child elements named `name`, in document order.
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.content.iter().filter_map(move |c| match c {
            XmlContent::Element(node) if node.name == name => Some(node),
            _ => None,
        })
    }

    /// Follow a path of direct children.
    pub fn find(&self, path: &[&str]) -> Option<&XmlNode> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Every descendant element named `name`, depth first.
    pub fn descendants(&self, name: &str) -> Vec<&XmlNode> {
        let mut out = Vec::new();
        self.collect_descendants(name, &mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlNode>) {
        for c in &self.content {
            if let XmlContent::Element(node) = c {
                if node.name == name {
                    out.push(node);
                }
                node.collect_descendants(name, out);
            }
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All descendant text, whitespace-collapsed.
    pub fn text(&self) -> String {
        let mut raw = String::new();
        self.push_text(&mut raw);
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn push_text(&self, out: &mut String) {
        for c in &self.content {
            match c {
                XmlContent::Text(t) => out.push_str(t),
                XmlContent::Element(node) => node.push_text(out),
            }
        }
    }

    /// Text of the first child named `name`, if it exists.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(XmlNode::text)
    }
}
