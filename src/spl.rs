//! SPL (Structured Product Labeling) XML parsing.
//!
//! DailyMed serves drug labels as HL7 SPL documents. The only part the
//! pipeline cares about is the "Indications and Usage" section and its
//! immediate subsections; everything else in the document is ignored.
//! A document without the expected structure parses to an empty draft
//! list — only malformed XML is an error.

use std::sync::OnceLock;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use thiserror::Error;

use crate::models::ParsedIndication;

#[derive(Debug, Error)]
pub enum SplError {
    #[error("malformed SPL XML: {0}")]
    Xml(String),
}

/// One element in the parsed document tree. Sibling order is preserved
/// and tag names carry no namespace prefix.
#[derive(Debug)]
pub struct XmlNode {
    pub name: String,
    pub children: Vec<XmlChild>,
}

#[derive(Debug)]
pub enum XmlChild {
    Element(XmlNode),
    Text(String),
}

impl XmlNode {
    /// First element child with the given tag name.
    fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find_map(|c| match c {
            XmlChild::Element(n) if n.name == name => Some(n),
            _ => None,
        })
    }

    /// All element children with the given tag name, in document order.
    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter_map(move |c| match c {
            XmlChild::Element(n) if n.name == name => Some(n),
            _ => None,
        })
    }

    /// All text inside this node, inline markup flattened away. Pieces
    /// are joined by single spaces and runs of whitespace collapsed.
    fn text(&self) -> String {
        let mut pieces = Vec::new();
        self.collect_text(&mut pieces);
        collapse_whitespace(&pieces.join(" "))
    }

    fn collect_text(&self, out: &mut Vec<String>) {
        for child in &self.children {
            match child {
                XmlChild::Text(t) => out.push(t.clone()),
                XmlChild::Element(n) => n.collect_text(out),
            }
        }
    }

    /// Descendant elements with the given name, document order, without
    /// descending into a match (a paragraph inside a paragraph counts once).
    fn descendants_named<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlNode>) {
        for child in &self.children {
            if let XmlChild::Element(n) = child {
                if n.name == name {
                    out.push(n);
                } else {
                    n.descendants_named(name, out);
                }
            }
        }
    }
}

/// Parse raw XML into an ordered tree. The returned node is a synthetic
/// root whose children are the document's top-level elements.
pub fn parse_tree(xml: &str) -> Result<XmlNode, SplError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = vec![XmlNode {
        name: String::new(),
        children: Vec::new(),
    }];

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                stack.push(XmlNode {
                    name: local_name(start.name().as_ref()),
                    children: Vec::new(),
                });
            }
            Ok(Event::Empty(start)) => {
                let node = XmlNode {
                    name: local_name(start.name().as_ref()),
                    children: Vec::new(),
                };
                push_child(&mut stack, XmlChild::Element(node));
            }
            Ok(Event::End(_)) => {
                // The reader checks tag balance itself; this guards the
                // synthetic root anyway.
                if stack.len() < 2 {
                    return Err(SplError::Xml("unbalanced closing tag".to_string()));
                }
                let node = stack.pop().expect("guarded above");
                push_child(&mut stack, XmlChild::Element(node));
            }
            Ok(Event::Text(text)) => {
                let value = text
                    .unescape()
                    .map_err(|e| SplError::Xml(e.to_string()))?
                    .into_owned();
                if !value.trim().is_empty() {
                    push_child(&mut stack, XmlChild::Text(value));
                }
            }
            Ok(Event::CData(data)) => {
                let value = String::from_utf8_lossy(&data).into_owned();
                if !value.trim().is_empty() {
                    push_child(&mut stack, XmlChild::Text(value));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {} // declarations, comments, PIs, doctypes
            Err(e) => return Err(SplError::Xml(e.to_string())),
        }
    }

    if stack.len() != 1 {
        return Err(SplError::Xml("unclosed element at end of input".to_string()));
    }
    Ok(stack.remove(0))
}

fn push_child(stack: &mut [XmlNode], child: XmlChild) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(child);
    }
}

/// Tag name with any `ns:` prefix removed.
fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

/// Extract indication drafts from a raw SPL document.
///
/// Walks `document → component → structuredBody`, finds the first section
/// whose title mentions "indication" (case-insensitive), and turns each of
/// its immediate child sections into one `(title, description)` draft.
pub fn extract_indications(xml: &str) -> Result<Vec<ParsedIndication>, SplError> {
    let root = parse_tree(xml)?;

    let body = match root
        .child("document")
        .and_then(|d| d.child("component"))
        .and_then(|c| c.child("structuredBody"))
    {
        Some(body) => body,
        None => return Ok(Vec::new()),
    };

    let indication_section = body
        .children_named("component")
        .filter_map(|c| c.child("section"))
        .find(|section| {
            section
                .child("title")
                .map(|t| t.text().to_lowercase().contains("indication"))
                .unwrap_or(false)
        });

    let indication_section = match indication_section {
        Some(section) => section,
        None => return Ok(Vec::new()),
    };

    let drafts = indication_section
        .children_named("component")
        .filter_map(|c| c.child("section"))
        .map(|section| {
            let raw_title = section.child("title").map(|t| t.text()).unwrap_or_default();
            let title = strip_outline_prefix(&raw_title).trim().to_string();
            let description = section
                .child("text")
                .map(paragraph_text)
                .unwrap_or_default();
            ParsedIndication { title, description }
        })
        .collect();

    Ok(drafts)
}

/// Concatenated text of every paragraph node anywhere under `text_node`,
/// in document order, whitespace-normalized.
fn paragraph_text(text_node: &XmlNode) -> String {
    let mut paragraphs = Vec::new();
    text_node.descendants_named("paragraph", &mut paragraphs);
    let joined = paragraphs
        .iter()
        .map(|p| p.text())
        .collect::<Vec<_>>()
        .join(" ");
    collapse_whitespace(&joined)
}

/// Remove a leading numeric outline like `1.1 ` or `2.3.1 ` from a
/// section title. The digits must be followed by whitespace; a bare
/// number glued to a word is part of the title.
fn strip_outline_prefix(title: &str) -> &str {
    static OUTLINE: OnceLock<Regex> = OnceLock::new();
    let re = OUTLINE.get_or_init(|| Regex::new(r"^\d+(\.\d+)*\s+").expect("valid regex"));
    match re.find(title) {
        Some(m) => &title[m.end()..],
        None => title,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
