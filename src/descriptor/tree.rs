//! In-memory element tree for domain descriptors.
//!
//! The tree is built in one pass over `quick_xml`'s namespace-resolving reader.
//! Element names are stored as local names plus the resolved namespace URI, so
//! lookups never depend on which prefix a document happened to bind.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use crate::descriptor::query::{Name, Query};
use crate::error::DescriptorError;

/// One XML element with its attributes, direct text and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    namespace: Option<String>,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    /// Local (unprefixed) element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved namespace URI, if the element is namespaced.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// Returns true if this element has the given (possibly namespaced) name.
    pub fn is(&self, name: Name<'_>) -> bool {
        self.name == name.local && self.namespace.as_deref() == name.namespace
    }

    /// Attribute value by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value by local name, or `default` when absent.
    pub fn attr_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.attr(name).unwrap_or(default)
    }

    /// Trimmed direct text content, `None` when the element carries no text.
    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Trimmed direct text content, empty string when there is none.
    pub fn text_or_empty(&self) -> &str {
        self.text.trim()
    }

    /// First direct child with the given name.
    pub fn child<'n>(&self, name: impl Into<Name<'n>>) -> Option<&Element> {
        let name = name.into();
        self.children.iter().find(|c| c.is(name))
    }

    /// First element matched by `query`, evaluated relative to this element.
    pub fn find(&self, query: &Query<'_>) -> Option<&Element> {
        query.first(self)
    }

    /// All elements matched by `query` in document order.
    pub fn find_all(&self, query: &Query<'_>) -> Vec<&Element> {
        query.all(self)
    }

    /// Depth-first walk over every descendant (excluding `self`).
    pub(crate) fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }
}

/// Pre-order iterator over descendants.
pub(crate) struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

/// Parses a well-formed XML document into its root element.
pub fn parse_element_tree(raw: &str) -> Result<Element, DescriptorError> {
    let mut reader = NsReader::from_str(raw);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_resolved_event()? {
            (ns, Event::Start(start)) => {
                let element = open_element(ns, &start)?;
                stack.push(element);
            }
            (ns, Event::Empty(start)) => {
                let element = open_element(ns, &start)?;
                attach(element, &mut stack, &mut root)?;
            }
            (_, Event::End(_)) => {
                let element = stack.pop().ok_or_else(|| {
                    DescriptorError::Malformed("closing tag without an open element".into())
                })?;
                attach(element, &mut stack, &mut root)?;
            }
            (_, Event::Text(text)) => {
                let text = text.unescape()?;
                push_text(&text, &mut stack)?;
            }
            (_, Event::CData(cdata)) => {
                let text = std::str::from_utf8(&cdata)
                    .map_err(|e| DescriptorError::Malformed(format!("invalid CDATA: {e}")))?;
                push_text(text, &mut stack)?;
            }
            (_, Event::Eof) => break,
            // Declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(DescriptorError::Malformed(format!(
            "unexpected end of document inside <{}>",
            open.name
        )));
    }

    root.ok_or_else(|| DescriptorError::Malformed("document has no root element".into()))
}

fn open_element(ns: ResolveResult<'_>, start: &BytesStart<'_>) -> Result<Element, DescriptorError> {
    let namespace = match ns {
        ResolveResult::Bound(ns) => Some(utf8(ns.0, "namespace")?.to_string()),
        ResolveResult::Unbound => None,
        ResolveResult::Unknown(prefix) => {
            return Err(DescriptorError::Malformed(format!(
                "unbound namespace prefix '{}'",
                String::from_utf8_lossy(&prefix)
            )))
        }
    };

    let name = utf8(start.local_name().as_ref(), "element name")?.to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let local = utf8(attr.key.local_name().as_ref(), "attribute name")?.to_string();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((local, value));
    }

    Ok(Element {
        name,
        namespace,
        attributes,
        text: String::new(),
        children: Vec::new(),
    })
}

fn attach(
    element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
) -> Result<(), DescriptorError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(DescriptorError::Malformed(format!(
                "second root element <{}>",
                element.name
            )))
        }
    }
    Ok(())
}

fn push_text(text: &str, stack: &mut [Element]) -> Result<(), DescriptorError> {
    match stack.last_mut() {
        Some(current) => current.text.push_str(text),
        None if text.trim().is_empty() => {}
        None => {
            return Err(DescriptorError::Malformed(
                "text content outside the root element".into(),
            ))
        }
    }
    Ok(())
}

fn utf8<'a>(bytes: &'a [u8], what: &str) -> Result<&'a str, DescriptorError> {
    std::str::from_utf8(bytes).map_err(|e| DescriptorError::Malformed(format!("invalid {what}: {e}")))
}
