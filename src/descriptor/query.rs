//! Typed path queries over the descriptor tree.
//!
//! A [`Query`] is a list of steps, each selecting children or descendants by
//! (optionally namespaced) name and an optional attribute predicate:
//!
//! ```
//! use nova_libvirt_exporter::descriptor::{parse, Query};
//!
//! let doc = parse(r#"<domain><devices>
//!     <interface type="ethernet"/><interface type="bridge"/>
//! </devices></domain>"#).unwrap();
//!
//! let ethernet = Query::child("devices")
//!     .then_descendant("interface")
//!     .with_attr("type", "ethernet");
//! assert_eq!(doc.root().find_all(&ethernet).len(), 1);
//! ```

use crate::descriptor::tree::Element;

/// Element name, optionally qualified by a namespace URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Name<'a> {
    pub namespace: Option<&'a str>,
    pub local: &'a str,
}

impl<'a> Name<'a> {
    /// Unqualified name; matches only elements without a namespace.
    pub const fn local(local: &'a str) -> Self {
        Self {
            namespace: None,
            local,
        }
    }

    /// Name qualified by a namespace URI.
    pub const fn qualified(namespace: &'a str, local: &'a str) -> Self {
        Self {
            namespace: Some(namespace),
            local,
        }
    }
}

impl<'a> From<&'a str> for Name<'a> {
    fn from(local: &'a str) -> Self {
        Name::local(local)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

/// Attribute filter applied to the elements selected by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate<'a> {
    AttrEquals { name: &'a str, value: &'a str },
    HasAttr(&'a str),
}

impl Predicate<'_> {
    fn matches(&self, element: &Element) -> bool {
        match self {
            Predicate::AttrEquals { name, value } => element.attr(name) == Some(*value),
            Predicate::HasAttr(name) => element.attr(name).is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Step<'a> {
    axis: Axis,
    name: Name<'a>,
    predicate: Option<Predicate<'a>>,
}

impl Step<'_> {
    fn matches(&self, element: &Element) -> bool {
        element.is(self.name) && self.predicate.map_or(true, |p| p.matches(element))
    }
}

/// Path query evaluated relative to a context element.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    steps: Vec<Step<'a>>,
}

impl<'a> Query<'a> {
    /// Starts a query selecting direct children named `name`.
    pub fn child(name: impl Into<Name<'a>>) -> Self {
        Self { steps: Vec::new() }.then_child(name)
    }

    /// Starts a query selecting all descendants named `name`.
    pub fn descendant(name: impl Into<Name<'a>>) -> Self {
        Self { steps: Vec::new() }.then_descendant(name)
    }

    /// Appends a child step.
    pub fn then_child(mut self, name: impl Into<Name<'a>>) -> Self {
        self.steps.push(Step {
            axis: Axis::Child,
            name: name.into(),
            predicate: None,
        });
        self
    }

    /// Appends a descendant step.
    pub fn then_descendant(mut self, name: impl Into<Name<'a>>) -> Self {
        self.steps.push(Step {
            axis: Axis::Descendant,
            name: name.into(),
            predicate: None,
        });
        self
    }

    /// Restricts the last step to elements whose attribute `name` equals `value`.
    pub fn with_attr(self, name: &'a str, value: &'a str) -> Self {
        self.with_predicate(Predicate::AttrEquals { name, value })
    }

    /// Restricts the last step to elements carrying attribute `name`.
    pub fn having_attr(self, name: &'a str) -> Self {
        self.with_predicate(Predicate::HasAttr(name))
    }

    fn with_predicate(mut self, predicate: Predicate<'a>) -> Self {
        if let Some(last) = self.steps.last_mut() {
            last.predicate = Some(predicate);
        }
        self
    }

    /// First match in document order.
    pub fn first<'e>(&self, context: &'e Element) -> Option<&'e Element> {
        self.all(context).into_iter().next()
    }

    /// All matches in document order, without duplicates.
    pub fn all<'e>(&self, context: &'e Element) -> Vec<&'e Element> {
        let mut current: Vec<&'e Element> = vec![context];

        for step in &self.steps {
            let mut next: Vec<&'e Element> = Vec::new();
            for node in current {
                let candidates: Box<dyn Iterator<Item = &'e Element> + 'e> = match step.axis {
                    Axis::Child => Box::new(node.children().iter()),
                    Axis::Descendant => Box::new(node.descendants()),
                };
                for candidate in candidates.filter(|c| step.matches(c)) {
                    if !next.iter().any(|seen| std::ptr::eq(*seen, candidate)) {
                        next.push(candidate);
                    }
                }
            }
            if next.is_empty() {
                return next;
            }
            current = next;
        }

        current
    }
}
