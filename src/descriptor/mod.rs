//! Descriptor model: parsed libvirt domain XML plus typed lookups.
//!
//! Parsing only checks well-formedness. Everything semantic (which nodes are
//! required, which defaults apply) lives in the extractors.

pub mod query;
pub mod tree;

pub use query::{Name, Predicate, Query};
pub use tree::Element;

use crate::error::DescriptorError;

/// Namespace URI of the Nova metadata sub-document.
pub const NOVA_NAMESPACE: &str = "http://openstack.org/xmlns/libvirt/nova/1.1";

/// Qualified name in the Nova metadata namespace.
pub const fn nova(local: &str) -> Name<'_> {
    Name::qualified(NOVA_NAMESPACE, local)
}

/// A parsed domain descriptor.
#[derive(Debug, Clone)]
pub struct Descriptor {
    root: Element,
}

impl Descriptor {
    /// Root `<domain>` element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Text of a direct child of the root, e.g. `name` or `uuid`.
    pub fn root_text(&self, name: &str) -> Option<&str> {
        self.root.child(name).and_then(Element::text)
    }

    /// The `nova:instance` node of the vendor metadata, if present.
    pub fn nova_instance(&self) -> Option<&Element> {
        self.root
            .find(&Query::child("metadata").then_descendant(nova("instance")))
    }

    /// The `<devices>` section, if present.
    pub fn devices(&self) -> Option<&Element> {
        self.root.child("devices")
    }
}

/// Parses raw domain XML.
pub fn parse(raw: &str) -> Result<Descriptor, DescriptorError> {
    tree::parse_element_tree(raw).map(|root| Descriptor { root })
}
