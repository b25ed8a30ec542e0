//! Field extractors, one per metric family.
//!
//! Every extractor is a pure function of the parsed descriptor and the
//! instance identity. An absent optional container yields no samples; an
//! absent attribute inside a present container takes its default. Only
//! genuinely unexpected shapes (missing mandatory text, non-numeric
//! quantities) surface as [`ExtractionError`].

pub mod devices;
pub mod domain;
pub mod nova;

use crate::descriptor::{Descriptor, Element};
use crate::error::{ExtractionError, TranslationError};

/// Default label value for absent attributes and derived fields.
pub const UNKNOWN: &str = "unknown";

/// Identity of the instance a descriptor describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub name: String,
    pub uuid: Option<String>,
}

impl Instance {
    /// Reads `<name>` (required) and `<uuid>` (optional) from the root.
    pub fn from_descriptor(descriptor: &Descriptor) -> Result<Self, TranslationError> {
        let name = descriptor
            .root_text("name")
            .ok_or(TranslationError::MissingName)?
            .to_string();
        let uuid = descriptor.root_text("uuid").map(str::to_string);
        Ok(Self { name, uuid })
    }

    pub fn uuid_label(&self) -> &str {
        self.uuid.as_deref().unwrap_or(UNKNOWN)
    }
}

/// One labeled measurement. `labels` holds values in schema order,
/// starting with the instance name.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Vec<String>,
    pub value: f64,
}

impl Sample {
    /// Metadata sample: the given labels after the instance name, value 1.
    pub fn info<I, S>(instance: &Instance, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut values = vec![instance.name.clone()];
        values.extend(labels.into_iter().map(Into::into));
        Self {
            labels: values,
            value: 1.0,
        }
    }

    /// Quantity sample labeled by instance name and uuid.
    pub fn quantity(instance: &Instance, value: i64) -> Self {
        Self {
            labels: vec![instance.name.clone(), instance.uuid_label().to_string()],
            value: value as f64,
        }
    }
}

/// Signature shared by all extraction rules.
pub type ExtractFn = fn(&Descriptor, &Instance) -> Result<Vec<Sample>, ExtractionError>;

/// Attribute value or `"unknown"`.
pub(crate) fn attr_label(element: &Element, name: &str) -> String {
    element.attr_or(name, UNKNOWN).to_string()
}

/// Attribute of an optional element, `"unknown"` when either is absent.
pub(crate) fn opt_attr_label(element: Option<&Element>, name: &str) -> String {
    element
        .and_then(|e| e.attr(name))
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// Mandatory text content.
pub(crate) fn required_text(element: &Element) -> Result<String, ExtractionError> {
    element
        .text()
        .map(str::to_string)
        .ok_or_else(|| ExtractionError::MissingText {
            element: element.name().to_string(),
        })
}

/// Integer text content of an optional element; `default` when the element is absent.
pub(crate) fn int_text_or(element: Option<&Element>, default: i64) -> Result<i64, ExtractionError> {
    let Some(element) = element else {
        return Ok(default);
    };
    let text = element.text_or_empty();
    text.parse::<i64>()
        .map_err(|_| ExtractionError::InvalidInteger {
            element: element.name().to_string(),
            value: text.to_string(),
        })
}
