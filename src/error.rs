//! Error types for the exporter library.
//!
//! Every failure mode of the translation pipeline has its own enum so the
//! engine and the collection loop can decide how far a failure propagates:
//! descriptor errors skip one instance, extraction and sink errors skip one
//! family, hypervisor errors skip one instance or one whole cycle.

use thiserror::Error;

/// Failure to turn raw descriptor text into a tree.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("malformed descriptor document: {0}")]
    Malformed(String),
}

impl From<quick_xml::Error> for DescriptorError {
    fn from(e: quick_xml::Error) -> Self {
        DescriptorError::Malformed(e.to_string())
    }
}

/// Unexpected failure inside one extraction rule.
///
/// Absence of an optional container is not an error: extractors simply
/// return no samples for it.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("element <{element}> has no text content")]
    MissingText { element: String },

    #[error("element <{element}> holds '{value}', expected an integer")]
    InvalidInteger { element: String, value: String },

    #[error("unknown memory unit '{unit}' on <{element}>")]
    UnknownUnit { element: String, unit: String },

    #[error("<{element}> of {value} {unit} does not fit in KiB")]
    OutOfRange {
        element: String,
        value: i64,
        unit: String,
    },

    #[error("family {family} produced {got} label values, schema has {expected}")]
    LabelMismatch {
        family: &'static str,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Why a whole descriptor was not translated.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("descriptor has no <name> element")]
    MissingName,
}

/// Failure talking to the hypervisor.
#[derive(Debug, Error)]
pub enum HypervisorError {
    #[error("failed to connect to {uri}: {reason}")]
    Connect { uri: String, reason: String },

    #[error("failed to list instances: {0}")]
    ListInstances(String),

    #[error("failed to fetch descriptor of {instance}: {reason}")]
    Descriptor { instance: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure writing to the metric sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("unknown metric family {0}")]
    UnknownFamily(String),

    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
}
