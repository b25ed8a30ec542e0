//! Translation engine: one descriptor document in, samples into a sink.
//!
//! Every family runs inside its own failure boundary. An extraction or sink
//! error is logged with the family and instance name and the remaining
//! families still run. A document that does not parse, or carries no
//! `<name>`, is skipped as a whole. Nothing propagates out of [`Translator::translate`].

use std::sync::Arc;
use tracing::{debug, warn};

use crate::descriptor::{self, Descriptor};
use crate::error::{ExtractionError, TranslationError};
use crate::extractors::Instance;
use crate::families::{FamilyTable, MetricFamily};
use crate::sink::MetricSink;

/// Result of translating one descriptor.
#[derive(Debug)]
pub enum TranslationOutcome {
    Translated {
        instance: String,
        samples: usize,
        failed_families: Vec<&'static str>,
    },
    Skipped(TranslationError),
}

impl TranslationOutcome {
    /// Instance name, when the descriptor got far enough to have one.
    pub fn instance(&self) -> Option<&str> {
        match self {
            TranslationOutcome::Translated { instance, .. } => Some(instance),
            TranslationOutcome::Skipped(_) => None,
        }
    }

    pub fn is_translated(&self) -> bool {
        matches!(self, TranslationOutcome::Translated { .. })
    }
}

/// Runs the family table over descriptor documents.
#[derive(Debug, Clone)]
pub struct Translator {
    families: Arc<FamilyTable>,
}

impl Translator {
    pub fn new(families: Arc<FamilyTable>) -> Self {
        Self { families }
    }

    pub fn families(&self) -> &FamilyTable {
        &self.families
    }

    /// Translates one raw descriptor document into `sink`.
    pub fn translate(&self, document: &str, sink: &dyn MetricSink) -> TranslationOutcome {
        let (doc, instance) = match parse_identity(document) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Descriptor not translated: {}", e);
                return TranslationOutcome::Skipped(e);
            }
        };

        let mut samples = 0;
        let mut failed_families = Vec::new();
        for family in self.families.iter() {
            match run_family(family, &doc, &instance, sink) {
                Ok(written) => samples += written,
                Err(e) => {
                    warn!(
                        family = family.name,
                        instance = %instance.name,
                        "Failed to extract metric family: {}",
                        e
                    );
                    failed_families.push(family.name);
                }
            }
        }

        debug!(
            "Translated {}: {} samples, {} failed families",
            instance.name,
            samples,
            failed_families.len()
        );

        TranslationOutcome::Translated {
            instance: instance.name,
            samples,
            failed_families,
        }
    }
}

fn parse_identity(document: &str) -> Result<(Descriptor, Instance), TranslationError> {
    let doc = descriptor::parse(document)?;
    let instance = Instance::from_descriptor(&doc)?;
    Ok((doc, instance))
}

/// Extracts one family and writes its samples. All samples are checked
/// against the schema before any is written.
fn run_family(
    family: &MetricFamily,
    doc: &Descriptor,
    instance: &Instance,
    sink: &dyn MetricSink,
) -> Result<usize, ExtractionError> {
    let samples = (family.extract)(doc, instance)?;

    if let Some(bad) = samples.iter().find(|s| s.labels.len() != family.labels.len()) {
        return Err(ExtractionError::LabelMismatch {
            family: family.name,
            expected: family.labels.len(),
            got: bad.labels.len(),
        });
    }

    for sample in &samples {
        sink.set_gauge(family.name, &sample.labels, sample.value)?;
    }
    Ok(samples.len())
}
