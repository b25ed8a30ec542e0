//! Nova libvirt exporter library
//!
//! Translates libvirt domain descriptors of OpenStack Nova instances into
//! labeled Prometheus gauges. The binary wraps it in an HTTP server; the
//! library is usable on its own for offline translation.
//!
//! # Layers
//!
//! - **descriptor**: well-formedness parsing plus typed, namespace-aware queries
//! - **extractors**: one pure extraction rule per metric family
//! - **families**: the table binding names, help, label schemas and rules
//! - **engine**: runs the table over one document with per-family isolation
//! - **sink**: Prometheus-backed and in-memory destinations for samples
//! - **hypervisor** / **collector**: the periodic polling loop
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use nova_libvirt_exporter::{FamilyTable, MemorySink, Translator};
//!
//! let families = Arc::new(FamilyTable::standard().unwrap());
//! let translator = Translator::new(families);
//! let sink = MemorySink::new(translator.families());
//!
//! let outcome = translator.translate(
//!     "<domain><name>instance-00000001</name><vcpu>4</vcpu></domain>",
//!     &sink,
//! );
//! assert!(outcome.is_translated());
//! assert_eq!(
//!     sink.get("nova_instance_vcpus", &["instance-00000001", "unknown"]),
//!     Some(4.0)
//! );
//! ```

pub mod collector;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod families;
pub mod health;
pub mod hypervisor;
pub mod sink;

// Re-export main types for convenience
pub use collector::{run_collection_loop, Collector, CyclePhase, CycleReport};
pub use engine::{TranslationOutcome, Translator};
pub use error::{DescriptorError, ExtractionError, HypervisorError, SinkError, TranslationError};
pub use families::{FamilyTable, MetricFamily};
pub use health::{CollectorHealth, Telemetry};
pub use hypervisor::{Connection, DirectoryHypervisor, Hypervisor, InstanceHandle, VirshHypervisor};
pub use sink::{MemorySink, MetricSink, PrometheusSink, RecordedSample};
