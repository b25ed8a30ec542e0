//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers. The collection loop holds its own `Arc` to the
//! collector and writes into the registry through the sink.

use nova_libvirt_exporter::{CollectorHealth, FamilyTable};
use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    pub registry: Registry,
    pub families: Arc<FamilyTable>,
    pub health: Arc<CollectorHealth>,
    pub config: Arc<Config>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
