//! CLI command implementations for nova-libvirt-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Hypervisor connectivity and descriptor parsing check
//! - `config`: Configuration file generation
//! - `translate`: Offline translation of descriptor files

pub mod check;
pub mod config;
pub mod translate;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use translate::command_translate;
