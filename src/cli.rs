//! CLI arguments and subcommands for nova-libvirt-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Output format of the `translate` subcommand
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SampleFormat {
    /// Prometheus text exposition format
    Prometheus,
    Json,
    Yaml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "nova-libvirt-exporter",
    about = "Prometheus exporter for OpenStack Nova instance metadata from libvirt",
    long_about = "Prometheus exporter for OpenStack Nova instance metadata from libvirt.\n\n\
                  Periodically lists the domains of a libvirt host, parses each domain's \
                  XML descriptor and republishes flavor, owner, resource allocation and \
                  device configuration as labeled gauges.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// libvirt connection URI
    #[arg(long)]
    pub libvirt_uri: Option<String>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Seconds between collection cycles
    #[arg(long)]
    pub interval: Option<u64>,

    /// Log level (overrides config file; default info)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Read descriptors from *.xml files in this directory instead of libvirt
    #[arg(long)]
    pub descriptor_dir: Option<PathBuf>,

    /// Path to the virsh binary
    #[arg(long)]
    pub virsh_path: Option<PathBuf>,

    /// Keep series of instances that no longer exist
    #[arg(long)]
    pub keep_stale: bool,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Disable internal nova_libvirt_exporter_* metrics
    #[arg(long)]
    pub disable_telemetry: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check hypervisor connectivity and descriptor parsing
    Check {
        /// Translate every descriptor, not only the first
        #[arg(long)]
        all: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Translate descriptor files offline and print the samples
    Translate {
        /// Domain XML files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "prometheus")]
        format: SampleFormat,
    },
}
