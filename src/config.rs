//! Configuration management for nova-libvirt-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, LogLevel};
use clap::ValueEnum;
use nova_libvirt_exporter::{DirectoryHypervisor, Hypervisor, VirshHypervisor};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9179;
pub const DEFAULT_LIBVIRT_URI: &str = "qemu:///system";
pub const DEFAULT_INTERVAL_SECONDS: u64 = 30;
pub const DEFAULT_VIRSH_PATH: &str = "virsh";

/// Searched in order when no `--config` is given.
const DEFAULT_CONFIG_PATHS: [&str; 7] = [
    "/etc/nova-libvirt-exporter/config.yaml",
    "/etc/nova-libvirt-exporter/config.yml",
    "/etc/nova-libvirt-exporter/config.json",
    "/etc/nova-libvirt-exporter/config.toml",
    "./nova-libvirt-exporter.yaml",
    "./nova-libvirt-exporter.yml",
    "./nova-libvirt-exporter.json",
];

/// Exporter configuration. Every field is optional in files; accessors
/// apply the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Hypervisor
    #[serde(alias = "libvirt-uri")]
    pub libvirt_uri: Option<String>,
    #[serde(alias = "interval-seconds")]
    pub interval_seconds: Option<u64>,
    #[serde(alias = "virsh-path")]
    pub virsh_path: Option<PathBuf>,
    /// Read descriptors from a directory instead of libvirt
    #[serde(alias = "descriptor-dir")]
    pub descriptor_dir: Option<PathBuf>,

    /// Remove series of instances that disappeared from the host
    #[serde(alias = "prune-stale")]
    pub prune_stale: Option<bool>,

    // Feature flags
    #[serde(alias = "enable-health")]
    pub enable_health: Option<bool>,
    #[serde(alias = "enable-telemetry")]
    pub enable_telemetry: Option<bool>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            libvirt_uri: Some(DEFAULT_LIBVIRT_URI.to_string()),
            interval_seconds: Some(DEFAULT_INTERVAL_SECONDS),
            virsh_path: Some(PathBuf::from(DEFAULT_VIRSH_PATH)),
            descriptor_dir: None,
            prune_stale: Some(true),
            enable_health: Some(true),
            enable_telemetry: Some(true),
            log_level: Some("info".into()),
        }
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    }

    /// Listen address; IPv6 binds such as `::` need no brackets.
    pub fn listen_addr(&self) -> Result<SocketAddr, AddrParseError> {
        Ok(SocketAddr::new(self.bind().parse::<IpAddr>()?, self.port()))
    }

    pub fn libvirt_uri(&self) -> &str {
        self.libvirt_uri.as_deref().unwrap_or(DEFAULT_LIBVIRT_URI)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECONDS))
    }

    pub fn virsh_path(&self) -> &Path {
        self.virsh_path
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_VIRSH_PATH))
    }

    pub fn prune_stale(&self) -> bool {
        self.prune_stale.unwrap_or(true)
    }

    pub fn enable_health(&self) -> bool {
        self.enable_health.unwrap_or(true)
    }

    pub fn enable_telemetry(&self) -> bool {
        self.enable_telemetry.unwrap_or(true)
    }

    /// Hypervisor backend: the descriptor directory when set, virsh otherwise.
    pub fn hypervisor(&self) -> Box<dyn Hypervisor> {
        match &self.descriptor_dir {
            Some(dir) => Box::new(DirectoryHypervisor::new(dir)),
            None => Box::new(VirshHypervisor::new(self.virsh_path())),
        }
    }

    /// Human-readable name of the descriptor source, for logs.
    pub fn source_description(&self) -> String {
        match &self.descriptor_dir {
            Some(dir) => format!("descriptor directory {}", dir.display()),
            None => self.libvirt_uri().to_string(),
        }
    }

    /// Configured log level; `info` when unset.
    pub fn log_level(&self) -> Result<LogLevel, String> {
        match self.log_level.as_deref() {
            None => Ok(LogLevel::Info),
            Some(level) => LogLevel::from_str(level, true)
                .map_err(|_| format!("Invalid log_level '{}'", level)),
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.port == Some(0) {
        return Err("port must be between 1 and 65535".into());
    }

    if cfg.interval_seconds == Some(0) {
        return Err("interval_seconds must be at least 1".into());
    }

    if cfg.libvirt_uri.as_deref().is_some_and(|uri| uri.trim().is_empty()) {
        return Err("libvirt_uri must not be empty".into());
    }

    cfg.listen_addr()
        .map_err(|_| format!("Invalid bind address '{}'", cfg.bind()))?;

    cfg.log_level()?;

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }
    if let Some(uri) = &args.libvirt_uri {
        config.libvirt_uri = Some(uri.clone());
    }
    if let Some(interval) = args.interval {
        config.interval_seconds = Some(interval);
    }
    if let Some(virsh) = &args.virsh_path {
        config.virsh_path = Some(virsh.clone());
    }
    if let Some(dir) = &args.descriptor_dir {
        config.descriptor_dir = Some(dir.clone());
    }
    if let Some(level) = args.log_level {
        if let Some(value) = level.to_possible_value() {
            config.log_level = Some(value.get_name().to_string());
        }
    }

    // Feature flags
    if args.keep_stale {
        config.prune_stale = Some(false);
    }
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_telemetry {
        config.enable_telemetry = Some(false);
    }

    Ok(config)
}

/// Loads a config file by extension; the default locations are searched
/// when no path is given. No file at all yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("Config file not found: {}", p.display()).into());
            }
            p.to_path_buf()
        }
        None => match DEFAULT_CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
            Some(found) => PathBuf::from(found),
            None => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders a config in the requested format.
pub fn render_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, format)?);
    Ok(())
}
