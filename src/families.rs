//! Metric family table.
//!
//! Each entry binds a metric name, its help text, its label schema and the
//! extraction rule producing its samples. The table is built once at startup
//! and shared by reference with the translation engine and the sink.

use ahash::AHashSet as HashSet;
use thiserror::Error;

use crate::extractors::{devices, domain, nova, ExtractFn};

/// Label every family carries first; used to prune stale instances.
pub const INSTANCE_LABEL: &str = "instance_name";

/// One metric family: name, help, label schema, extraction rule.
#[derive(Clone, Copy)]
pub struct MetricFamily {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
    pub extract: ExtractFn,
}

impl std::fmt::Debug for MetricFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricFamily")
            .field("name", &self.name)
            .field("labels", &self.labels)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FamilyTableError {
    #[error("duplicate metric family {0}")]
    Duplicate(&'static str),

    #[error("metric family {0} must start with the instance_name label")]
    MissingInstanceLabel(&'static str),
}

/// Fixed set of families the translation engine runs.
#[derive(Debug, Clone)]
pub struct FamilyTable {
    families: Vec<MetricFamily>,
}

impl FamilyTable {
    /// Builds a table, checking names are unique and every schema starts
    /// with [`INSTANCE_LABEL`].
    pub fn new(families: Vec<MetricFamily>) -> Result<Self, FamilyTableError> {
        let mut seen = HashSet::new();
        for family in &families {
            if !seen.insert(family.name) {
                return Err(FamilyTableError::Duplicate(family.name));
            }
            if family.labels.first() != Some(&INSTANCE_LABEL) {
                return Err(FamilyTableError::MissingInstanceLabel(family.name));
            }
        }
        Ok(Self { families })
    }

    /// All families exported by the exporter.
    pub fn standard() -> Result<Self, FamilyTableError> {
        Self::new(standard_families())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricFamily> {
        self.families.iter()
    }

    pub fn get(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

fn standard_families() -> Vec<MetricFamily> {
    vec![
        // ========== Nova metadata ==========
        MetricFamily {
            name: "nova_instance_metadata",
            help: "Nova instance metadata",
            labels: &["instance_name", "nova_name", "creation_time", "package_version"],
            extract: nova::instance_metadata,
        },
        MetricFamily {
            name: "nova_flavor_metadata",
            help: "Nova flavor metadata",
            labels: &[
                "instance_name",
                "flavor_name",
                "memory",
                "disk",
                "vcpus",
                "swap",
                "ephemeral",
            ],
            extract: nova::flavor,
        },
        MetricFamily {
            name: "nova_owner_metadata",
            help: "Nova owner metadata",
            labels: &["instance_name", "user", "user_uuid", "project", "project_uuid"],
            extract: nova::owner,
        },
        MetricFamily {
            name: "nova_instance_root_disk",
            help: "Root disk information",
            labels: &["instance_name", "type", "uuid"],
            extract: nova::root_disk,
        },
        MetricFamily {
            name: "nova_instance_ip",
            help: "IP address information",
            labels: &["instance_name", "port_uuid", "ip_address", "ip_version", "type"],
            extract: nova::ip_assignments,
        },
        // ========== Resource allocation ==========
        MetricFamily {
            name: "nova_instance_memory_kib",
            help: "Instance memory in KiB",
            labels: &["instance_name", "instance_uuid"],
            extract: domain::memory,
        },
        MetricFamily {
            name: "nova_instance_vcpus",
            help: "Instance vCPUs",
            labels: &["instance_name", "instance_uuid"],
            extract: domain::vcpus,
        },
        MetricFamily {
            name: "nova_instance_cpu_shares",
            help: "CPU shares",
            labels: &["instance_name", "instance_uuid"],
            extract: domain::cpu_shares,
        },
        // ========== Platform ==========
        MetricFamily {
            name: "nova_instance_cpu_topology",
            help: "CPU topology information",
            labels: &["instance_name", "sockets", "cores", "threads", "model"],
            extract: domain::cpu_topology,
        },
        MetricFamily {
            name: "nova_instance_sysinfo",
            help: "System information",
            labels: &[
                "instance_name",
                "manufacturer",
                "product",
                "version",
                "serial",
                "family",
            ],
            extract: domain::sysinfo,
        },
        MetricFamily {
            name: "nova_instance_os",
            help: "Operating system information",
            labels: &["instance_name", "arch", "machine", "type"],
            extract: domain::os,
        },
        MetricFamily {
            name: "nova_instance_features",
            help: "Instance features status",
            labels: &["instance_name", "feature_name", "state"],
            extract: domain::features,
        },
        MetricFamily {
            name: "nova_instance_power_management",
            help: "Power management configuration",
            labels: &["instance_name", "on_poweroff", "on_reboot", "on_crash"],
            extract: domain::power_management,
        },
        MetricFamily {
            name: "nova_instance_boot",
            help: "Boot configuration",
            labels: &["instance_name", "boot_device", "boot_order"],
            extract: domain::boot,
        },
        // ========== Devices ==========
        MetricFamily {
            name: "nova_instance_network",
            help: "Network interface information",
            labels: &["instance_name", "mac_address", "target_dev", "model", "mtu"],
            extract: devices::network,
        },
        MetricFamily {
            name: "nova_instance_network_details",
            help: "Detailed network information",
            labels: &[
                "instance_name",
                "mac_address",
                "model",
                "mtu",
                "target_dev",
                "pci_slot",
            ],
            extract: devices::network_details,
        },
        MetricFamily {
            name: "nova_instance_disk",
            help: "Disk information",
            labels: &["instance_name", "device", "type", "driver_type", "cache", "path"],
            extract: devices::disks,
        },
        MetricFamily {
            name: "nova_instance_disk_details",
            help: "Detailed disk information",
            labels: &[
                "instance_name",
                "device",
                "size_bytes",
                "backing_file",
                "target_bus",
                "disk_type",
                "disk_cache",
            ],
            extract: devices::disk_details,
        },
        MetricFamily {
            name: "nova_instance_pci_device",
            help: "PCI device information",
            labels: &[
                "instance_name",
                "source_bus",
                "source_slot",
                "source_function",
                "target_bus",
                "target_slot",
                "target_function",
            ],
            extract: devices::pci_devices,
        },
        MetricFamily {
            name: "nova_instance_graphics",
            help: "Graphics configuration",
            labels: &["instance_name", "type", "port", "listen_address"],
            extract: devices::graphics,
        },
        MetricFamily {
            name: "nova_instance_memballoon",
            help: "Memory balloon device information",
            labels: &["instance_name", "model", "period"],
            extract: devices::memballoon,
        },
        MetricFamily {
            name: "nova_instance_console",
            help: "Console configuration",
            labels: &["instance_name", "type", "log_path"],
            extract: devices::consoles,
        },
        MetricFamily {
            name: "nova_instance_input_devices",
            help: "Input devices configuration",
            labels: &["instance_name", "type", "bus"],
            extract: devices::input_devices,
        },
        MetricFamily {
            name: "nova_instance_video",
            help: "Video device information",
            labels: &["instance_name", "model", "vram", "heads"],
            extract: devices::video,
        },
        MetricFamily {
            name: "nova_instance_rng",
            help: "Random number generator device information",
            labels: &["instance_name", "model", "backend"],
            extract: devices::rng,
        },
    ]
}
