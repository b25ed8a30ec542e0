//! Hypervisor access: connect, list instances, fetch descriptor documents.
//!
//! Two backends are provided. [`VirshHypervisor`] shells out to the `virsh`
//! CLI against a libvirt URI. [`DirectoryHypervisor`] serves every `*.xml`
//! file of a directory as one instance, for offline runs and tests.
//!
//! A [`Connection`] is released when dropped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::error::HypervisorError;

/// Opaque reference to one instance on the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceHandle {
    pub name: String,
}

impl InstanceHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Something that can open connections to a hypervisor.
pub trait Hypervisor: Send + Sync {
    fn connect(&self, uri: &str) -> Result<Box<dyn Connection>, HypervisorError>;
}

/// One open hypervisor connection.
pub trait Connection: Send {
    /// Every defined instance, running or not.
    fn list_instances(&self) -> Result<Vec<InstanceHandle>, HypervisorError>;

    /// Raw descriptor document of one instance.
    fn descriptor(&self, instance: &InstanceHandle) -> Result<String, HypervisorError>;
}

// ============================================================================
// virsh
// ============================================================================

/// Hypervisor reached through the `virsh` command line tool.
#[derive(Debug, Clone)]
pub struct VirshHypervisor {
    virsh_path: PathBuf,
}

impl VirshHypervisor {
    pub fn new(virsh_path: impl Into<PathBuf>) -> Self {
        Self {
            virsh_path: virsh_path.into(),
        }
    }
}

impl Default for VirshHypervisor {
    fn default() -> Self {
        Self::new("virsh")
    }
}

impl Hypervisor for VirshHypervisor {
    fn connect(&self, uri: &str) -> Result<Box<dyn Connection>, HypervisorError> {
        let connection = VirshConnection {
            virsh_path: self.virsh_path.clone(),
            uri: uri.to_string(),
        };

        // `virsh uri` fails fast when the daemon is unreachable
        connection
            .run(&["uri"])
            .map_err(|reason| HypervisorError::Connect {
                uri: uri.to_string(),
                reason,
            })?;

        debug!("Connected to {}", uri);
        Ok(Box::new(connection))
    }
}

struct VirshConnection {
    virsh_path: PathBuf,
    uri: String,
}

impl VirshConnection {
    /// Runs `virsh --connect <uri> <args>` and returns its stdout.
    fn run(&self, args: &[&str]) -> Result<String, String> {
        let output = Command::new(&self.virsh_path)
            .arg("--connect")
            .arg(&self.uri)
            .args(args)
            .output()
            .map_err(|e| format!("failed to run {}: {e}", self.virsh_path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("virsh {} failed: {}", args.join(" "), stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Connection for VirshConnection {
    fn list_instances(&self) -> Result<Vec<InstanceHandle>, HypervisorError> {
        let stdout = self
            .run(&["list", "--all", "--name"])
            .map_err(HypervisorError::ListInstances)?;
        Ok(parse_name_list(&stdout))
    }

    fn descriptor(&self, instance: &InstanceHandle) -> Result<String, HypervisorError> {
        self.run(&["dumpxml", &instance.name])
            .map_err(|reason| HypervisorError::Descriptor {
                instance: instance.name.clone(),
                reason,
            })
    }
}

impl Drop for VirshConnection {
    fn drop(&mut self) {
        debug!("Released connection to {}", self.uri);
    }
}

/// One instance name per non-empty line.
fn parse_name_list(stdout: &str) -> Vec<InstanceHandle> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(InstanceHandle::new)
        .collect()
}

// ============================================================================
// Directory
// ============================================================================

/// Serves descriptor files from a directory; the URI is ignored.
#[derive(Debug, Clone)]
pub struct DirectoryHypervisor {
    dir: PathBuf,
}

impl DirectoryHypervisor {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Hypervisor for DirectoryHypervisor {
    fn connect(&self, _uri: &str) -> Result<Box<dyn Connection>, HypervisorError> {
        if !self.dir.is_dir() {
            return Err(HypervisorError::Connect {
                uri: self.dir.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }
        Ok(Box::new(DirectoryConnection {
            dir: self.dir.clone(),
        }))
    }
}

struct DirectoryConnection {
    dir: PathBuf,
}

impl Connection for DirectoryConnection {
    fn list_instances(&self) -> Result<Vec<InstanceHandle>, HypervisorError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| HypervisorError::ListInstances(e.to_string()))?;

        let mut handles = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("xml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                handles.push(InstanceHandle::new(stem));
            }
        }
        handles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(handles)
    }

    fn descriptor(&self, instance: &InstanceHandle) -> Result<String, HypervisorError> {
        let path = self.dir.join(format!("{}.xml", instance.name));
        std::fs::read_to_string(&path).map_err(|e| HypervisorError::Descriptor {
            instance: instance.name.clone(),
            reason: format!("{}: {e}", path.display()),
        })
    }
}
