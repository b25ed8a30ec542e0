//! Extractors for the `<devices>` section.
//!
//! Repeated devices are filtered by their kind attribute before anything is
//! read: only `ethernet` interfaces (the tap devices Neutron plugs), `file`
//! disks and `pci` host devices are reported.

use crate::descriptor::{Descriptor, Element, Query};
use crate::error::ExtractionError;
use crate::extractors::{attr_label, opt_attr_label, Instance, Sample, UNKNOWN};

/// Disk size is not part of the descriptor; the label is kept for schema
/// compatibility and always reads zero.
const UNPROBED_DISK_SIZE: &str = "0";

/// An ethernet interface with all four identifying children present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub mac_address: String,
    pub target_dev: String,
    pub model: String,
    pub mtu: String,
    pub pci_slot: String,
}

impl NetworkInterface {
    fn read(interface: &Element) -> Option<Self> {
        let (mac, target, model, mtu) = (
            interface.child("mac")?,
            interface.child("target")?,
            interface.child("model")?,
            interface.child("mtu")?,
        );
        let pci_slot = match interface.child("address") {
            Some(address) => format!(
                "{}:{}",
                address.attr_or("bus", UNKNOWN),
                address.attr_or("slot", UNKNOWN)
            ),
            None => UNKNOWN.to_string(),
        };

        Some(Self {
            mac_address: attr_label(mac, "address"),
            target_dev: attr_label(target, "dev"),
            model: attr_label(model, "type"),
            mtu: attr_label(mtu, "size"),
            pci_slot,
        })
    }
}

/// A file-backed disk with driver, target and source present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    pub device: Option<String>,
    pub disk_type: Option<String>,
    pub driver_type: Option<String>,
    pub cache: Option<String>,
    pub path: Option<String>,
    pub target_bus: Option<String>,
}

impl Disk {
    fn read(disk: &Element) -> Option<Self> {
        let (driver, target, source) = (
            disk.child("driver")?,
            disk.child("target")?,
            disk.child("source")?,
        );
        let owned = |e: &Element, name: &str| e.attr(name).map(str::to_string);

        Some(Self {
            device: owned(target, "dev"),
            disk_type: owned(disk, "type"),
            driver_type: owned(driver, "type"),
            cache: owned(driver, "cache"),
            path: owned(source, "file"),
            target_bus: owned(target, "bus"),
        })
    }
}

fn or_unknown(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| UNKNOWN.to_string())
}

fn or_empty(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn ethernet_interfaces(doc: &Descriptor) -> Vec<NetworkInterface> {
    let Some(devices) = doc.devices() else {
        return Vec::new();
    };
    devices
        .find_all(&Query::descendant("interface").with_attr("type", "ethernet"))
        .into_iter()
        .filter_map(NetworkInterface::read)
        .collect()
}

fn file_disks(doc: &Descriptor) -> Vec<Disk> {
    let Some(devices) = doc.devices() else {
        return Vec::new();
    };
    devices
        .find_all(&Query::descendant("disk").with_attr("type", "file"))
        .into_iter()
        .filter_map(Disk::read)
        .collect()
}

/// `nova_instance_network`
pub fn network(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    Ok(ethernet_interfaces(doc)
        .into_iter()
        .map(|nic| Sample::info(instance, [nic.mac_address, nic.target_dev, nic.model, nic.mtu]))
        .collect())
}

/// `nova_instance_network_details`
pub fn network_details(
    doc: &Descriptor,
    instance: &Instance,
) -> Result<Vec<Sample>, ExtractionError> {
    Ok(ethernet_interfaces(doc)
        .into_iter()
        .map(|nic| {
            Sample::info(
                instance,
                [nic.mac_address, nic.model, nic.mtu, nic.target_dev, nic.pci_slot],
            )
        })
        .collect())
}

/// `nova_instance_disk`
pub fn disks(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    Ok(file_disks(doc)
        .iter()
        .map(|disk| {
            Sample::info(
                instance,
                [
                    or_unknown(&disk.device),
                    or_unknown(&disk.disk_type),
                    or_unknown(&disk.driver_type),
                    or_unknown(&disk.cache),
                    or_unknown(&disk.path),
                ],
            )
        })
        .collect())
}

/// `nova_instance_disk_details`
pub fn disk_details(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    Ok(file_disks(doc)
        .iter()
        .map(|disk| {
            Sample::info(
                instance,
                [
                    or_unknown(&disk.device),
                    UNPROBED_DISK_SIZE.to_string(),
                    or_empty(&disk.path),
                    or_empty(&disk.target_bus),
                    or_empty(&disk.driver_type),
                    or_empty(&disk.cache),
                ],
            )
        })
        .collect())
}

/// `nova_instance_pci_device`: host PCI passthrough with both host and guest addresses.
pub fn pci_devices(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let Some(devices) = doc.devices() else {
        return Ok(Vec::new());
    };
    let source_query = Query::child("source").then_child("address");

    let mut samples = Vec::new();
    for hostdev in devices.find_all(&Query::descendant("hostdev").with_attr("type", "pci")) {
        let (Some(source), Some(target)) = (hostdev.find(&source_query), hostdev.child("address"))
        else {
            continue;
        };
        samples.push(Sample::info(
            instance,
            [
                attr_label(source, "bus"),
                attr_label(source, "slot"),
                attr_label(source, "function"),
                attr_label(target, "bus"),
                attr_label(target, "slot"),
                attr_label(target, "function"),
            ],
        ));
    }
    Ok(samples)
}

/// `nova_instance_graphics`: first graphics device, if it has a listen node.
pub fn graphics(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let Some(graphics) = doc.devices().and_then(|d| d.child("graphics")) else {
        return Ok(Vec::new());
    };
    let Some(listen) = graphics.child("listen") else {
        return Ok(Vec::new());
    };

    Ok(vec![Sample::info(
        instance,
        [
            attr_label(graphics, "type"),
            attr_label(graphics, "port"),
            attr_label(listen, "address"),
        ],
    )])
}

/// `nova_instance_memballoon`
pub fn memballoon(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let Some(balloon) = doc
        .devices()
        .and_then(|d| d.find(&Query::descendant("memballoon")))
    else {
        return Ok(Vec::new());
    };
    let period = balloon
        .child("stats")
        .and_then(|s| s.attr("period"))
        .unwrap_or("0");

    Ok(vec![Sample::info(
        instance,
        [balloon.attr_or("model", UNKNOWN), period],
    )])
}

/// `nova_instance_console`
pub fn consoles(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let Some(devices) = doc.devices() else {
        return Ok(Vec::new());
    };

    Ok(devices
        .find_all(&Query::child("console"))
        .into_iter()
        .map(|console| {
            let log_path = console
                .child("log")
                .and_then(|l| l.attr("file"))
                .or_else(|| console.child("source").and_then(|s| s.attr("path")))
                .unwrap_or(UNKNOWN);
            Sample::info(instance, [console.attr_or("type", UNKNOWN), log_path])
        })
        .collect())
}

/// `nova_instance_input_devices`
pub fn input_devices(
    doc: &Descriptor,
    instance: &Instance,
) -> Result<Vec<Sample>, ExtractionError> {
    let Some(devices) = doc.devices() else {
        return Ok(Vec::new());
    };

    Ok(devices
        .find_all(&Query::child("input"))
        .into_iter()
        .map(|input| Sample::info(instance, [attr_label(input, "type"), attr_label(input, "bus")]))
        .collect())
}

/// `nova_instance_video`
pub fn video(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let Some(devices) = doc.devices() else {
        return Ok(Vec::new());
    };

    Ok(devices
        .find_all(&Query::child("video").then_child("model"))
        .into_iter()
        .map(|model| {
            Sample::info(
                instance,
                [
                    attr_label(model, "type"),
                    attr_label(model, "vram"),
                    attr_label(model, "heads"),
                ],
            )
        })
        .collect())
}

/// `nova_instance_rng`
pub fn rng(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let Some(devices) = doc.devices() else {
        return Ok(Vec::new());
    };

    Ok(devices
        .find_all(&Query::child("rng"))
        .into_iter()
        .map(|rng| {
            let backend = rng.child("backend");
            let backend_label = backend
                .and_then(Element::text)
                .map(str::to_string)
                .unwrap_or_else(|| opt_attr_label(backend, "model"));
            Sample::info(instance, [attr_label(rng, "model"), backend_label])
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::test_support::{descriptor, instance, tail};

    const FULL: &str = include_str!("../../tests/fixtures/instance-full.xml");
    const MINIMAL: &str = include_str!("../../tests/fixtures/instance-minimal.xml");

    fn devices_doc(body: &str) -> Descriptor {
        descriptor(&format!(
            "<domain><name>vm</name><devices>{body}</devices></domain>"
        ))
    }

    #[test]
    fn test_network_interface_labels() {
        let inst = instance();
        let doc = descriptor(MINIMAL);
        let samples = network(&doc, &inst).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(
            tail(&samples[0]),
            vec!["52:54:00:aa:bb:cc", "vnet0", "virtio", "1500"]
        );
        assert_eq!(samples[0].value, 1.0);

        let details = network_details(&doc, &inst).unwrap();
        assert_eq!(
            tail(&details[0]),
            vec!["52:54:00:aa:bb:cc", "virtio", "1500", "vnet0", "unknown"]
        );
    }

    #[test]
    fn test_only_ethernet_interfaces_are_reported() {
        let inst = instance();
        let doc = descriptor(FULL);
        let samples = network(&doc, &inst).unwrap();
        assert_eq!(samples.len(), 1, "vhostuser interface must be skipped");

        let details = network_details(&doc, &inst).unwrap();
        assert_eq!(
            tail(&details[0]),
            vec!["fa:16:3e:11:22:33", "virtio", "1450", "tap0b1c2d3e-4f", "0x01:0x00"]
        );
    }

    #[test]
    fn test_interface_missing_child_is_skipped() {
        let doc = devices_doc(
            "<interface type='ethernet'><mac address='aa'/><target dev='t'/><model type='virtio'/></interface>",
        );
        assert!(network(&doc, &instance()).unwrap().is_empty());
    }

    #[test]
    fn test_file_disks() {
        let inst = instance();
        let doc = descriptor(FULL);
        let path = "/var/lib/nova/instances/8f6c1a52-3b4e-4d7a-9c1f-2e5d8b7a6c41/disk";

        let samples = disks(&doc, &inst).unwrap();
        assert_eq!(samples.len(), 1, "network disk must be skipped");
        assert_eq!(tail(&samples[0]), vec!["vda", "file", "qcow2", "none", path]);

        let details = disk_details(&doc, &inst).unwrap();
        assert_eq!(
            tail(&details[0]),
            vec!["vda", "0", path, "virtio", "qcow2", "none"]
        );
    }

    #[test]
    fn test_disk_detail_defaults_are_empty() {
        let doc = devices_doc(
            "<disk type='file'><driver name='qemu'/><source/><target dev='vdc'/></disk>",
        );
        let inst = instance();
        assert_eq!(
            tail(&disk_details(&doc, &inst).unwrap()[0]),
            vec!["vdc", "0", "", "", "", ""]
        );
        assert_eq!(
            tail(&disks(&doc, &inst).unwrap()[0]),
            vec!["vdc", "file", "unknown", "unknown", "unknown"]
        );
    }

    #[test]
    fn test_pci_passthrough() {
        let samples = pci_devices(&descriptor(FULL), &instance()).unwrap();
        assert_eq!(
            tail(&samples[0]),
            vec!["0x3b", "0x00", "0x1", "0x05", "0x00", "0x0"]
        );

        let doc = devices_doc(
            "<hostdev type='pci'><source><address bus='0x3b' slot='0x00' function='0x1'/></source></hostdev>",
        );
        assert!(pci_devices(&doc, &instance()).unwrap().is_empty());
    }

    #[test]
    fn test_graphics_requires_listen() {
        let inst = instance();
        let samples = graphics(&descriptor(FULL), &inst).unwrap();
        assert_eq!(tail(&samples[0]), vec!["vnc", "5901", "0.0.0.0"]);

        let doc = devices_doc("<graphics type='spice' port='5900'/>");
        assert!(graphics(&doc, &inst).unwrap().is_empty());
    }

    #[test]
    fn test_memballoon() {
        let inst = instance();
        let samples = memballoon(&descriptor(FULL), &inst).unwrap();
        assert_eq!(tail(&samples[0]), vec!["virtio", "10"]);

        let doc = devices_doc("<memballoon/>");
        assert_eq!(
            tail(&memballoon(&doc, &inst).unwrap()[0]),
            vec!["unknown", "0"]
        );
    }

    #[test]
    fn test_console_input_video_rng() {
        let inst = instance();
        let doc = descriptor(FULL);

        let console = consoles(&doc, &inst).unwrap();
        assert_eq!(
            tail(&console[0]),
            vec![
                "pty",
                "/var/lib/nova/instances/8f6c1a52-3b4e-4d7a-9c1f-2e5d8b7a6c41/console.log"
            ]
        );

        let inputs = input_devices(&doc, &inst).unwrap();
        let inputs: Vec<Vec<&str>> = inputs.iter().map(tail).collect();
        assert_eq!(inputs, vec![vec!["tablet", "usb"], vec!["mouse", "ps2"]]);

        let vid = video(&doc, &inst).unwrap();
        assert_eq!(tail(&vid[0]), vec!["virtio", "16384", "1"]);

        let rngs = rng(&doc, &inst).unwrap();
        assert_eq!(tail(&rngs[0]), vec!["virtio", "/dev/urandom"]);
    }

    #[test]
    fn test_rng_backend_fallbacks() {
        let inst = instance();
        let doc = devices_doc("<rng model='virtio'><backend model='egd' type='tcp'/></rng>");
        assert_eq!(tail(&rng(&doc, &inst).unwrap()[0]), vec!["virtio", "egd"]);

        let doc = devices_doc("<rng model='virtio'/>");
        assert_eq!(tail(&rng(&doc, &inst).unwrap()[0]), vec!["virtio", "unknown"]);
    }

    #[test]
    fn test_no_devices_section() {
        let doc = descriptor("<domain><name>vm</name></domain>");
        let inst = instance();
        assert!(network(&doc, &inst).unwrap().is_empty());
        assert!(disks(&doc, &inst).unwrap().is_empty());
        assert!(pci_devices(&doc, &inst).unwrap().is_empty());
        assert!(graphics(&doc, &inst).unwrap().is_empty());
        assert!(memballoon(&doc, &inst).unwrap().is_empty());
        assert!(consoles(&doc, &inst).unwrap().is_empty());
    }
}
