//! Extractors for domain-level configuration: resources, CPU, SMBIOS, OS,
//! hypervisor features, lifecycle actions and boot order.

use crate::descriptor::{Descriptor, Element, Query};
use crate::error::ExtractionError;
use crate::extractors::{attr_label, int_text_or, required_text, Instance, Sample, UNKNOWN};

const SYSINFO_ENTRIES: [&str; 5] = ["manufacturer", "product", "version", "serial", "family"];
const LIFECYCLE_ACTIONS: [&str; 3] = ["on_poweroff", "on_reboot", "on_crash"];

/// Bytes per libvirt memory unit. Unit names are case sensitive in libvirt.
fn unit_bytes(unit: &str) -> Option<i128> {
    let bytes = match unit {
        "b" | "bytes" => 1,
        "KB" => 1_000,
        "k" | "KiB" => 1 << 10,
        "MB" => 1_000_000,
        "M" | "MiB" => 1 << 20,
        "GB" => 1_000_000_000,
        "G" | "GiB" => 1 << 30,
        "TB" => 1_000_000_000_000,
        "T" | "TiB" => 1 << 40,
        _ => return None,
    };
    Some(bytes)
}

/// Memory value of `<memory>` normalised to KiB (0 when absent).
fn memory_kib(memory: Option<&Element>) -> Result<i64, ExtractionError> {
    let value = int_text_or(memory, 0)?;
    let Some(memory) = memory else {
        return Ok(value);
    };
    let unit = memory.attr_or("unit", "KiB");
    let bytes = unit_bytes(unit).ok_or_else(|| ExtractionError::UnknownUnit {
        element: memory.name().to_string(),
        unit: unit.to_string(),
    })?;
    i64::try_from(i128::from(value) * bytes / 1024).map_err(|_| ExtractionError::OutOfRange {
        element: memory.name().to_string(),
        value,
        unit: unit.to_string(),
    })
}

/// `nova_instance_memory_kib`
pub fn memory(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let kib = memory_kib(doc.root().child("memory"))?;
    Ok(vec![Sample::quantity(instance, kib)])
}

/// `nova_instance_vcpus`
pub fn vcpus(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let count = int_text_or(doc.root().child("vcpu"), 0)?;
    Ok(vec![Sample::quantity(instance, count)])
}

/// `nova_instance_cpu_shares`: 0 when the domain has no `<cputune>` section.
pub fn cpu_shares(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let shares = int_text_or(doc.root().child("cputune").and_then(|c| c.child("shares")), 0)?;
    Ok(vec![Sample::quantity(instance, shares)])
}

/// `nova_instance_cpu_topology`: only when `<cpu><topology>` exists; each
/// attribute then defaults on its own.
pub fn cpu_topology(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let Some(cpu) = doc.root().child("cpu") else {
        return Ok(Vec::new());
    };
    let Some(topology) = cpu.child("topology") else {
        return Ok(Vec::new());
    };
    let dimension = |name: &str| topology.attr(name).unwrap_or("1").to_string();
    let model = cpu
        .child("model")
        .and_then(Element::text)
        .unwrap_or(UNKNOWN)
        .to_string();

    Ok(vec![Sample::info(
        instance,
        [
            dimension("sockets"),
            dimension("cores"),
            dimension("threads"),
            model,
        ],
    )])
}

/// `nova_instance_sysinfo`: SMBIOS system entries, each defaulting on its own.
pub fn sysinfo(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let Some(system) = doc
        .root()
        .find(&Query::child("sysinfo").then_child("system"))
    else {
        return Ok(Vec::new());
    };

    let labels = SYSINFO_ENTRIES.map(|entry| {
        system
            .find(&Query::child("entry").with_attr("name", entry))
            .map(|e| e.text_or_empty().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    });
    Ok(vec![Sample::info(instance, labels)])
}

/// `nova_instance_os`: the OS type text is mandatory once `<os><type>` exists.
pub fn os(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let Some(os_type) = doc.root().find(&Query::child("os").then_child("type")) else {
        return Ok(Vec::new());
    };

    Ok(vec![Sample::info(
        instance,
        [
            attr_label(os_type, "arch"),
            attr_label(os_type, "machine"),
            required_text(os_type)?,
        ],
    )])
}

/// `nova_instance_features`: one sample per hypervisor feature toggle.
pub fn features(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let Some(features) = doc.root().child("features") else {
        return Ok(Vec::new());
    };

    Ok(features
        .children()
        .iter()
        .map(|feature| {
            Sample::info(
                instance,
                [feature.name(), feature.attr_or("state", "on")],
            )
        })
        .collect())
}

/// `nova_instance_power_management`: lifecycle actions, emitted when any is set.
pub fn power_management(
    doc: &Descriptor,
    instance: &Instance,
) -> Result<Vec<Sample>, ExtractionError> {
    let root = doc.root();
    if LIFECYCLE_ACTIONS.iter().all(|a| root.child(*a).is_none()) {
        return Ok(Vec::new());
    }

    let labels = LIFECYCLE_ACTIONS.map(|action| {
        root.child(action)
            .and_then(Element::text)
            .unwrap_or(UNKNOWN)
            .to_string()
    });
    Ok(vec![Sample::info(instance, labels)])
}

/// `nova_instance_boot`: legacy `<os><boot dev=.../>` entries in order, plus
/// per-device `<boot order=.../>` elements.
pub fn boot(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let mut samples: Vec<Sample> = doc
        .root()
        .find_all(&Query::child("os").then_child("boot"))
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            Sample::info(instance, [attr_label(entry, "dev"), (idx + 1).to_string()])
        })
        .collect();

    if let Some(devices) = doc.devices() {
        for device in devices.children() {
            let Some(order) = device.child("boot").and_then(|b| b.attr("order")) else {
                continue;
            };
            let target = device
                .child("target")
                .and_then(|t| t.attr("dev"))
                .unwrap_or(device.name());
            samples.push(Sample::info(instance, [target, order]));
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::test_support::{descriptor, instance, tail};

    const FULL: &str = include_str!("../../tests/fixtures/instance-full.xml");

    #[test]
    fn test_resources_from_full_descriptor() {
        let doc = descriptor(FULL);
        let inst = instance();

        let mem = memory(&doc, &inst).unwrap();
        assert_eq!(mem[0].value, 4194304.0);
        assert_eq!(mem[0].labels[1], "c5b3a1e2-0000-4000-8000-000000000001");
        assert_eq!(vcpus(&doc, &inst).unwrap()[0].value, 2.0);
        assert_eq!(cpu_shares(&doc, &inst).unwrap()[0].value, 2048.0);
    }

    #[test]
    fn test_resource_defaults() {
        let doc = descriptor("<domain><name>vm</name><cputune/></domain>");
        let inst = instance();
        assert_eq!(memory(&doc, &inst).unwrap()[0].value, 0.0);
        assert_eq!(vcpus(&doc, &inst).unwrap()[0].value, 0.0);
        assert_eq!(cpu_shares(&doc, &inst).unwrap()[0].value, 0.0);
    }

    #[test]
    fn test_cpu_shares_without_cputune_is_zero() {
        let doc = descriptor("<domain><name>vm</name><uuid>u</uuid><vcpu>8</vcpu></domain>");
        let samples = cpu_shares(&doc, &instance()).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 0.0);
    }

    #[test]
    fn test_memory_units_are_normalised() {
        let inst = instance();
        let cases = [
            ("<memory unit='MiB'>2048</memory>", 2_097_152.0),
            ("<memory unit='GiB'>4</memory>", 4_194_304.0),
            ("<memory unit='b'>1048576</memory>", 1024.0),
            ("<memory unit='KB'>1024</memory>", 1000.0),
            ("<memory>512</memory>", 512.0),
        ];
        for (xml, expected) in cases {
            let doc = descriptor(&format!("<domain><name>vm</name>{xml}</domain>"));
            assert_eq!(memory(&doc, &inst).unwrap()[0].value, expected, "{xml}");
        }

        let doc = descriptor("<domain><name>vm</name><memory unit='parsecs'>1</memory></domain>");
        assert!(matches!(
            memory(&doc, &inst),
            Err(ExtractionError::UnknownUnit { .. })
        ));
    }

    #[test]
    fn test_memory_overflow_is_an_error() {
        let doc = descriptor(
            "<domain><name>vm</name><memory unit='TiB'>9223372036854775807</memory></domain>",
        );
        assert!(matches!(
            memory(&doc, &instance()),
            Err(ExtractionError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_non_numeric_vcpu_is_an_error() {
        let doc = descriptor("<domain><name>vm</name><vcpu>lots</vcpu></domain>");
        assert!(matches!(
            vcpus(&doc, &instance()),
            Err(ExtractionError::InvalidInteger { .. })
        ));
    }

    #[test]
    fn test_cpu_topology() {
        let inst = instance();
        let doc = descriptor(FULL);
        let samples = cpu_topology(&doc, &inst).unwrap();
        assert_eq!(tail(&samples[0]), vec!["2", "1", "1", "Cascadelake-Server"]);

        let doc = descriptor("<domain><name>vm</name><cpu><topology/></cpu></domain>");
        let samples = cpu_topology(&doc, &inst).unwrap();
        assert_eq!(tail(&samples[0]), vec!["1", "1", "1", "unknown"]);

        let doc = descriptor("<domain><name>vm</name><cpu><topology cores='4'/></cpu></domain>");
        let samples = cpu_topology(&doc, &inst).unwrap();
        assert_eq!(tail(&samples[0]), vec!["1", "4", "1", "unknown"]);
    }

    #[test]
    fn test_cpu_topology_requires_topology_element() {
        let inst = instance();
        for xml in ["<cpu mode='host-passthrough'/>", "<vcpu>8</vcpu>"] {
            let doc = descriptor(&format!("<domain><name>vm</name>{xml}</domain>"));
            assert!(cpu_topology(&doc, &inst).unwrap().is_empty(), "{xml}");
        }
    }

    #[test]
    fn test_sysinfo_entries_default_independently() {
        let inst = instance();
        let samples = sysinfo(&descriptor(FULL), &inst).unwrap();
        assert_eq!(
            tail(&samples[0]),
            vec![
                "OpenStack Foundation",
                "OpenStack Nova",
                "27.1.0",
                "8f6c1a52-3b4e-4d7a-9c1f-2e5d8b7a6c41",
                "Virtual Machine"
            ]
        );

        let doc = descriptor(
            "<domain><name>vm</name><sysinfo><system><entry name='product'>Nova</entry></system></sysinfo></domain>",
        );
        let samples = sysinfo(&doc, &inst).unwrap();
        assert_eq!(
            tail(&samples[0]),
            vec!["unknown", "Nova", "unknown", "unknown", "unknown"]
        );

        let doc = descriptor("<domain><name>vm</name></domain>");
        assert!(sysinfo(&doc, &inst).unwrap().is_empty());
    }

    #[test]
    fn test_os_info() {
        let inst = instance();
        let samples = os(&descriptor(FULL), &inst).unwrap();
        assert_eq!(tail(&samples[0]), vec!["x86_64", "pc-q35-6.2", "hvm"]);

        let doc = descriptor("<domain><name>vm</name><os><type>hvm</type></os></domain>");
        let samples = os(&doc, &inst).unwrap();
        assert_eq!(tail(&samples[0]), vec!["unknown", "unknown", "hvm"]);
    }

    #[test]
    fn test_os_type_without_text_is_an_error() {
        let doc = descriptor("<domain><name>vm</name><os><type arch='x86_64'/></os></domain>");
        assert!(matches!(
            os(&doc, &instance()),
            Err(ExtractionError::MissingText { .. })
        ));
    }

    #[test]
    fn test_features() {
        let samples = features(&descriptor(FULL), &instance()).unwrap();
        let pairs: Vec<Vec<&str>> = samples.iter().map(tail).collect();
        assert_eq!(
            pairs,
            vec![
                vec!["acpi", "on"],
                vec!["apic", "on"],
                vec!["vmcoreinfo", "on"],
                vec!["pmu", "off"]
            ]
        );
    }

    #[test]
    fn test_power_management() {
        let inst = instance();
        let samples = power_management(&descriptor(FULL), &inst).unwrap();
        assert_eq!(tail(&samples[0]), vec!["destroy", "restart", "destroy"]);

        let doc = descriptor("<domain><name>vm</name><on_crash>coredump-restart</on_crash></domain>");
        let samples = power_management(&doc, &inst).unwrap();
        assert_eq!(tail(&samples[0]), vec!["unknown", "unknown", "coredump-restart"]);

        let doc = descriptor("<domain><name>vm</name></domain>");
        assert!(power_management(&doc, &inst).unwrap().is_empty());
    }

    #[test]
    fn test_boot_order() {
        let inst = instance();
        let samples = boot(&descriptor(FULL), &inst).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(tail(&samples[0]), vec!["hd", "1"]);

        let doc = descriptor(
            r#"<domain><name>vm</name>
                 <os><boot dev='cdrom'/><boot dev='hd'/></os>
                 <devices>
                   <disk type='file'><target dev='vda'/><boot order='2'/></disk>
                   <interface type='ethernet'><boot order='1'/></interface>
                 </devices>
               </domain>"#,
        );
        let samples = boot(&doc, &inst).unwrap();
        let orders: Vec<Vec<&str>> = samples.iter().map(tail).collect();
        assert_eq!(
            orders,
            vec![
                vec!["cdrom", "1"],
                vec!["hd", "2"],
                vec!["vda", "2"],
                vec!["interface", "1"]
            ]
        );
    }
}
