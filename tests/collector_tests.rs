//! Collection cycles against a directory of descriptors feeding a
//! Prometheus registry.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use nova_libvirt_exporter::{
    Collector, CyclePhase, DirectoryHypervisor, FamilyTable, PrometheusSink, Telemetry, Translator,
};
use prometheus::{Encoder, Registry, TextEncoder};
use tempfile::tempdir;

fn write_instance(dir: &Path, name: &str, vcpus: u32) {
    let document = format!(
        "<domain type='kvm'><name>{name}</name><memory unit='MiB'>512</memory>\
         <vcpu>{vcpus}</vcpu></domain>"
    );
    fs::write(dir.join(format!("{name}.xml")), document).unwrap();
}

fn collector(dir: &Path, registry: &Registry) -> Collector {
    let families = Arc::new(FamilyTable::standard().unwrap());
    let sink = Arc::new(PrometheusSink::new(registry, &families).unwrap());
    Collector::new(
        Box::new(DirectoryHypervisor::new(dir)),
        "qemu:///system",
        Translator::new(families),
        sink,
    )
    .with_telemetry(Telemetry::register(registry).unwrap())
}

fn exposition(registry: &Registry) -> String {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .unwrap();
    String::from_utf8(buffer).unwrap()
}

#[test]
fn test_malformed_descriptor_skips_only_that_instance() {
    let dir = tempdir().unwrap();
    for i in 1..=4 {
        write_instance(dir.path(), &format!("instance-0000000{i}"), i);
    }
    fs::write(dir.path().join("instance-00000005.xml"), "<domain><name>").unwrap();

    let registry = Registry::new();
    let collector = collector(dir.path(), &registry);
    let report = collector.run_cycle();

    assert!(report.enumerated());
    assert_eq!(report.listed, 5);
    assert_eq!(report.translated, 4);
    assert_eq!(report.skipped, 1);
    assert!(collector.health().is_healthy());

    let text = exposition(&registry);
    assert!(text.contains(
        r#"nova_instance_vcpus{instance_name="instance-00000003",instance_uuid="unknown"} 3"#
    ));
    assert!(text.contains(
        r#"nova_instance_memory_kib{instance_name="instance-00000001",instance_uuid="unknown"} 524288"#
    ));
    assert!(!text.contains("instance-00000005"));
    assert!(text.contains("nova_libvirt_exporter_instances 4"));
    assert!(text.contains("nova_libvirt_exporter_translation_failures_total 1"));
}

#[test]
fn test_removed_instance_is_pruned_next_cycle() {
    let dir = tempdir().unwrap();
    write_instance(dir.path(), "instance-00000001", 2);
    write_instance(dir.path(), "instance-00000002", 4);

    let registry = Registry::new();
    let collector = collector(dir.path(), &registry);
    collector.run_cycle();
    assert!(exposition(&registry).contains("instance-00000002"));

    fs::remove_file(dir.path().join("instance-00000002.xml")).unwrap();
    let report = collector.run_cycle();

    assert!(report.pruned > 0);
    let text = exposition(&registry);
    assert!(!text.contains("instance-00000002"));
    assert!(text.contains("instance-00000001"));
}

#[test]
fn test_unreachable_source_keeps_series_and_reports_unhealthy() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("descriptors");
    fs::create_dir(&source).unwrap();
    write_instance(&source, "instance-00000001", 2);

    let registry = Registry::new();
    let collector = collector(&source, &registry);
    assert!(collector.run_cycle().enumerated());

    fs::remove_dir_all(&source).unwrap();
    let report = collector.run_cycle();

    assert!(!report.enumerated());
    assert_eq!(report.reached, CyclePhase::Connecting);
    assert_eq!(report.pruned, 0);
    assert!(report.error.is_some());
    assert!(!collector.health().is_healthy());

    let text = exposition(&registry);
    assert!(text.contains("instance-00000001"));
    assert!(text.contains("nova_libvirt_exporter_last_cycle_success 0"));
}
