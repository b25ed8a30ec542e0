//! Check command implementation.
//!
//! Connects to the hypervisor, lists instances and translates descriptors
//! without starting the HTTP server.

use nova_libvirt_exporter::{FamilyTable, MemorySink, TranslationOutcome, Translator};
use std::sync::Arc;

use crate::config::{validate_effective_config, Config};

/// Validates configuration and hypervisor access.
pub fn command_check(all: bool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Nova libvirt exporter - Check");
    println!("================================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    let families = Arc::new(FamilyTable::standard()?);
    println!("   ✅ {} metric families loaded", families.len());

    println!("\n🔌 Connecting to {}...", config.source_description());
    let hypervisor = config.hypervisor();
    match hypervisor.connect(config.libvirt_uri()) {
        Ok(connection) => {
            println!("   ✅ Connected");
            match connection.list_instances() {
                Ok(handles) => {
                    println!("   ✅ {} instances found", handles.len());

                    let translator = Translator::new(families.clone());
                    let limit = if all { handles.len() } else { handles.len().min(1) };
                    for handle in handles.iter().take(limit) {
                        let sink = MemorySink::new(translator.families());
                        let document = match connection.descriptor(handle) {
                            Ok(document) => document,
                            Err(e) => {
                                println!("   ❌ {}: {}", handle, e);
                                all_ok = false;
                                continue;
                            }
                        };
                        match translator.translate(&document, &sink) {
                            TranslationOutcome::Translated {
                                samples,
                                failed_families,
                                ..
                            } if failed_families.is_empty() => {
                                println!("   ✅ {}: {} samples", handle, samples);
                            }
                            TranslationOutcome::Translated {
                                samples,
                                failed_families,
                                ..
                            } => {
                                println!(
                                    "   ⚠️  {}: {} samples, failed families: {}",
                                    handle,
                                    samples,
                                    failed_families.join(", ")
                                );
                            }
                            TranslationOutcome::Skipped(e) => {
                                println!("   ❌ {}: {}", handle, e);
                                all_ok = false;
                            }
                        }
                    }
                }
                Err(e) => {
                    println!("   ❌ {}", e);
                    all_ok = false;
                }
            }
        }
        Err(e) => {
            println!("   ❌ {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - exporter is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review the output above");
        std::process::exit(1);
    }
}
