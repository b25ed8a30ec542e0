//! Translate command implementation.
//!
//! Runs the translation engine over descriptor files and prints the
//! resulting samples, without any hypervisor.

use anyhow::{Context, Result};
use nova_libvirt_exporter::{
    FamilyTable, MemorySink, MetricSink, PrometheusSink, TranslationOutcome, Translator,
};
use prometheus::Registry;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::SampleFormat;
use crate::handlers::metrics::encode_registry;

/// Translates every file into one sink and renders it in `format`.
pub fn render_translation(files: &[PathBuf], format: SampleFormat) -> Result<String> {
    let families = Arc::new(FamilyTable::standard()?);
    let translator = Translator::new(families.clone());

    match format {
        SampleFormat::Prometheus => {
            let registry = Registry::new();
            let sink = PrometheusSink::new(&registry, &families)?;
            translate_files(&translator, files, &sink)?;
            encode_registry(&registry)
                .map_err(|_| anyhow::anyhow!("failed to encode Prometheus metrics"))
        }
        SampleFormat::Json => {
            let sink = MemorySink::new(&families);
            translate_files(&translator, files, &sink)?;
            Ok(serde_json::to_string_pretty(&sink.snapshot())?)
        }
        SampleFormat::Yaml => {
            let sink = MemorySink::new(&families);
            translate_files(&translator, files, &sink)?;
            Ok(serde_yaml::to_string(&sink.snapshot())?)
        }
    }
}

fn translate_files(translator: &Translator, files: &[PathBuf], sink: &dyn MetricSink) -> Result<()> {
    for file in files {
        let document = fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;

        match translator.translate(&document, sink) {
            TranslationOutcome::Translated {
                instance,
                samples,
                failed_families,
            } => {
                eprintln!(
                    "✅ {}: {} ({} samples)",
                    file.display(),
                    instance,
                    samples
                );
                for family in failed_families {
                    eprintln!("   ⚠️  {} failed", family);
                }
            }
            TranslationOutcome::Skipped(e) => {
                eprintln!("❌ {}: {}", file.display(), e);
            }
        }
    }
    Ok(())
}

/// Prints the translation of `files` to stdout.
pub fn command_translate(files: &[PathBuf], format: SampleFormat) -> Result<()> {
    let output = render_translation(files, format)?;
    print!("{}", output);
    Ok(())
}
