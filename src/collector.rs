//! Periodic collection: connect, enumerate, translate, prune, sleep.
//!
//! One cycle runs synchronously on tokio's blocking pool and fully completes
//! before the next starts. A connection or enumeration failure ends the
//! cycle early; a descriptor that cannot be fetched or translated only
//! skips that instance. The hypervisor connection is dropped at the end of
//! every cycle, early returns included.

use ahash::AHashSet as HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::engine::{TranslationOutcome, Translator};
use crate::health::{CollectorHealth, Telemetry};
use crate::hypervisor::Hypervisor;
use crate::sink::MetricSink;

/// Where a cycle is, or how far it got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Connecting,
    Enumerating,
    Translating,
    Sleeping,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Connecting => "connecting",
            CyclePhase::Enumerating => "enumerating",
            CyclePhase::Translating => "translating",
            CyclePhase::Sleeping => "sleeping",
        };
        f.write_str(name)
    }
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Last phase entered before the cycle ended.
    pub reached: CyclePhase,
    pub listed: usize,
    pub translated: usize,
    /// Instances whose descriptor could not be fetched or translated.
    pub skipped: usize,
    pub failed_families: usize,
    pub pruned: usize,
    pub duration: Duration,
    /// Connection or enumeration failure that ended the cycle.
    pub error: Option<String>,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            reached: CyclePhase::Idle,
            listed: 0,
            translated: 0,
            skipped: 0,
            failed_families: 0,
            pruned: 0,
            duration: Duration::ZERO,
            error: None,
        }
    }

    /// True when the instance list was obtained.
    pub fn enumerated(&self) -> bool {
        self.reached == CyclePhase::Translating && self.error.is_none()
    }
}

/// Drives the translation engine against a hypervisor.
pub struct Collector {
    hypervisor: Box<dyn Hypervisor>,
    uri: String,
    translator: Translator,
    sink: Arc<dyn MetricSink>,
    prune_stale: bool,
    health: Arc<CollectorHealth>,
    telemetry: Option<Telemetry>,
}

impl Collector {
    pub fn new(
        hypervisor: Box<dyn Hypervisor>,
        uri: impl Into<String>,
        translator: Translator,
        sink: Arc<dyn MetricSink>,
    ) -> Self {
        Self {
            hypervisor,
            uri: uri.into(),
            translator,
            sink,
            prune_stale: true,
            health: Arc::new(CollectorHealth::new()),
            telemetry: None,
        }
    }

    /// Whether series of vanished instances are removed after each cycle.
    pub fn with_prune_stale(mut self, prune_stale: bool) -> Self {
        self.prune_stale = prune_stale;
        self
    }

    pub fn with_health(mut self, health: Arc<CollectorHealth>) -> Self {
        self.health = health;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn health(&self) -> &Arc<CollectorHealth> {
        &self.health
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Runs one full cycle and records its outcome.
    #[instrument(skip(self), fields(uri = %self.uri))]
    pub fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();
        let mut report = CycleReport::new();

        self.collect(&mut report);
        report.duration = start.elapsed();

        self.health.record_cycle(&report);
        if let Some(telemetry) = &self.telemetry {
            telemetry.observe(&report);
        }

        if report.enumerated() {
            info!(
                "Collection cycle finished in {:.3}s: {} listed, {} translated, {} skipped, {} pruned",
                report.duration.as_secs_f64(),
                report.listed,
                report.translated,
                report.skipped,
                report.pruned
            );
        }
        report
    }

    fn collect(&self, report: &mut CycleReport) {
        report.reached = CyclePhase::Connecting;
        let connection = match self.hypervisor.connect(&self.uri) {
            Ok(connection) => connection,
            Err(e) => {
                error!("Collection cycle aborted: {}", e);
                report.error = Some(e.to_string());
                return;
            }
        };

        report.reached = CyclePhase::Enumerating;
        let handles = match connection.list_instances() {
            Ok(handles) => handles,
            Err(e) => {
                error!("Collection cycle aborted: {}", e);
                report.error = Some(e.to_string());
                return;
            }
        };

        report.reached = CyclePhase::Translating;
        report.listed = handles.len();
        debug!("Enumerated {} instances", handles.len());

        let mut observed = HashSet::with_capacity(handles.len());
        for handle in &handles {
            observed.insert(handle.name.clone());

            let document = match connection.descriptor(handle) {
                Ok(document) => document,
                Err(e) => {
                    warn!("Skipping instance {}: {}", handle, e);
                    report.skipped += 1;
                    continue;
                }
            };

            match self.translator.translate(&document, self.sink.as_ref()) {
                TranslationOutcome::Translated {
                    instance,
                    failed_families,
                    ..
                } => {
                    report.translated += 1;
                    report.failed_families += failed_families.len();
                    observed.insert(instance);
                }
                TranslationOutcome::Skipped(e) => {
                    warn!("Skipping instance {}: {}", handle, e);
                    report.skipped += 1;
                }
            }
        }

        if self.prune_stale {
            report.pruned = self.sink.retain_instances(&observed);
            if report.pruned > 0 {
                debug!("Pruned {} stale series", report.pruned);
            }
        }
    }
}

/// Runs cycles until `shutdown` flips to `true` or its sender is dropped.
pub async fn run_collection_loop(
    collector: Arc<Collector>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        "Collection loop started for {} (interval {}s)",
        collector.uri(),
        interval.as_secs()
    );

    while !*shutdown.borrow() {
        let cycle = Arc::clone(&collector);
        if let Err(e) = tokio::task::spawn_blocking(move || cycle.run_cycle()).await {
            error!("Collection cycle task failed: {}", e);
        }

        debug!("Collector {}", CyclePhase::Sleeping);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("Collection loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HypervisorError;
    use crate::families::FamilyTable;
    use crate::hypervisor::{Connection, InstanceHandle};
    use crate::sink::MemorySink;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory hypervisor whose instance set can change between cycles.
    #[derive(Clone, Default)]
    struct FakeHypervisor {
        documents: Arc<Mutex<Vec<(String, String)>>>,
        refuse: Arc<AtomicBool>,
    }

    impl FakeHypervisor {
        fn set(&self, docs: &[(&str, String)]) {
            *self.documents.lock().unwrap() = docs
                .iter()
                .map(|(name, doc)| (name.to_string(), doc.clone()))
                .collect();
        }
    }

    struct FakeConnection {
        documents: Vec<(String, String)>,
    }

    impl Hypervisor for FakeHypervisor {
        fn connect(&self, uri: &str) -> Result<Box<dyn Connection>, HypervisorError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(HypervisorError::Connect {
                    uri: uri.to_string(),
                    reason: "refused".into(),
                });
            }
            Ok(Box::new(FakeConnection {
                documents: self.documents.lock().unwrap().clone(),
            }))
        }
    }

    impl Connection for FakeConnection {
        fn list_instances(&self) -> Result<Vec<InstanceHandle>, HypervisorError> {
            Ok(self
                .documents
                .iter()
                .map(|(name, _)| InstanceHandle::new(name.clone()))
                .collect())
        }

        fn descriptor(&self, instance: &InstanceHandle) -> Result<String, HypervisorError> {
            self.documents
                .iter()
                .find(|(name, _)| *name == instance.name)
                .map(|(_, doc)| doc.clone())
                .ok_or_else(|| HypervisorError::Descriptor {
                    instance: instance.name.clone(),
                    reason: "gone".into(),
                })
        }
    }

    fn domain(name: &str) -> String {
        format!("<domain><name>{name}</name><uuid>{name}-uuid</uuid><vcpu>2</vcpu></domain>")
    }

    fn collector(hypervisor: &FakeHypervisor, sink: Arc<MemorySink>) -> Collector {
        let families = Arc::new(FamilyTable::standard().unwrap());
        Collector::new(
            Box::new(hypervisor.clone()),
            "test:///default",
            Translator::new(families),
            sink,
        )
    }

    #[test]
    fn test_one_malformed_descriptor_among_five() {
        let hypervisor = FakeHypervisor::default();
        hypervisor.set(&[
            ("vm-1", domain("vm-1")),
            ("vm-2", domain("vm-2")),
            ("vm-3", "<domain><name>vm-3</name>".to_string()),
            ("vm-4", domain("vm-4")),
            ("vm-5", domain("vm-5")),
        ]);
        let sink = Arc::new(MemorySink::new(&FamilyTable::standard().unwrap()));
        let collector = collector(&hypervisor, sink.clone());

        let report = collector.run_cycle();
        assert!(report.enumerated());
        assert_eq!(report.listed, 5);
        assert_eq!(report.translated, 4);
        assert_eq!(report.skipped, 1);
        assert_eq!(sink.series_of("nova_instance_vcpus").len(), 4);
        assert!(collector.health().is_healthy());
    }

    /// Log output collected in memory.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_skipped_descriptor_is_logged_with_instance() {
        let hypervisor = FakeHypervisor::default();
        hypervisor.set(&[
            ("vm-1", domain("vm-1")),
            ("instance-000000ff", "<domain><name>".to_string()),
        ]);
        let sink = Arc::new(MemorySink::new(&FamilyTable::standard().unwrap()));
        let collector = collector(&hypervisor, sink);

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let report = tracing::subscriber::with_default(subscriber, || collector.run_cycle());
        assert_eq!(report.skipped, 1);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|l| l.contains("Skipping instance"))
            .unwrap();
        assert!(line.contains("instance-000000ff"), "{line}");
    }

    #[test]
    fn test_vanished_instance_is_pruned() {
        let hypervisor = FakeHypervisor::default();
        hypervisor.set(&[("vm-1", domain("vm-1")), ("vm-2", domain("vm-2"))]);
        let sink = Arc::new(MemorySink::new(&FamilyTable::standard().unwrap()));
        let collector = collector(&hypervisor, sink.clone());

        collector.run_cycle();
        assert_eq!(sink.series_of("nova_instance_vcpus").len(), 2);

        hypervisor.set(&[("vm-1", domain("vm-1"))]);
        let report = collector.run_cycle();
        assert!(report.pruned > 0);
        let remaining = sink.series_of("nova_instance_vcpus");
        assert_eq!(remaining, vec![vec!["vm-1".to_string(), "vm-1-uuid".to_string()]]);
    }

    #[test]
    fn test_keep_stale_disables_pruning() {
        let hypervisor = FakeHypervisor::default();
        hypervisor.set(&[("vm-1", domain("vm-1"))]);
        let sink = Arc::new(MemorySink::new(&FamilyTable::standard().unwrap()));
        let collector = collector(&hypervisor, sink.clone()).with_prune_stale(false);

        collector.run_cycle();
        hypervisor.set(&[]);
        let report = collector.run_cycle();
        assert_eq!(report.pruned, 0);
        assert_eq!(sink.series_of("nova_instance_vcpus").len(), 1);
    }

    #[test]
    fn test_connection_failure_prunes_nothing() {
        let hypervisor = FakeHypervisor::default();
        hypervisor.set(&[("vm-1", domain("vm-1"))]);
        let sink = Arc::new(MemorySink::new(&FamilyTable::standard().unwrap()));
        let collector = collector(&hypervisor, sink.clone());

        collector.run_cycle();
        hypervisor.refuse.store(true, Ordering::SeqCst);
        let report = collector.run_cycle();

        assert_eq!(report.reached, CyclePhase::Connecting);
        assert!(!report.enumerated());
        assert!(report.error.is_some());
        assert_eq!(sink.series_of("nova_instance_vcpus").len(), 1);
        assert!(!collector.health().is_healthy());
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let hypervisor = FakeHypervisor::default();
        hypervisor.set(&[("vm-1", domain("vm-1"))]);
        let sink = Arc::new(MemorySink::new(&FamilyTable::standard().unwrap()));
        let collector = Arc::new(collector(&hypervisor, sink.clone()));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_collection_loop(
            collector.clone(),
            Duration::from_secs(3600),
            rx,
        ));

        // First cycle runs immediately; wait for it before signalling
        for _ in 0..100 {
            if collector.health().total_cycles.load(Ordering::Relaxed) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(collector.health().total_cycles.load(Ordering::Relaxed), 1);
        assert_eq!(sink.series_of("nova_instance_vcpus").len(), 1);
    }
}
