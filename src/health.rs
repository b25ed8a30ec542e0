//! Collector health tracking and self-telemetry.
//!
//! [`CollectorHealth`] accumulates per-cycle outcomes with atomics and small
//! mutex-guarded running statistics, and renders them as the plain-text
//! table served on `/health`. [`Telemetry`] mirrors the same outcomes into
//! Prometheus gauges when enabled.

use chrono::{DateTime, Utc};
use prometheus::{Gauge, IntCounter, IntGauge, Registry};
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use crate::collector::CycleReport;

/// Running statistics for a single value.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            *self = Self {
                count: 1,
                sum: value,
                min: value,
                max: value,
                last: value,
            };
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// `(last, avg, max, min, count)`
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Aggregate health of the collection loop.
pub struct CollectorHealth {
    pub total_cycles: AtomicU64,
    pub failed_cycles: AtomicU64,
    pub skipped_descriptors: AtomicU64,
    pub failed_families: AtomicU64,
    pub pruned_series: AtomicU64,

    pub instances: Stat,
    pub cycle_duration_seconds: Stat,

    last_cycle_ok: AtomicBool,
    last_error: RwLock<Option<String>>,
    last_success: RwLock<Option<DateTime<Utc>>>,
    start_time: Instant,
}

impl Default for CollectorHealth {
    fn default() -> Self {
        Self {
            total_cycles: AtomicU64::new(0),
            failed_cycles: AtomicU64::new(0),
            skipped_descriptors: AtomicU64::new(0),
            failed_families: AtomicU64::new(0),
            pruned_series: AtomicU64::new(0),
            instances: Stat::default(),
            cycle_duration_seconds: Stat::default(),
            last_cycle_ok: AtomicBool::new(false),
            last_error: RwLock::new(None),
            last_success: RwLock::new(None),
            start_time: Instant::now(),
        }
    }
}

impl CollectorHealth {
    pub fn new() -> Self {
        Default::default()
    }

    /// Folds one finished cycle into the counters.
    pub fn record_cycle(&self, report: &CycleReport) {
        self.total_cycles.fetch_add(1, Ordering::Relaxed);
        self.cycle_duration_seconds
            .add_sample(report.duration.as_secs_f64());

        let ok = report.enumerated();
        self.last_cycle_ok.store(ok, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_error.write() {
            *guard = report.error.clone();
        }

        if !ok {
            self.failed_cycles.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.instances.add_sample(report.translated as f64);
        self.skipped_descriptors
            .fetch_add(report.skipped as u64, Ordering::Relaxed);
        self.failed_families
            .fetch_add(report.failed_families as u64, Ordering::Relaxed);
        self.pruned_series
            .fetch_add(report.pruned as u64, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_success.write() {
            *guard = Some(Utc::now());
        }
    }

    /// Whether the most recent cycle got as far as enumerating instances.
    pub fn is_healthy(&self) -> bool {
        self.last_cycle_ok.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().ok().and_then(|g| g.clone())
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success.read().ok().and_then(|g| *g)
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn render_table(&self) -> String {
        let (in_cur, in_avg, in_max, in_min, _) = self.instances.snapshot();
        let (cd_cur, cd_avg, cd_max, cd_min, _) = self.cycle_duration_seconds.snapshot();
        let total = self.total_cycles.load(Ordering::Relaxed);
        let failed = self.failed_cycles.load(Ordering::Relaxed);
        let last_success = self
            .last_success()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "N/A".to_string());

        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - COLLECTOR STATS").ok();
        writeln!(out, "=================================").ok();
        writeln!(out).ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "instances",
            format!("{:.0}", in_cur),
            format!("{:.1}", in_avg),
            format!("{:.0}", in_max),
            format!("{:.0}", in_min),
            left = left_col,
            col = col_w
        )
        .ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "cycle_duration (s)",
            format!("{:.3}", cd_cur),
            format!("{:.3}", cd_avg),
            format!("{:.3}", cd_max),
            format!("{:.3}", cd_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "COUNTERS").ok();
        writeln!(out, "--------").ok();
        let counters = [
            ("total_cycles", total),
            ("failed_cycles", failed),
            (
                "skipped_descriptors",
                self.skipped_descriptors.load(Ordering::Relaxed),
            ),
            (
                "failed_families",
                self.failed_families.load(Ordering::Relaxed),
            ),
            ("pruned_series", self.pruned_series.load(Ordering::Relaxed)),
        ];
        for (name, value) in counters {
            writeln!(out, "{:left$} | {:>col$}", name, value, left = left_col, col = col_w).ok();
        }

        writeln!(out).ok();
        writeln!(out, "last_successful_cycle: {}", last_success).ok();
        if let Some(error) = self.last_error() {
            writeln!(out, "last_error: {}", error).ok();
        }
        out
    }
}

/// Exporter self-metrics, registered next to the instance families.
pub struct Telemetry {
    cycle_duration: Gauge,
    last_cycle_success: IntGauge,
    instances: IntGauge,
    translation_failures: IntCounter,
}

impl Telemetry {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let telemetry = Self {
            cycle_duration: Gauge::new(
                "nova_libvirt_exporter_cycle_duration_seconds",
                "Duration of the last collection cycle in seconds",
            )?,
            last_cycle_success: IntGauge::new(
                "nova_libvirt_exporter_last_cycle_success",
                "Whether the last collection cycle enumerated instances (1) or not (0)",
            )?,
            instances: IntGauge::new(
                "nova_libvirt_exporter_instances",
                "Instances translated in the last collection cycle",
            )?,
            translation_failures: IntCounter::new(
                "nova_libvirt_exporter_translation_failures_total",
                "Skipped descriptors plus failed metric families",
            )?,
        };

        registry.register(Box::new(telemetry.cycle_duration.clone()))?;
        registry.register(Box::new(telemetry.last_cycle_success.clone()))?;
        registry.register(Box::new(telemetry.instances.clone()))?;
        registry.register(Box::new(telemetry.translation_failures.clone()))?;
        Ok(telemetry)
    }

    pub fn observe(&self, report: &CycleReport) {
        self.cycle_duration.set(report.duration.as_secs_f64());
        self.last_cycle_success.set(i64::from(report.enumerated()));
        if report.enumerated() {
            self.instances.set(report.translated as i64);
            self.translation_failures
                .inc_by((report.skipped + report.failed_families) as u64);
        }
    }
}
