//! Metric sinks: where translated samples are written.
//!
//! A sink keeps the last value written per `(family, label values)` key and
//! never forgets a key on its own. Dropping series of instances that have
//! disappeared is an explicit call, [`MetricSink::retain_instances`], made
//! by the collection loop after a successful enumeration.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use prometheus::{GaugeVec, Opts, Registry};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::error::SinkError;
use crate::families::FamilyTable;

/// Destination for translated samples.
pub trait MetricSink: Send + Sync {
    /// Sets one series. `labels` are values in the family's schema order.
    fn set_gauge(&self, family: &str, labels: &[String], value: f64) -> Result<(), SinkError>;

    /// Drops every series whose instance label is not in `observed`.
    /// Returns the number of series removed.
    fn retain_instances(&self, observed: &HashSet<String>) -> usize;
}

/// Sink backed by one Prometheus `GaugeVec` per family.
pub struct PrometheusSink {
    gauges: HashMap<&'static str, GaugeVec>,
    /// Label values written per family, so stale series can be removed.
    written: Mutex<HashMap<&'static str, HashSet<Vec<String>>>>,
}

impl PrometheusSink {
    /// Creates and registers a gauge vector for every family of the table.
    pub fn new(registry: &Registry, families: &FamilyTable) -> Result<Self, SinkError> {
        let mut gauges = HashMap::with_capacity(families.len());
        for family in families.iter() {
            let gauge = GaugeVec::new(Opts::new(family.name, family.help), family.labels)?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(family.name, gauge);
        }
        debug!("Registered {} metric families", gauges.len());

        Ok(Self {
            gauges,
            written: Mutex::new(HashMap::new()),
        })
    }
}

impl MetricSink for PrometheusSink {
    fn set_gauge(&self, family: &str, labels: &[String], value: f64) -> Result<(), SinkError> {
        let (name, gauge) = self
            .gauges
            .get_key_value(family)
            .ok_or_else(|| SinkError::UnknownFamily(family.to_string()))?;

        let values: Vec<&str> = labels.iter().map(String::as_str).collect();
        gauge.get_metric_with_label_values(&values)?.set(value);

        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(*name)
            .or_default()
            .insert(labels.to_vec());
        Ok(())
    }

    fn retain_instances(&self, observed: &HashSet<String>) -> usize {
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);

        let mut removed = 0;
        for (name, series) in written.iter_mut() {
            let Some(gauge) = self.gauges.get(name) else {
                continue;
            };
            series.retain(|labels| {
                let keep = labels.first().is_some_and(|i| observed.contains(i));
                if !keep {
                    let values: Vec<&str> = labels.iter().map(String::as_str).collect();
                    if gauge.remove_label_values(&values).is_ok() {
                        removed += 1;
                    }
                }
                keep
            });
        }
        removed
    }
}

/// One series held by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedSample {
    pub metric: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// In-process sink keeping series in an ordered map.
///
/// Used by the `translate` command for JSON/YAML output and by tests.
pub struct MemorySink {
    schemas: HashMap<&'static str, &'static [&'static str]>,
    series: Mutex<BTreeMap<(String, Vec<String>), f64>>,
}

impl MemorySink {
    pub fn new(families: &FamilyTable) -> Self {
        Self {
            schemas: families.iter().map(|f| (f.name, f.labels)).collect(),
            series: Mutex::new(BTreeMap::new()),
        }
    }

    /// Value of one series, if present.
    pub fn get(&self, family: &str, labels: &[&str]) -> Option<f64> {
        let key = (
            family.to_string(),
            labels.iter().map(|l| l.to_string()).collect::<Vec<_>>(),
        );
        self.series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
    }

    /// Label values of every series of one family, in order.
    pub fn series_of(&self, family: &str) -> Vec<Vec<String>> {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        series
            .keys()
            .filter(|(name, _)| name == family)
            .map(|(_, labels)| labels.clone())
            .collect()
    }

    /// Number of series held.
    pub fn len(&self) -> usize {
        self.series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All series with label names attached, ordered by family then labels.
    pub fn snapshot(&self) -> Vec<RecordedSample> {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        series
            .iter()
            .map(|((metric, values), value)| {
                let names = self.schemas.get(metric.as_str()).copied().unwrap_or(&[]);
                RecordedSample {
                    metric: metric.clone(),
                    labels: names
                        .iter()
                        .zip(values)
                        .map(|(n, v)| (n.to_string(), v.clone()))
                        .collect(),
                    value: *value,
                }
            })
            .collect()
    }
}

impl MetricSink for MemorySink {
    fn set_gauge(&self, family: &str, labels: &[String], value: f64) -> Result<(), SinkError> {
        let schema = self
            .schemas
            .get(family)
            .ok_or_else(|| SinkError::UnknownFamily(family.to_string()))?;
        if schema.len() != labels.len() {
            return Err(prometheus::Error::InconsistentCardinality {
                expect: schema.len(),
                got: labels.len(),
            }
            .into());
        }
        self.series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((family.to_string(), labels.to_vec()), value);
        Ok(())
    }

    fn retain_instances(&self, observed: &HashSet<String>) -> usize {
        let mut series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        let before = series.len();
        series.retain(|(_, labels), _| labels.first().is_some_and(|i| observed.contains(i)));
        before - series.len()
    }
}
