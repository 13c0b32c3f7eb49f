use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Destination for scalar training metrics.
pub trait MetricsSink: Send {
    fn log_metric(&mut self, name: &str, value: f64, step: usize);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    pub value: f64,
    pub step: usize,
}

/// Emits every metric as a structured `tracing` event.
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics {
    experiment: String,
}

impl TracingMetrics {
    pub fn new(experiment: impl Into<String>) -> Self {
        Self {
            experiment: experiment.into(),
        }
    }
}

impl MetricsSink for TracingMetrics {
    fn log_metric(&mut self, name: &str, value: f64, step: usize) {
        tracing::info!(
            experiment = %self.experiment,
            metric = name,
            value,
            step,
            "metric"
        );
    }
}

/// Keeps metrics in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetrics {
    records: Arc<Mutex<Vec<MetricRecord>>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<MetricRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn values(&self, name: &str) -> Vec<f64> {
        self.records()
            .into_iter()
            .filter(|r| r.name == name)
            .map(|r| r.value)
            .collect()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn log_metric(&mut self, name: &str, value: f64, step: usize) {
        if let Ok(mut records) = self.records.lock() {
            records.push(MetricRecord {
                name: name.to_string(),
                value,
                step,
            });
        }
    }
}
