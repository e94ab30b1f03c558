use std::collections::BTreeMap;

use metrics::{SharedString, Unit};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use metrics_util::{CompositeKey, MetricKind};

use crate::attributes::AttributeSet;
use crate::registry::Meter;

/// A recorder local to one test, so parallel tests never observe each other's samples.
pub struct TestRecorder {
    meter: Meter,
    snapshotter: Snapshotter,
}

impl TestRecorder {
    pub fn new() -> Self {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        Self {
            meter: Meter::from_recorder(recorder),
            snapshotter,
        }
    }

    pub fn meter(&self) -> Meter {
        self.meter.clone()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let entries = self
            .snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(Entry::from_parts)
            .collect();
        MetricsSnapshot { entries }
    }
}

impl Default for TestRecorder {
    fn default() -> Self {
        Self::new()
    }
}

type Labels = BTreeMap<String, String>;

struct Entry {
    kind: MetricKind,
    name: String,
    labels: Labels,
    unit: Option<Unit>,
    description: Option<SharedString>,
    value: DebugValue,
}

impl Entry {
    fn from_parts(
        (key, unit, description, value): (
            CompositeKey,
            Option<Unit>,
            Option<SharedString>,
            DebugValue,
        ),
    ) -> Self {
        let labels = key
            .key()
            .labels()
            .map(|label| (label.key().to_string(), label.value().to_string()))
            .collect();
        Self {
            kind: key.kind(),
            name: key.key().name().to_string(),
            labels,
            unit,
            description,
            value,
        }
    }
}

fn labels_of(attributes: &AttributeSet) -> Labels {
    attributes
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// A point in time view of every series a [`TestRecorder`] has seen.
pub struct MetricsSnapshot {
    entries: Vec<Entry>,
}

impl MetricsSnapshot {
    /// The value of the counter with exactly these attributes.
    pub fn counter(&self, name: &str, attributes: &AttributeSet) -> Option<u64> {
        let labels = labels_of(attributes);
        self.entries
            .iter()
            .filter(|e| e.kind == MetricKind::Counter && e.name == name && e.labels == labels)
            .find_map(|e| match e.value {
                DebugValue::Counter(v) => Some(v),
                _ => None,
            })
    }

    /// Every series of a counter, as label maps and values.
    pub fn counters(&self, name: &str) -> Vec<(BTreeMap<String, String>, u64)> {
        self.entries
            .iter()
            .filter(|e| e.kind == MetricKind::Counter && e.name == name)
            .filter_map(|e| match e.value {
                DebugValue::Counter(v) => Some((e.labels.clone(), v)),
                _ => None,
            })
            .collect()
    }

    /// The observations of the histogram with exactly these attributes, ascending.
    pub fn histogram(&self, name: &str, attributes: &AttributeSet) -> Option<Vec<f64>> {
        let labels = labels_of(attributes);
        self.entries
            .iter()
            .filter(|e| e.kind == MetricKind::Histogram && e.name == name && e.labels == labels)
            .find_map(|e| match &e.value {
                DebugValue::Histogram(values) => {
                    Some(sorted(values.iter().map(|v| v.into_inner()).collect()))
                }
                _ => None,
            })
    }

    /// Every series of a histogram, as label maps and ascending observations.
    pub fn histograms(&self, name: &str) -> Vec<(BTreeMap<String, String>, Vec<f64>)> {
        self.entries
            .iter()
            .filter(|e| e.kind == MetricKind::Histogram && e.name == name)
            .filter_map(|e| match &e.value {
                DebugValue::Histogram(values) => Some((
                    e.labels.clone(),
                    sorted(values.iter().map(|v| v.into_inner()).collect()),
                )),
                _ => None,
            })
            .collect()
    }

    /// Unit and description of a metric, once it has at least one series.
    pub fn description(&self, name: &str) -> Option<(Option<Unit>, String)> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.description.as_ref().map(|d| (e.unit, d.to_string())))
    }
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values
}

/// Index of the bucket an observation falls in, for a list of upper bounds. Observations
/// above the last bound land in the overflow bucket at `bounds.len()`.
pub fn bucket_index(bounds: &[f64], value: f64) -> usize {
    bounds
        .iter()
        .position(|bound| value <= *bound)
        .unwrap_or(bounds.len())
}
