//! Reading data model: samples, per-device metric sets, and the rolling
//! buffer that feeds historical aggregation.
//!
//! A metric either carries a numeric reading or the reserved sentinel -1
//! ("unavailable"), which is what downstream consumers see for a sensor
//! that could not be read. Aggregation averages the valid samples only.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire value for a metric with no valid reading.
pub const SENTINEL: f64 = -1.0;

/// A single metric reading, or the explicit "no valid reading" marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Value(f64),
    Unavailable,
}

impl Sample {
    /// The numeric reading, if this sample carries one.
    pub fn valid(self) -> Option<f64> {
        match self {
            Sample::Value(v) => Some(v),
            Sample::Unavailable => None,
        }
    }

    pub fn is_unavailable(self) -> bool {
        matches!(self, Sample::Unavailable)
    }
}

// On the wire a sample is a bare number; the sentinel is reserved below zero
// so it can never collide with a real reading.
impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Sample::Value(v) => serializer.serialize_f64(*v),
            Sample::Unavailable => serializer.serialize_f64(SENTINEL),
        }
    }
}

impl<'de> Deserialize<'de> for Sample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = f64::deserialize(deserializer)?;
        if v < 0.0 {
            Ok(Sample::Unavailable)
        } else {
            Ok(Sample::Value(v))
        }
    }
}

/// Latest known readings for one device, keyed by metric name.
///
/// The key set is closed: it is fixed by the configured endpoint map and
/// validated at configuration load, so every set written downstream carries
/// the same metrics in the same (sorted) order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSet {
    values: BTreeMap<String, Sample>,
}

impl MetricSet {
    /// The startup/failure default: every metric is the sentinel.
    pub fn unavailable<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        MetricSet {
            values: names
                .into_iter()
                .map(|n| (n.as_ref().to_owned(), Sample::Unavailable))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Sample> {
        self.values.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, sample: Sample) {
        self.values.insert(name.into(), sample);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Sample)> {
        self.values.iter().map(|(n, s)| (n.as_str(), *s))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn all_unavailable(&self) -> bool {
        self.values.values().all(|s| s.is_unavailable())
    }
}

impl FromIterator<(String, Sample)> for MetricSet {
    fn from_iter<T: IntoIterator<Item = (String, Sample)>>(iter: T) -> Self {
        MetricSet {
            values: iter.into_iter().collect(),
        }
    }
}

/// Per-device sample accumulator between historic flushes.
///
/// Samples are appended in arrival order on every successful read, sentinels
/// included; filtering happens at flush time.
#[derive(Debug, Default)]
pub struct ReadingBuffer {
    series: BTreeMap<String, Vec<Sample>>,
}

impl ReadingBuffer {
    pub fn record(&mut self, set: &MetricSet) {
        for (name, sample) in set.iter() {
            self.series.entry(name.to_owned()).or_default().push(sample);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(|samples| samples.is_empty())
    }

    /// Total number of buffered samples across all metrics.
    pub fn sample_count(&self) -> usize {
        self.series.values().map(|samples| samples.len()).sum()
    }

    /// Compute the historic aggregate and clear the buffer.
    ///
    /// Per metric: arithmetic mean of the valid samples, or the sentinel if
    /// none were valid. Returns `None` when nothing was buffered since the
    /// last flush, so an idle device produces no historic record.
    pub fn flush(&mut self) -> Option<MetricSet> {
        if self.is_empty() {
            return None;
        }

        let aggregate = self
            .series
            .iter()
            .map(|(name, samples)| {
                let valid: Vec<f64> = samples.iter().filter_map(|s| s.valid()).collect();
                let sample = if valid.is_empty() {
                    Sample::Unavailable
                } else {
                    Sample::Value(valid.iter().sum::<f64>() / valid.len() as f64)
                };
                (name.clone(), sample)
            })
            .collect();

        for samples in self.series.values_mut() {
            samples.clear();
        }

        Some(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, f64)]) -> MetricSet {
        pairs
            .iter()
            .map(|(n, v)| {
                let sample = if *v < 0.0 {
                    Sample::Unavailable
                } else {
                    Sample::Value(*v)
                };
                (n.to_string(), sample)
            })
            .collect()
    }

    #[test]
    fn sentinel_round_trips_as_minus_one() {
        let json = serde_json::to_string(&Sample::Unavailable).unwrap();
        assert_eq!(json, "-1.0");

        let back: Sample = serde_json::from_str("-1").unwrap();
        assert_eq!(back, Sample::Unavailable);

        let valid: Sample = serde_json::from_str("21.5").unwrap();
        assert_eq!(valid.valid(), Some(21.5));
    }

    #[test]
    fn unavailable_set_covers_the_whole_schema() {
        let set = MetricSet::unavailable(["co2", "temperature"]);
        assert_eq!(set.len(), 2);
        assert!(set.all_unavailable());
        assert_eq!(set.get("co2"), Some(Sample::Unavailable));
    }

    #[test]
    fn aggregate_averages_valid_samples_only() {
        let mut buffer = ReadingBuffer::default();
        buffer.record(&set(&[("t", 10.0)]));
        buffer.record(&set(&[("t", -1.0)]));
        buffer.record(&set(&[("t", 20.0)]));
        buffer.record(&set(&[("t", -1.0)]));

        let aggregate = buffer.flush().unwrap();
        assert_eq!(aggregate.get("t"), Some(Sample::Value(15.0)));
    }

    #[test]
    fn aggregate_is_sentinel_when_no_valid_samples() {
        let mut buffer = ReadingBuffer::default();
        buffer.record(&set(&[("t", -1.0)]));
        buffer.record(&set(&[("t", -1.0)]));

        let aggregate = buffer.flush().unwrap();
        assert_eq!(aggregate.get("t"), Some(Sample::Unavailable));
    }

    #[test]
    fn flush_empties_every_metric() {
        let mut buffer = ReadingBuffer::default();
        buffer.record(&set(&[("co2", 400.0), ("t", 21.0)]));
        assert_eq!(buffer.sample_count(), 2);

        buffer.flush().unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.sample_count(), 0);

        // A drained buffer yields no further historic record.
        assert!(buffer.flush().is_none());
    }

    #[test]
    fn empty_buffer_flushes_to_none() {
        let mut buffer = ReadingBuffer::default();
        assert!(buffer.flush().is_none());
    }
}
