//! Concurrent metric aggregation.
//!
//! Every worker records into the same [`MetricCollector`]. The series map is
//! published through an [`ArcSwap`], so recording into an existing series never
//! takes a lock on the map; the map itself is only copied when a new
//! (name, tags) pair shows up. Within a series, counters and trend pushes are
//! lock-free and rates hold a per-series mutex just long enough to bump two
//! integers. Trend samples are moved out of their bucket into a sorted buffer
//! whenever the series is read, so each sample is only sorted once.
use arc_swap::ArcSwap;
use metrics_util::AtomicBucket;
use rampart_core::{Aggregate, MetricKey, MetricKind, MetricSample, MetricSelector, MetricSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Default)]
pub struct MetricCollector {
    series: ArcSwap<HashMap<MetricKey, Arc<Series>>>,
}

impl MetricCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sample: MetricSample) {
        #[cfg(feature = "metrics")]
        export(&sample);

        let key = sample.key();
        let series = self.series_for(key, sample.kind);
        if series.kind() != sample.kind {
            debug!(
                "Dropping {} sample for {}: series is a {}.",
                sample.kind,
                sample.name,
                series.kind()
            );
            return;
        }
        series.observe(sample.value);
    }

    /// Creates an empty series so it shows up in snapshots before any sample arrives.
    pub fn register(&self, key: MetricKey, kind: MetricKind) {
        self.series_for(key, kind);
    }

    /// Consistent copy of every series. Samples recorded concurrently with the
    /// call may or may not be included.
    pub fn snapshot(&self) -> MetricSnapshot {
        self.series
            .load()
            .iter()
            .map(|(key, series)| (key.clone(), series.aggregate()))
            .collect()
    }

    /// Like [`snapshot`](Self::snapshot), restricted to the series matched by
    /// at least one selector.
    pub fn snapshot_matching(&self, selectors: &[MetricSelector]) -> MetricSnapshot {
        self.series
            .load()
            .iter()
            .filter(|(key, _)| selectors.iter().any(|s| s.matches(key)))
            .map(|(key, series)| (key.clone(), series.aggregate()))
            .collect()
    }

    fn series_for(&self, key: MetricKey, kind: MetricKind) -> Arc<Series> {
        loop {
            if let Some(series) = self.series.load().get(&key) {
                return series.clone();
            }

            self.series.rcu(|current| {
                let mut next = HashMap::clone(current);
                next.entry(key.clone())
                    .or_insert_with(|| Arc::new(Series::new(kind)));
                next
            });
        }
    }
}

enum Series {
    /// f64 bits.
    Counter(AtomicU64),
    Trend(TrendCell),
    Rate(Mutex<RateCell>),
}

struct TrendCell {
    pending: AtomicBucket<f64>,
    /// Sorted ascending.
    settled: Mutex<Vec<f64>>,
}

impl TrendCell {
    fn new() -> Self {
        Self {
            pending: AtomicBucket::new(),
            settled: Mutex::new(vec![]),
        }
    }

    fn settle(&self) -> Vec<f64> {
        let mut settled = self.settled.lock().unwrap_or_else(PoisonError::into_inner);
        let mut fresh = vec![];
        self.pending
            .clear_with(|chunk| fresh.extend_from_slice(chunk));
        if !fresh.is_empty() {
            fresh.sort_by(f64::total_cmp);
            *settled = merge_sorted(&settled, &fresh);
        }
        settled.clone()
    }
}

fn merge_sorted(left: &[f64], right: &[f64]) -> Vec<f64> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if left[i].total_cmp(&right[j]).is_le() {
            merged.push(left[i]);
            i += 1;
        } else {
            merged.push(right[j]);
            j += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    merged
}

#[derive(Default, Clone, Copy)]
struct RateCell {
    trues: u64,
    total: u64,
}

impl Series {
    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Series::Counter(AtomicU64::new(0f64.to_bits())),
            MetricKind::Trend => Series::Trend(TrendCell::new()),
            MetricKind::Rate => Series::Rate(Mutex::new(RateCell::default())),
        }
    }

    fn kind(&self) -> MetricKind {
        match self {
            Series::Counter(_) => MetricKind::Counter,
            Series::Trend(_) => MetricKind::Trend,
            Series::Rate(_) => MetricKind::Rate,
        }
    }

    fn observe(&self, value: f64) {
        match self {
            Series::Counter(bits) => {
                // The closure always returns Some, so this cannot fail.
                let _ = bits.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    Some((f64::from_bits(current) + value).to_bits())
                });
            }
            Series::Trend(cell) => cell.pending.push(value),
            Series::Rate(cell) => {
                let mut cell = cell.lock().unwrap_or_else(PoisonError::into_inner);
                cell.total += 1;
                if value != 0. {
                    cell.trues += 1;
                }
            }
        }
    }

    fn aggregate(&self) -> Aggregate {
        match self {
            Series::Counter(bits) => Aggregate::Counter {
                value: f64::from_bits(bits.load(Ordering::Acquire)),
            },
            Series::Trend(cell) => Aggregate::Trend {
                values: cell.settle(),
            },
            Series::Rate(cell) => {
                let cell = *cell.lock().unwrap_or_else(PoisonError::into_inner);
                Aggregate::Rate {
                    trues: cell.trues,
                    total: cell.total,
                }
            }
        }
    }
}

/// Forwards a sample to the `metrics` facade so any installed exporter sees it.
#[cfg(feature = "metrics")]
fn export(sample: &MetricSample) {
    let labels: Vec<metrics::Label> = sample
        .tags
        .iter()
        .map(|(k, v)| metrics::Label::new(k.clone(), v.clone()))
        .collect();

    match sample.kind {
        MetricKind::Counter => {
            metrics::counter!(sample.name.clone(), labels).increment(sample.value.max(0.) as u64)
        }
        MetricKind::Trend => metrics::histogram!(sample.name.clone(), labels).record(sample.value),
        MetricKind::Rate => {
            metrics::counter!(format!("{}_total", sample.name), labels.clone()).increment(1);
            if sample.value != 0. {
                metrics::counter!(format!("{}_true", sample.name), labels).increment(1);
            }
        }
    }
}
