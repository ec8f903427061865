//! Fixed-range, fixed-precision HDR histograms.
//!
//! Only the aggregator writes to these, so no synchronization is involved.

use hdrhistogram::Histogram;

use crate::error::{SurgeError, SurgeResult};
use crate::snapshot::HistogramSummary;

/// Latency range in milliseconds.
pub const LATENCY_RANGE: (u64, u64) = (1, 10_000);
/// Requests per second range.
pub const REQUESTS_RANGE: (u64, u64) = (1, 1_000_000);
/// Bytes per second range.
pub const THROUGHPUT_RANGE: (u64, u64) = (1, 100_000_000_000);
/// Relative precision of every histogram.
pub const SIGNIFICANT_DIGITS: u8 = 5;

/// A histogram over `[low, high]`; values above `high` are clamped to it.
pub struct BoundedHistogram {
    inner: Histogram<u64>,
}

impl BoundedHistogram {
    pub fn new(low: u64, high: u64, significant_digits: u8) -> SurgeResult<Self> {
        let inner = Histogram::new_with_bounds(low, high, significant_digits)
            .map_err(|e| SurgeError::Histogram(format!("{:?}", e)))?;
        Ok(Self { inner })
    }

    pub fn latency() -> SurgeResult<Self> {
        Self::new(LATENCY_RANGE.0, LATENCY_RANGE.1, SIGNIFICANT_DIGITS)
    }

    pub fn requests() -> SurgeResult<Self> {
        Self::new(REQUESTS_RANGE.0, REQUESTS_RANGE.1, SIGNIFICANT_DIGITS)
    }

    pub fn throughput() -> SurgeResult<Self> {
        Self::new(THROUGHPUT_RANGE.0, THROUGHPUT_RANGE.1, SIGNIFICANT_DIGITS)
    }

    /// Record a value, clamping it to the configured `high` bound.
    pub fn record(&mut self, value: u64) {
        self.inner.saturating_record(value.min(self.inner.high()));
    }

    /// Value at a percentile in `[0, 100]`; fractional percentiles such as 97.5 are allowed.
    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        self.inner.value_at_percentile(percentile)
    }

    pub fn mean(&self) -> f64 {
        self.inner.mean()
    }

    pub fn stddev(&self) -> f64 {
        self.inner.stdev()
    }

    pub fn min(&self) -> u64 {
        self.inner.min()
    }

    pub fn max(&self) -> u64 {
        self.inner.max()
    }

    /// Number of recorded values.
    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn summary(&self) -> HistogramSummary {
        HistogramSummary {
            p50: self.value_at_percentile(50.0),
            p97_5: self.value_at_percentile(97.5),
            p99: self.value_at_percentile(99.0),
            mean: self.mean(),
            stddev: self.stddev(),
            min: self.min(),
            max: self.max(),
            samples: self.len(),
        }
    }
}

impl std::fmt::Debug for BoundedHistogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedHistogram")
            .field("low", &self.inner.low())
            .field("high", &self.inner.high())
            .field("len", &self.inner.len())
            .finish()
    }
}
