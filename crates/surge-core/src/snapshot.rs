//! Final run snapshot handed to the reporting side.

use serde::{Deserialize, Serialize};

/// Percentile and moment summary of one histogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub p50: u64,
    pub p97_5: u64,
    pub p99: u64,
    pub mean: f64,
    pub stddev: f64,
    pub min: u64,
    pub max: u64,
    pub samples: u64,
}

/// Counters accumulated over the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub responses_2xx: u64,
    pub responses_non_2xx: u64,
    /// Every completed response, whatever its status.
    pub total_requests: u64,
    pub total_bytes: u64,
    /// Transport failures, timeouts included.
    pub errors: u64,
    pub timeouts: u64,
}

/// Final test results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    /// RFC 3339 start time.
    pub started_at: String,
    /// Measured wall-clock time from start to stop.
    pub duration_secs: f64,
    pub concurrent_users: u32,
    pub pipelining: u32,

    // Latency of 2xx responses (ms)
    pub latency_ms: HistogramSummary,

    // Sampled once per second
    pub requests_per_sec: HistogramSummary,
    pub bytes_per_sec: HistogramSummary,

    pub totals: Totals,
}

/// Compact count: exact below 1000, rounded thousands with a `k` suffix above.
pub fn format_big_num(value: f64) -> String {
    if value < 1000.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.0}k", (value / 1000.0).round())
    }
}

/// Human-readable byte count in SI units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

    if bytes < 10 {
        return format!("{} B", bytes);
    }

    let mut exponent = 0;
    let mut scale = 1u64;
    while exponent < UNITS.len() - 1 && bytes / scale >= 1000 {
        scale *= 1000;
        exponent += 1;
    }

    let value = ((bytes as f64 / scale as f64) * 10.0 + 0.5).floor() / 10.0;
    if value < 10.0 {
        format!("{:.1} {}", value, UNITS[exponent])
    } else {
        format!("{:.0} {}", value, UNITS[exponent])
    }
}
