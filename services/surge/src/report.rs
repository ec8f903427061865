//! Results reporting and formatting.

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use surge_core::{format_big_num, format_bytes, Snapshot};

/// Formats a final snapshot for output.
pub struct ResultsReport;

impl ResultsReport {
    /// Format results as console tables followed by summary lines.
    pub fn format_table(snapshot: &Snapshot) -> String {
        let latency = &snapshot.latency_ms;
        let mut latency_table = Table::new();
        latency_table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Stat", "50%", "97.5%", "99%", "Avg", "Stdev", "Max"]);
        latency_table.add_row(vec![
            "Latency".to_string(),
            format!("{} ms", latency.p50),
            format!("{} ms", latency.p97_5),
            format!("{} ms", latency.p99),
            format!("{:.2} ms", latency.mean),
            format!("{:.2} ms", latency.stddev),
            format!("{} ms", latency.max),
        ]);

        let requests = &snapshot.requests_per_sec;
        let bytes = &snapshot.bytes_per_sec;
        let mut rate_table = Table::new();
        rate_table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Stat", "50%", "97.5%", "99%", "Avg", "Stdev", "Min"]);
        rate_table.add_row(vec![
            "Req/Sec".to_string(),
            format_big_num(requests.p50 as f64),
            format_big_num(requests.p97_5 as f64),
            format_big_num(requests.p99 as f64),
            format_big_num(requests.mean),
            format_big_num(requests.stddev),
            format_big_num(requests.min as f64),
        ]);
        rate_table.add_row(vec![
            "Bytes/Sec".to_string(),
            format_bytes(bytes.p50),
            format_bytes(bytes.p97_5),
            format_bytes(bytes.p99),
            format_bytes(bytes.mean.round() as u64),
            format_bytes(bytes.stddev.round() as u64),
            format_bytes(bytes.min),
        ]);

        let totals = &snapshot.totals;
        let mut out = format!(
            "Load Test Results: {}\n{}\n{}\n\nReq/Bytes counts sampled once per second.\n\n",
            snapshot.name, latency_table, rate_table
        );
        out.push_str(&format!(
            "{} 2xx responses, {} non 2xx responses.\n",
            totals.responses_2xx, totals.responses_non_2xx
        ));
        out.push_str(&format!(
            "{} total requests in {:.1} seconds, {} read.\n",
            format_big_num(totals.total_requests as f64),
            snapshot.duration_secs,
            format_bytes(totals.total_bytes)
        ));
        if totals.errors > 0 {
            out.push_str(&format!(
                "{} total errors ({} timeouts).\n",
                format_big_num(totals.errors as f64),
                format_big_num(totals.timeouts as f64)
            ));
        }
        out
    }

    /// Format results as JSON.
    pub fn format_json(snapshot: &Snapshot) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(snapshot)?)
    }

    /// CSV header matching [`ResultsReport::format_csv`].
    pub fn csv_header() -> &'static str {
        "started_at,name,duration_secs,concurrent_users,total_requests,responses_2xx,errors,timeouts,latency_p50,latency_p99,requests_per_sec_mean,bytes_per_sec_mean"
    }

    /// Format results as CSV row.
    pub fn format_csv(snapshot: &Snapshot) -> String {
        let totals = &snapshot.totals;
        format!(
            "{},{},{:.1},{},{},{},{},{},{},{},{:.1},{:.1}",
            snapshot.started_at,
            snapshot.name,
            snapshot.duration_secs,
            snapshot.concurrent_users,
            totals.total_requests,
            totals.responses_2xx,
            totals.errors,
            totals.timeouts,
            snapshot.latency_ms.p50,
            snapshot.latency_ms.p99,
            snapshot.requests_per_sec.mean,
            snapshot.bytes_per_sec.mean
        )
    }
}
