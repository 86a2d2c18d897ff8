use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use common::{LatencySample, SampleStatus};

/// Writes recorded samples to a timestamped CSV in `dir` and returns the
/// file name. Missing latency/jitter cells stay empty rather than 0.
pub fn write_latency_csv(
    dir: &Path,
    samples: &[LatencySample],
    at: DateTime<Utc>,
) -> io::Result<String> {
    let name = format!("latency-probes-{}.csv", at.format("%Y%m%d-%H%M%S"));

    let mut contents = String::from("seq,status,latency_ms,jitter_ms,at\n");
    for sample in samples {
        let status = match sample.status {
            SampleStatus::Received => "received",
            SampleStatus::Lost => "lost",
        };
        let latency = sample
            .latency_ms
            .map(|value| format!("{value:.3}"))
            .unwrap_or_default();
        let jitter = sample
            .jitter_ms
            .map(|value| format!("{value:.3}"))
            .unwrap_or_default();
        contents.push_str(&format!(
            "{},{},{},{},{}\n",
            sample.seq,
            status,
            latency,
            jitter,
            sample.at.to_rfc3339()
        ));
    }

    fs::create_dir_all(dir)?;
    fs::write(dir.join(&name), contents)?;
    Ok(name)
}
