use serde::{Deserialize, Serialize};

pub mod quality;

pub use quality::{
    LatencySample, LatencyStats, RecentAverages, RollingWindowSummary, SampleStatus, calculate_mos,
};

/// Messages carried over the measurement channel. The reflector echoes the
/// serialized payload back byte-for-byte; anything else on the channel is not
/// ours and decodes to an error.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum WireMessage {
    #[serde(rename = "latency-probe")]
    LatencyProbe {
        seq: u64,
        /// Monotonic send time, milliseconds since the sender's clock anchor.
        t0: f64,
        /// Wall-clock send time, milliseconds since the UNIX epoch.
        #[serde(rename = "sentAt")]
        sent_at: f64,
    },
}

pub fn encode_message(message: &WireMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

pub fn decode_message(payload: &str) -> Result<WireMessage, serde_json::Error> {
    serde_json::from_str(payload)
}
