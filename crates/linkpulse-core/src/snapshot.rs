use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::health::HealthScore;
use crate::mode::Mode;

/// One probe cycle's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub ts: DateTime<Utc>,
    pub latency_ms: f64,
    pub jitter_ms: f64,
    pub loss_pct: f64,
    pub answered: u32,
    pub sent: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputResult {
    pub ts: Option<DateTime<Utc>>,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub in_progress: bool,
}

impl Default for ThroughputResult {
    fn default() -> Self {
        Self {
            ts: None,
            download_mbps: 0.0,
            upload_mbps: 0.0,
            in_progress: false,
        }
    }
}

/// Point-in-time copy of everything the sampler owns. Histories are oldest
/// first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplerSnapshot {
    pub ts: Option<DateTime<Utc>>,
    pub target: String,
    pub interface: String,
    pub latency_history: Vec<f64>,
    pub jitter_history: Vec<f64>,
    pub loss_history: Vec<f64>,
    pub last_sample: Option<Sample>,
    pub throughput: ThroughputResult,
    pub samples_taken: u64,
}

impl SamplerSnapshot {
    pub fn latency(&self) -> f64 {
        self.latency_history.last().copied().unwrap_or_default()
    }

    pub fn jitter(&self) -> f64 {
        self.jitter_history.last().copied().unwrap_or_default()
    }

    pub fn loss(&self) -> f64 {
        self.loss_history.last().copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthBars {
    pub latency: f64,
    pub jitter: f64,
    pub loss: f64,
}

/// What the renderer gets each control tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusFrame {
    pub ts: DateTime<Utc>,
    pub mode: Option<Mode>,
    pub screen: u8,
    pub health: HealthScore,
    pub bars: HealthBars,
    pub snapshot: SamplerSnapshot,
}
