use serde::{Deserialize, Serialize};

use crate::config::{HealthConfig, MetricThresholds};
use crate::snapshot::{HealthBars, SamplerSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Critical => "critical",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Excellent => "Network is purring!",
            Self::Good => "All systems go!",
            Self::Fair => "Hanging in there!",
            Self::Poor => "Having hiccups...",
            Self::Critical => "Help, I'm sick!",
        }
    }

    /// Out of five.
    pub fn hearts(self) -> u8 {
        match self {
            Self::Excellent => 5,
            Self::Good => 4,
            Self::Fair => 3,
            Self::Poor => 2,
            Self::Critical => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthScore {
    pub score: u8,
    pub state: HealthState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Latency,
    Jitter,
    Loss,
}

impl Metric {
    fn thresholds(self, config: &HealthConfig) -> &MetricThresholds {
        match self {
            Self::Latency => &config.latency,
            Self::Jitter => &config.jitter,
            Self::Loss => &config.loss,
        }
    }
}

/// Turns sampler history into a composite 0..=100 score.
///
/// Only the last `window` values of each metric are scored. Every value is
/// bucketed against its metric's thresholds, the buckets are averaged and
/// weighted, and the weighted terms are summed. A metric with no history
/// contributes nothing.
#[derive(Debug, Clone)]
pub struct HealthScorer {
    config: HealthConfig,
    window: usize,
}

impl HealthScorer {
    pub fn new(config: HealthConfig, window: usize) -> Self {
        Self { config, window }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    pub fn score(&self, snapshot: &SamplerSnapshot) -> HealthScore {
        self.score_histories(
            &snapshot.latency_history,
            &snapshot.jitter_history,
            &snapshot.loss_history,
        )
    }

    pub fn score_histories(&self, latency: &[f64], jitter: &[f64], loss: &[f64]) -> HealthScore {
        let composite = self.weighted(Metric::Latency, latency)
            + self.weighted(Metric::Jitter, jitter)
            + self.weighted(Metric::Loss, loss);
        let score = composite.clamp(0.0, 100.0).round() as u8;

        HealthScore {
            score,
            state: self.state_for(score),
        }
    }

    pub fn state_for(&self, score: u8) -> HealthState {
        self.config
            .states
            .iter()
            .find(|entry| score >= entry.min_score)
            .map(|entry| entry.state)
            .unwrap_or(HealthState::Critical)
    }

    /// Fraction of the whole history within the metric's healthy bound, 1.0
    /// when there is nothing recorded yet. Drives the per-metric bars.
    pub fn bar_level(&self, metric: Metric, history: &[f64]) -> f64 {
        if history.is_empty() {
            return 1.0;
        }
        let t = metric.thresholds(&self.config);
        let bound = match metric {
            Metric::Latency => t.good,
            Metric::Jitter => t.fair,
            Metric::Loss => t.excellent,
        };
        let bad = history.iter().filter(|v| **v > bound).count();
        1.0 - bad as f64 / history.len() as f64
    }

    pub fn bars(&self, snapshot: &SamplerSnapshot) -> HealthBars {
        HealthBars {
            latency: self.bar_level(Metric::Latency, &snapshot.latency_history),
            jitter: self.bar_level(Metric::Jitter, &snapshot.jitter_history),
            loss: self.bar_level(Metric::Loss, &snapshot.loss_history),
        }
    }

    fn weighted(&self, metric: Metric, history: &[f64]) -> f64 {
        let recent = &history[history.len().saturating_sub(self.window)..];
        if recent.is_empty() {
            return 0.0;
        }
        let t = metric.thresholds(&self.config);
        let total: f64 = recent.iter().map(|v| bucket(*v, t)).sum();
        total / recent.len() as f64 * t.weight
    }
}

fn bucket(value: f64, t: &MetricThresholds) -> f64 {
    if value <= t.excellent {
        100.0
    } else if value <= t.good {
        75.0
    } else if value <= t.fair {
        50.0
    } else if value <= t.poor {
        25.0
    } else {
        0.0
    }
}
