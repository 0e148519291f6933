use std::ops::RangeInclusive;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::health::HealthState;

/// Speed test intervals a user may store, in minutes.
pub const THROUGHPUT_INTERVAL_MINUTES: RangeInclusive<u64> = 5..=1440;

#[derive(Debug, Clone, Serialize)]
pub struct MonitorConfig {
    pub target: String,
    pub interface: String,
    pub probe_count: u32,
    pub probe_timeout: Duration,
    pub sample_interval: Duration,
    pub history_capacity: usize,
    pub recent_window: usize,
    pub throughput_interval: Duration,
    pub control_tick: Duration,
    pub debounce_window: Duration,
    pub total_screens: u8,
    pub health: HealthConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target: "1.1.1.1".to_string(),
            interface: "wlan0".to_string(),
            probe_count: 5,
            probe_timeout: Duration::from_secs(1),
            sample_interval: Duration::from_secs(1),
            history_capacity: 300,
            recent_window: 20,
            throughput_interval: Duration::from_secs(30 * 60),
            control_tick: Duration::from_secs(1),
            debounce_window: Duration::from_millis(300),
            total_screens: 4,
            health: HealthConfig::default(),
        }
    }
}

/// Bucket bounds for one metric. A value at or below `excellent` scores 100,
/// at or below `good` 75, `fair` 50, `poor` 25, anything above 0.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricThresholds {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
    pub poor: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StateThreshold {
    pub state: HealthState,
    pub min_score: u8,
}

/// The one table every health consumer reads from.
#[derive(Debug, Clone, Serialize)]
pub struct HealthConfig {
    pub latency: MetricThresholds,
    pub jitter: MetricThresholds,
    pub loss: MetricThresholds,
    /// Ordered from the highest `min_score` down.
    pub states: Vec<StateThreshold>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            latency: MetricThresholds {
                excellent: 20.0,
                good: 30.0,
                fair: 60.0,
                poor: 100.0,
                weight: 0.4,
            },
            jitter: MetricThresholds {
                excellent: 5.0,
                good: 15.0,
                fair: 30.0,
                poor: 50.0,
                weight: 0.4,
            },
            loss: MetricThresholds {
                excellent: 0.0,
                good: 0.1,
                fair: 0.5,
                poor: 1.0,
                weight: 0.2,
            },
            states: vec![
                StateThreshold { state: HealthState::Excellent, min_score: 90 },
                StateThreshold { state: HealthState::Good, min_score: 70 },
                StateThreshold { state: HealthState::Fair, min_score: 60 },
                StateThreshold { state: HealthState::Poor, min_score: 50 },
                StateThreshold { state: HealthState::Critical, min_score: 0 },
            ],
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("metric weights must sum to 1.0, got {0}")]
    WeightSum(f64),
    #[error("{0} thresholds must be ascending (excellent <= good <= fair <= poor)")]
    ThresholdOrder(&'static str),
    #[error("health state table must be non-empty and strictly descending")]
    StateOrder,
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("recent window ({window}) exceeds history capacity ({capacity})")]
    WindowTooLarge { window: usize, capacity: usize },
    #[error("speed test interval must be between 5 and 1440 minutes, got {0}")]
    ThroughputIntervalRange(u64),
}

pub fn check_throughput_interval(minutes: u64) -> Result<(), ConfigError> {
    if THROUGHPUT_INTERVAL_MINUTES.contains(&minutes) {
        Ok(())
    } else {
        Err(ConfigError::ThroughputIntervalRange(minutes))
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_count == 0 {
            return Err(ConfigError::Zero("probe count"));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Zero("history capacity"));
        }
        if self.recent_window == 0 {
            return Err(ConfigError::Zero("recent window"));
        }
        if self.total_screens == 0 {
            return Err(ConfigError::Zero("total screens"));
        }
        if self.throughput_interval.is_zero() {
            return Err(ConfigError::Zero("throughput interval"));
        }
        if self.recent_window > self.history_capacity {
            return Err(ConfigError::WindowTooLarge {
                window: self.recent_window,
                capacity: self.history_capacity,
            });
        }
        self.health.validate()
    }
}

impl HealthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, t) in [
            ("latency", &self.latency),
            ("jitter", &self.jitter),
            ("loss", &self.loss),
        ] {
            if !(t.excellent <= t.good && t.good <= t.fair && t.fair <= t.poor) {
                return Err(ConfigError::ThresholdOrder(name));
            }
        }

        let sum = self.latency.weight + self.jitter.weight + self.loss.weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::WeightSum(sum));
        }

        let descending = self
            .states
            .windows(2)
            .all(|pair| pair[0].min_score > pair[1].min_score);
        if self.states.is_empty() || !descending {
            return Err(ConfigError::StateOrder);
        }

        Ok(())
    }
}
