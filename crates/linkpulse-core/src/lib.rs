pub mod appliance;
pub mod config;
pub mod controller;
pub mod health;
pub mod history;
pub mod input;
pub mod link;
pub mod mode;
pub mod monitor;
pub mod probe;
pub mod sampler;
pub mod snapshot;
pub mod throughput;

#[cfg(test)]
mod controller_tests;
#[cfg(test)]
mod input_tests;

pub use appliance::Appliance;
pub use config::{
    check_throughput_interval, ConfigError, HealthConfig, MetricThresholds, MonitorConfig, StateThreshold,
    THROUGHPUT_INTERVAL_MINUTES,
};
pub use controller::ModeController;
pub use health::{HealthScore, HealthScorer, HealthState, Metric};
pub use history::MetricHistory;
pub use input::{
    Binding, ButtonEvent, ButtonFeed, ChannelInput, ControlRequest, Dispatch, InputDispatcher,
    InputError, InputSubstrate,
};
pub use link::{LinkError, LinkState, NmcliLink};
pub use mode::{Action, ActionTable, ButtonId, Mode};
pub use monitor::{LinkCommand, LinkEvent, LinkMonitor, LinkStatus};
pub use probe::{PingProbe, Probe, ProbeError, ProbeReply};
pub use sampler::Sampler;
pub use snapshot::{HealthBars, Sample, SamplerSnapshot, StatusFrame, ThroughputResult};
pub use throughput::{CommandThroughputTester, Throughput, ThroughputError, ThroughputTester};
