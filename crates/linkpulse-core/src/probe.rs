use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReply {
    pub answered: bool,
    pub rtt_ms: f64,
}

impl ProbeReply {
    pub fn answered(rtt_ms: f64) -> Self {
        Self {
            answered: true,
            rtt_ms,
        }
    }

    pub fn lost() -> Self {
        Self {
            answered: false,
            rtt_ms: 0.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,
    #[error("failed to run probe: {0}")]
    Spawn(String),
    #[error("unparseable probe output: {0}")]
    Parse(String),
}

/// A single echo towards `target`. Implementations must return within
/// roughly `timeout`; the sampler enforces it anyway.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, target: &str, timeout: Duration) -> Result<ProbeReply, ProbeError>;
}

/// Shells out to the system `ping`, one echo per call.
#[derive(Debug, Clone)]
pub struct PingProbe {
    interface: Option<String>,
}

impl PingProbe {
    pub fn new(interface: Option<String>) -> Self {
        Self { interface }
    }
}

#[async_trait]
impl Probe for PingProbe {
    async fn probe(&self, target: &str, wait: Duration) -> Result<ProbeReply, ProbeError> {
        // iputils only takes whole seconds for -W
        let wait_secs = wait.as_secs_f64().ceil().max(1.0) as u64;

        let mut cmd = Command::new("ping");
        cmd.arg("-n")
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg(wait_secs.to_string());
        if let Some(interface) = &self.interface {
            cmd.arg("-I").arg(interface);
        }
        cmd.arg(target)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = timeout(Duration::from_secs(wait_secs) + Duration::from_millis(500), cmd.output())
            .await
            .map_err(|_| ProbeError::Timeout)?
            .map_err(|err| ProbeError::Spawn(err.to_string()))?;

        if !output.status.success() {
            return Ok(ProbeReply::lost());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_rtt(&stdout)
            .map(ProbeReply::answered)
            .ok_or_else(|| ProbeError::Parse(stdout.lines().next().unwrap_or_default().to_string()))
    }
}

/// Pulls the round-trip time out of a `ping` reply line (`time=12.3 ms`).
pub(crate) fn parse_rtt(output: &str) -> Option<f64> {
    output.lines().find_map(|line| {
        let rest = line.split("time=").nth(1)?;
        let value = rest.split_whitespace().next()?;
        value.trim_end_matches("ms").parse::<f64>().ok()
    })
}
