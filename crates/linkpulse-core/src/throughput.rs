use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

#[derive(Debug, Error)]
pub enum ThroughputError {
    #[error("failed to run speed test: {0}")]
    Spawn(String),
    #[error("speed test exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("unparseable speed test output: {0}")]
    Parse(String),
}

/// Long-running bandwidth measurement. Called from its own task, never from
/// the sampling cycle.
#[async_trait]
pub trait ThroughputTester: Send + Sync {
    async fn measure(&self) -> Result<Throughput, ThroughputError>;
}

/// Runs an external speed test that prints a JSON object with `download` and
/// `upload` in bits per second (the `speedtest-cli --json` shape).
#[derive(Debug, Clone)]
pub struct CommandThroughputTester {
    program: String,
    args: Vec<String>,
}

impl CommandThroughputTester {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a shell-like command line on whitespace.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl Default for CommandThroughputTester {
    fn default() -> Self {
        Self::new("speedtest-cli", vec!["--secure".to_string(), "--json".to_string()])
    }
}

#[derive(Debug, Deserialize)]
struct SpeedtestReport {
    download: f64,
    upload: f64,
}

#[async_trait]
impl ThroughputTester for CommandThroughputTester {
    async fn measure(&self) -> Result<Throughput, ThroughputError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| ThroughputError::Spawn(format!("{}: {err}", self.program)))?;

        if !output.status.success() {
            return Err(ThroughputError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_report(&String::from_utf8_lossy(&output.stdout))
    }
}

pub(crate) fn parse_report(stdout: &str) -> Result<Throughput, ThroughputError> {
    let report: SpeedtestReport =
        serde_json::from_str(stdout.trim()).map_err(|err| ThroughputError::Parse(err.to_string()))?;
    Ok(Throughput {
        download_mbps: report.download / 1_000_000.0,
        upload_mbps: report.upload / 1_000_000.0,
    })
}
