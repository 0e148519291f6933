use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use linkpulse_core::{check_throughput_interval, ConfigError, MonitorConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Values a user stores with `linkpulsed set`. Unset fields fall back to the
/// built-in defaults; command-line flags win over both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_target: Option<String>,
    /// Minutes between speed tests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_test_interval: Option<u64>,
}

impl Settings {
    pub fn default_path() -> PathBuf {
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".config/linkpulse/settings.json"),
            None => PathBuf::from("/etc/linkpulse/settings.json"),
        }
    }

    /// A missing file is an empty set of settings.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        let settings: Self =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let body = serde_json::to_string_pretty(self)?;
        fs::write(path, body + "\n").with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "settings saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.speed_test_interval {
            Some(minutes) => check_throughput_interval(minutes),
            None => Ok(()),
        }
    }

    /// Applies the given changes and reports whether anything was given.
    /// Nothing changes when a value is out of range.
    pub fn update(
        &mut self,
        ping_target: Option<String>,
        speed_test_interval: Option<u64>,
    ) -> Result<bool, ConfigError> {
        if let Some(minutes) = speed_test_interval {
            check_throughput_interval(minutes)?;
        }
        let changed = ping_target.is_some() || speed_test_interval.is_some();
        if ping_target.is_some() {
            self.ping_target = ping_target;
        }
        if speed_test_interval.is_some() {
            self.speed_test_interval = speed_test_interval;
        }
        Ok(changed)
    }

    /// Seeds `config` with whatever is stored.
    pub fn apply(&self, config: &mut MonitorConfig) {
        if let Some(target) = &self.ping_target {
            config.target = target.clone();
        }
        if let Some(minutes) = self.speed_test_interval {
            config.throughput_interval = Duration::from_secs(minutes * 60);
        }
    }

    pub fn describe(&self, path: &Path) -> String {
        let target = self.ping_target.as_deref().unwrap_or("not set");
        let interval = self
            .speed_test_interval
            .map_or_else(|| "not set".to_string(), |minutes| format!("{minutes} minutes"));
        format!(
            "settings file        : {}\nping target          : {target}\nspeed test interval  : {interval}",
            path.display()
        )
    }
}
