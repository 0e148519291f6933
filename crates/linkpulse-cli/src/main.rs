use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use linkpulse_core::{
    Appliance, ButtonEvent, ChannelInput, CommandThroughputTester, HealthScorer, MonitorConfig,
    NmcliLink, PingProbe, Probe, Sampler, StatusFrame, ThroughputTester,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

mod report;
mod settings;
mod viewer;
#[cfg(test)]
mod settings_tests;

#[derive(Debug, Parser)]
#[command(name = "linkpulsed")]
#[command(about = "Network health monitor for a small handheld appliance")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Stored settings, written by `set` [default: ~/.config/linkpulse/settings.json].
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to probe; overrides the stored ping target [default: 1.1.1.1].
    #[arg(long)]
    target: Option<String>,

    /// Wireless interface carrying the uplink.
    #[arg(long, default_value = "wlan0")]
    interface: String,

    #[arg(long, default_value_t = 5)]
    probe_count: u32,

    #[arg(long, default_value_t = 1000)]
    probe_timeout_ms: u64,

    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    #[arg(long, default_value_t = 300)]
    history_capacity: usize,

    #[arg(long, default_value_t = 20)]
    recent_window: usize,

    /// Overrides the stored speed test interval [default: 30].
    #[arg(long)]
    throughput_interval_min: Option<u64>,

    #[arg(long, default_value_t = 1000)]
    tick_ms: u64,

    #[arg(long, default_value_t = 300)]
    debounce_ms: u64,

    #[arg(long, default_value_t = 4)]
    total_screens: u8,

    /// Speed test command printing `{"download": bps, "upload": bps}`.
    #[arg(long, default_value = "speedtest-cli --secure --json")]
    throughput_command: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Take one sample and score it.
    Once {
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
    /// Run headless, printing a status frame every control tick.
    Run {
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    /// Terminal dashboard; keys a/b/x/y act as the panel buttons.
    View {
        #[arg(long, default_value_t = 180.0)]
        window_sec: f64,
    },
    /// Print the stored settings and the effective configuration.
    Show,
    /// Store settings used by every later run.
    Set {
        #[arg(long)]
        ping_target: Option<String>,
        /// Minutes between speed tests, 5 to 1440.
        #[arg(long)]
        speed_test_interval: Option<u64>,
    },
    /// Join a network so provisioning can finish.
    Connect {
        #[arg(long)]
        ssid: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Ndjson,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings.clone().unwrap_or_else(Settings::default_path)
    }

    fn monitor_config(&self, settings: &Settings) -> MonitorConfig {
        let mut config = MonitorConfig {
            interface: self.interface.clone(),
            probe_count: self.probe_count,
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            sample_interval: Duration::from_millis(self.interval_ms),
            history_capacity: self.history_capacity,
            recent_window: self.recent_window,
            control_tick: Duration::from_millis(self.tick_ms),
            debounce_window: Duration::from_millis(self.debounce_ms),
            total_screens: self.total_screens,
            ..MonitorConfig::default()
        };
        settings.apply(&mut config);
        if let Some(target) = &self.target {
            config.target = target.clone();
        }
        if let Some(minutes) = self.throughput_interval_min {
            config.throughput_interval = Duration::from_secs(minutes * 60);
        }
        config
    }

    fn tester(&self) -> Result<CommandThroughputTester> {
        CommandThroughputTester::from_command_line(&self.throughput_command)
            .context("--throughput-command is empty")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries status frames, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let settings_path = cli.settings_path();
    let mut settings = Settings::load(&settings_path)?;
    let config = cli.monitor_config(&settings);
    config.validate().context("invalid configuration")?;

    let probe: Arc<dyn Probe> = Arc::new(PingProbe::new(Some(config.interface.clone())));
    let tester: Arc<dyn ThroughputTester> = Arc::new(cli.tester()?);

    match cli.command {
        Command::Show => {
            println!("{}\n", settings.describe(&settings_path));
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Set {
            ping_target,
            speed_test_interval,
        } => {
            if settings.update(ping_target, speed_test_interval)? {
                settings.save(&settings_path)?;
                println!("{}", settings.describe(&settings_path));
            } else {
                println!("nothing to set, see `linkpulsed set --help`");
            }
        }
        Command::Connect { ssid, password } => {
            let link = NmcliLink::new(&config.interface, &config.target, probe, config.probe_timeout);
            link.install_credential(&ssid, &password).await?;
            println!("connected {} to {ssid}", config.interface);
        }
        Command::Once { format } => {
            let frame = sample_once(&config, probe, tester).await;
            report::print_frame(&frame, format)?;
        }
        Command::Run { format } => {
            let (input, buttons) = ChannelInput::new();
            let appliance = build(&config, probe, tester, input, buttons);
            stream_loop(appliance, format).await?;
        }
        Command::View { window_sec } => {
            let (input, buttons) = ChannelInput::new();
            let feed = input.feed();
            let appliance = build(&config, probe, tester, input, buttons);
            let frames = appliance.frames();
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let task = tokio::spawn(appliance.run(shutdown_rx));

            let result = viewer::run_viewer(frames, feed, window_sec).await;
            let _ = shutdown_tx.send(true);
            task.await.context("appliance task")?;
            result?;
        }
    }

    Ok(())
}

fn build(
    config: &MonitorConfig,
    probe: Arc<dyn Probe>,
    tester: Arc<dyn ThroughputTester>,
    input: ChannelInput,
    buttons: mpsc::UnboundedReceiver<ButtonEvent>,
) -> Appliance<NmcliLink, ChannelInput> {
    let link = NmcliLink::new(
        &config.interface,
        &config.target,
        Arc::clone(&probe),
        config.probe_timeout,
    );
    Appliance::new(config.clone(), probe, tester, link, input, buttons)
}

/// A single sample with no mode evaluation; no throughput test is started.
async fn sample_once(
    config: &MonitorConfig,
    probe: Arc<dyn Probe>,
    tester: Arc<dyn ThroughputTester>,
) -> StatusFrame {
    let sampler = Sampler::new(config, probe, tester);
    let scorer = HealthScorer::new(config.health.clone(), config.recent_window);
    sampler.sample().await;
    let snapshot = sampler.snapshot();

    StatusFrame {
        ts: Utc::now(),
        mode: None,
        screen: 1,
        health: scorer.score(&snapshot),
        bars: scorer.bars(&snapshot),
        snapshot: (*snapshot).clone(),
    }
}

async fn stream_loop(appliance: Appliance<NmcliLink, ChannelInput>, format: OutputFormat) -> Result<()> {
    let mut frames = appliance.frames();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(appliance.run(shutdown_rx));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("received ctrl-c, stopping");
                break;
            }
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = Arc::clone(&frames.borrow_and_update());
                report::print_frame(&frame, format)?;
                debug!(
                    mode = ?frame.mode,
                    score = frame.health.score,
                    samples = frame.snapshot.samples_taken,
                    "frame"
                );
            }
        }
    }

    let _ = shutdown_tx.send(true);
    task.await.context("appliance task")?;
    Ok(())
}
