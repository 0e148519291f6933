use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::history::MetricHistory;
use crate::probe::Probe;
use crate::snapshot::{Sample, SamplerSnapshot, ThroughputResult};
use crate::throughput::ThroughputTester;

const PROBE_GRACE: Duration = Duration::from_millis(500);

/// Owns the metric histories and the latest throughput result.
///
/// Every mutation happens under one short lock and ends with a fresh
/// [`SamplerSnapshot`] being swapped into a watch channel, so readers only
/// ever see whole snapshots. Cloning a `Sampler` yields another handle to the
/// same state.
#[derive(Clone)]
pub struct Sampler {
    shared: Arc<Shared>,
}

struct Shared {
    target: String,
    interface: String,
    probe_count: u32,
    probe_timeout: Duration,
    sample_interval: Duration,
    throughput_interval: Duration,
    probe: Arc<dyn Probe>,
    tester: Arc<dyn ThroughputTester>,
    state: Mutex<SamplerState>,
    in_flight: AtomicBool,
    publisher: watch::Sender<Arc<SamplerSnapshot>>,
}

struct SamplerState {
    latency: MetricHistory,
    jitter: MetricHistory,
    loss: MetricHistory,
    throughput: ThroughputResult,
    last_throughput_start: Option<Instant>,
    last_sample: Option<Sample>,
    samples_taken: u64,
}

impl Sampler {
    pub fn new(
        config: &MonitorConfig,
        probe: Arc<dyn Probe>,
        tester: Arc<dyn ThroughputTester>,
    ) -> Self {
        let state = SamplerState {
            latency: MetricHistory::new(config.history_capacity),
            jitter: MetricHistory::new(config.history_capacity),
            loss: MetricHistory::new(config.history_capacity),
            throughput: ThroughputResult::default(),
            last_throughput_start: None,
            last_sample: None,
            samples_taken: 0,
        };
        let initial = SamplerSnapshot {
            target: config.target.clone(),
            interface: config.interface.clone(),
            ..SamplerSnapshot::default()
        };
        let (publisher, _) = watch::channel(Arc::new(initial));

        Self {
            shared: Arc::new(Shared {
                target: config.target.clone(),
                interface: config.interface.clone(),
                probe_count: config.probe_count.max(1),
                probe_timeout: config.probe_timeout,
                sample_interval: config.sample_interval,
                throughput_interval: config.throughput_interval,
                probe,
                tester,
                state: Mutex::new(state),
                in_flight: AtomicBool::new(false),
                publisher,
            }),
        }
    }

    /// Runs one probe batch and records it. Probe failures and timeouts count
    /// as lost echoes; a fully lost batch is still a recorded sample.
    pub async fn sample(&self) -> Sample {
        let shared = &self.shared;
        let mut rtts = Vec::with_capacity(shared.probe_count as usize);

        for _ in 0..shared.probe_count {
            let attempt = timeout(
                shared.probe_timeout + PROBE_GRACE,
                shared.probe.probe(&shared.target, shared.probe_timeout),
            )
            .await;
            match attempt {
                Ok(Ok(reply)) if reply.answered => rtts.push(reply.rtt_ms),
                Ok(Ok(_)) => {}
                Ok(Err(err)) => debug!(target = %shared.target, %err, "probe failed"),
                Err(_) => debug!(target = %shared.target, "probe timed out"),
            }
        }

        let sample = summarize(Utc::now(), &rtts, shared.probe_count);
        self.record(sample);
        sample
    }

    /// Starts a throughput test on its own task when the interval has passed
    /// and none is running. Returns whether this call started one; a call that
    /// loses the race is dropped, not queued.
    pub fn maybe_start_throughput_test(&self) -> bool {
        self.maybe_start_throughput_test_at(Instant::now())
    }

    pub(crate) fn maybe_start_throughput_test_at(&self, now: Instant) -> bool {
        let shared = &self.shared;
        if shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        {
            let mut state = shared.lock_state();
            let due = state
                .last_throughput_start
                .map_or(true, |started| now.saturating_duration_since(started) > shared.throughput_interval);
            if !due {
                shared.in_flight.store(false, Ordering::Release);
                return false;
            }
            state.last_throughput_start = Some(now);
            state.throughput.in_progress = true;
            shared.publish(&state);
        }

        info!("starting throughput test");
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.run_throughput_test().await });
        true
    }

    pub fn is_throughput_running(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Arc<SamplerSnapshot> {
        self.shared.publisher.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SamplerSnapshot>> {
        self.shared.publisher.subscribe()
    }

    /// Probe cycle: sample, then maybe kick off a throughput test, every
    /// `sample_interval` until `shutdown` flips. A throughput test that is
    /// still running at shutdown is left to die with the runtime.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.shared.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            let cycle = async {
                ticker.tick().await;
                self.sample().await
            };
            tokio::select! {
                _ = shutdown.changed() => break,
                sample = cycle => {
                    debug!(
                        latency_ms = sample.latency_ms,
                        jitter_ms = sample.jitter_ms,
                        loss_pct = sample.loss_pct,
                        "sample"
                    );
                    self.maybe_start_throughput_test();
                }
            }
        }

        debug!("sampler stopped");
    }

    fn record(&self, sample: Sample) {
        let mut state = self.shared.lock_state();
        if sample.answered > 0 {
            state.latency.push(sample.latency_ms);
            state.jitter.push(sample.jitter_ms);
        }
        state.loss.push(sample.loss_pct);
        state.last_sample = Some(sample);
        state.samples_taken += 1;
        self.shared.publish(&state);
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SamplerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SamplerState) {
        let snapshot = SamplerSnapshot {
            ts: Some(Utc::now()),
            target: self.target.clone(),
            interface: self.interface.clone(),
            latency_history: state.latency.to_vec(),
            jitter_history: state.jitter.to_vec(),
            loss_history: state.loss.to_vec(),
            last_sample: state.last_sample,
            throughput: state.throughput,
            samples_taken: state.samples_taken,
        };
        self.publisher.send_replace(Arc::new(snapshot));
    }

    async fn run_throughput_test(&self) {
        let result = self.tester.measure().await;

        let mut state = self.lock_state();
        match result {
            Ok(measured) => {
                info!(
                    download_mbps = measured.download_mbps,
                    upload_mbps = measured.upload_mbps,
                    "throughput test finished"
                );
                state.throughput = ThroughputResult {
                    ts: Some(Utc::now()),
                    download_mbps: measured.download_mbps,
                    upload_mbps: measured.upload_mbps,
                    in_progress: false,
                };
            }
            Err(err) => {
                warn!(%err, "throughput test failed, keeping previous result");
                state.throughput.in_progress = false;
            }
        }
        self.in_flight.store(false, Ordering::Release);
        self.publish(&state);
    }
}

/// Reduces one batch of round-trip times to a sample. Jitter is the sample
/// standard deviation and needs two answers.
pub(crate) fn summarize(ts: DateTime<Utc>, rtts: &[f64], sent: u32) -> Sample {
    let answered = rtts.len() as u32;
    let sent = sent.max(answered).max(1);
    let loss_pct = f64::from(sent - answered) / f64::from(sent) * 100.0;

    let latency_ms = if rtts.is_empty() {
        0.0
    } else {
        rtts.iter().sum::<f64>() / rtts.len() as f64
    };

    let jitter_ms = if rtts.len() >= 2 {
        let variance = rtts
            .iter()
            .map(|rtt| (rtt - latency_ms).powi(2))
            .sum::<f64>()
            / (rtts.len() - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    Sample {
        ts,
        latency_ms,
        jitter_ms,
        loss_pct,
        answered,
        sent,
    }
}
