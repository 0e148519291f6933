use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::controller::ModeController;
use crate::health::HealthScorer;
use crate::input::{ButtonEvent, ControlRequest, InputDispatcher, InputSubstrate};
use crate::link::LinkState;
use crate::monitor::{LinkEvent, LinkMonitor};
use crate::probe::Probe;
use crate::sampler::Sampler;
use crate::snapshot::StatusFrame;
use crate::throughput::ThroughputTester;

const STOP_GRACE: Duration = Duration::from_secs(2);

/// The whole engine: background sampler and link monitor plus the
/// foreground control loop that ticks the mode controller, dispatches
/// buttons and publishes a [`StatusFrame`] for whoever renders.
pub struct Appliance<L: LinkState + 'static, I: InputSubstrate> {
    config: MonitorConfig,
    sampler: Sampler,
    scorer: HealthScorer,
    link_monitor: Option<LinkMonitor<L>>,
    link_events: mpsc::UnboundedReceiver<LinkEvent>,
    controller: ModeController<I>,
    dispatcher: InputDispatcher,
    buttons: mpsc::UnboundedReceiver<ButtonEvent>,
    requests: mpsc::UnboundedReceiver<ControlRequest>,
    frames: watch::Sender<Arc<StatusFrame>>,
}

impl<L: LinkState + 'static, I: InputSubstrate> Appliance<L, I> {
    pub fn new(
        config: MonitorConfig,
        probe: Arc<dyn Probe>,
        tester: Arc<dyn ThroughputTester>,
        link: L,
        input: I,
        buttons: mpsc::UnboundedReceiver<ButtonEvent>,
    ) -> Self {
        let sampler = Sampler::new(&config, probe, tester);
        let scorer = HealthScorer::new(config.health.clone(), config.recent_window);
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (event_tx, link_events) = mpsc::unbounded_channel();
        let link_monitor = LinkMonitor::new(link, config.control_tick, commands, event_tx);
        let controller = ModeController::new(input, command_tx);
        let (request_tx, requests) = mpsc::unbounded_channel();
        let dispatcher = InputDispatcher::new(
            config.debounce_window,
            config.total_screens,
            controller.bindings(),
            request_tx,
        );

        let snapshot = sampler.snapshot();
        let first = StatusFrame {
            ts: Utc::now(),
            mode: None,
            screen: dispatcher.screen(),
            health: scorer.score(&snapshot),
            bars: scorer.bars(&snapshot),
            snapshot: (*snapshot).clone(),
        };
        let (frames, _) = watch::channel(Arc::new(first));

        Self {
            config,
            sampler,
            scorer,
            link_monitor: Some(link_monitor),
            link_events,
            controller,
            dispatcher,
            buttons,
            requests,
            frames,
        }
    }

    pub fn frames(&self) -> watch::Receiver<Arc<StatusFrame>> {
        self.frames.subscribe()
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Runs until `shutdown` turns true (or its sender goes away).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            target = %self.config.target,
            interface = %self.config.interface,
            "appliance starting"
        );

        let mut sampler_task = self.spawn_sampler(shutdown.clone());
        let link_task = self
            .link_monitor
            .take()
            .map(|monitor| tokio::spawn(monitor.run(shutdown.clone())));
        let mut ticker = interval(self.config.control_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                joined = &mut sampler_task => {
                    if !*shutdown.borrow() {
                        match joined {
                            Err(err) if err.is_panic() => error!("sampler crashed, restarting"),
                            _ => warn!("sampler exited early, restarting"),
                        }
                    }
                    sampler_task = self.spawn_sampler(shutdown.clone());
                }
                _ = ticker.tick() => {
                    let mode = self.controller.tick();
                    debug!(?mode, "control tick");
                    self.publish_frame();
                }
                Some(event) = self.buttons.recv() => {
                    let outcome = self.dispatcher.on_event(event);
                    debug!(button = ?event.button, ?outcome, "dispatch");
                    self.publish_frame();
                }
                Some(request) = self.requests.recv() => {
                    self.controller.handle(request);
                    self.publish_frame();
                }
                Some(event) = self.link_events.recv() => {
                    debug!(?event, "link event");
                    self.controller.on_link_event(event);
                    self.publish_frame();
                }
            }
        }

        info!("appliance shutting down");
        self.controller.shutdown();
        self.publish_frame();
        if timeout(STOP_GRACE, sampler_task).await.is_err() {
            warn!("sampler did not stop in time");
        }
        if let Some(link_task) = link_task {
            if timeout(STOP_GRACE, link_task).await.is_err() {
                warn!("link monitor did not stop in time");
            }
        }
    }

    fn spawn_sampler(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.sampler.clone().run(shutdown))
    }

    fn publish_frame(&self) {
        let snapshot = self.sampler.snapshot();
        let frame = StatusFrame {
            ts: Utc::now(),
            mode: self.controller.current(),
            screen: self.dispatcher.screen(),
            health: self.scorer.score(&snapshot),
            bars: self.scorer.bars(&snapshot),
            snapshot: (*snapshot).clone(),
        };
        self.frames.send_replace(Arc::new(frame));
    }
}
