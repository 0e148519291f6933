use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, warn};

use crate::link::{LinkError, LinkState};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// One completed look at the uplink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    pub has_credential: bool,
    /// Only checked when there is a credential; false otherwise.
    pub usable: bool,
}

/// Work the mode controller hands to the link task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCommand {
    Revoke,
    BeginProvisioning,
}

/// What the link task reports back, in the order it happened.
#[derive(Debug)]
pub enum LinkEvent {
    Status(LinkStatus),
    Revoked(Result<(), LinkError>),
    ProvisioningStarted(Result<(), LinkError>),
}

/// Owns the [`LinkState`] and performs every call against it on its own
/// task, so slow `nmcli`/`ping` runs never hold up the control loop.
///
/// Checks and commands are handled one at a time; an event published after
/// a command's result always reflects the link as the command left it.
pub struct LinkMonitor<L: LinkState> {
    link: L,
    check_interval: Duration,
    call_timeout: Duration,
    commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl<L: LinkState> LinkMonitor<L> {
    pub fn new(
        link: L,
        check_interval: Duration,
        commands: mpsc::UnboundedReceiver<LinkCommand>,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        Self {
            link,
            check_interval,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            commands,
            events,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.execute(command).await,
                    None => break,
                },
                _ = ticker.tick() => {
                    if let Some(status) = self.check().await {
                        self.send(LinkEvent::Status(status));
                    }
                }
            }
        }

        debug!("link monitor stopped");
    }

    /// Credential first, usability only when there is one. Any failed or
    /// timed-out call drops the whole observation.
    pub async fn check(&self) -> Option<LinkStatus> {
        let has_credential = match self.call(self.link.has_link_credential()).await {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "credential check failed");
                return None;
            }
        };
        if !has_credential {
            return Some(LinkStatus {
                has_credential,
                usable: false,
            });
        }

        match self.call(self.link.is_link_usable()).await {
            Ok(usable) => Some(LinkStatus {
                has_credential,
                usable,
            }),
            Err(err) => {
                warn!(%err, "usability check failed");
                None
            }
        }
    }

    pub async fn execute(&self, command: LinkCommand) {
        let event = match command {
            LinkCommand::Revoke => LinkEvent::Revoked(self.call(self.link.revoke_credential()).await),
            LinkCommand::BeginProvisioning => {
                LinkEvent::ProvisioningStarted(self.call(self.link.begin_provisioning()).await)
            }
        };
        self.send(event);
    }

    async fn call<T>(&self, fut: impl Future<Output = Result<T, LinkError>>) -> Result<T, LinkError> {
        timeout(self.call_timeout, fut)
            .await
            .unwrap_or(Err(LinkError::Timeout(self.call_timeout)))
    }

    fn send(&self, event: LinkEvent) {
        if self.events.send(event).is_err() {
            debug!("mode controller gone, dropping link event");
        }
    }
}
