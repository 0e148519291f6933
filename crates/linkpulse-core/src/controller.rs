use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::input::{Binding, ControlRequest, InputError, InputSubstrate};
use crate::mode::Mode;
use crate::monitor::{LinkCommand, LinkEvent, LinkStatus};

/// Drives the appliance between monitoring, degraded and provisioning.
///
/// Owns the current mode and the input binding that goes with it. Link
/// observations arrive as [`LinkEvent`]s and are evaluated on the next tick;
/// link side effects go out as [`LinkCommand`]s, so nothing here waits on the
/// network. A transition releases the old binding, binds the new one and only
/// then records the new mode; if binding fails the previous mode and its
/// binding are put back and the next tick tries again.
pub struct ModeController<I: InputSubstrate> {
    input: I,
    current: Option<Mode>,
    bound: Option<Mode>,
    pending_status: Option<LinkStatus>,
    provisioning_started: bool,
    provisioning_requested: bool,
    revoke_requested: bool,
    shutting_down: bool,
    commands: mpsc::UnboundedSender<LinkCommand>,
    binding_tx: watch::Sender<Option<Binding>>,
}

impl<I: InputSubstrate> ModeController<I> {
    pub fn new(input: I, commands: mpsc::UnboundedSender<LinkCommand>) -> Self {
        let (binding_tx, _) = watch::channel(None);
        Self {
            input,
            current: None,
            bound: None,
            pending_status: None,
            provisioning_started: false,
            provisioning_requested: false,
            revoke_requested: false,
            shutting_down: false,
            commands,
            binding_tx,
        }
    }

    pub fn current(&self) -> Option<Mode> {
        self.current
    }

    /// Receiver for the binding the dispatcher should route through.
    pub fn bindings(&self) -> watch::Receiver<Option<Binding>> {
        self.binding_tx.subscribe()
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    /// One control-loop evaluation against the newest link observation, if
    /// one arrived since the last tick. Never waits on I/O.
    pub fn tick(&mut self) -> Option<Mode> {
        if self.shutting_down {
            return self.current;
        }

        self.ensure_bound();

        if let Some(status) = self.pending_status.take() {
            let next = self.evaluate(status);
            if let Err(err) = self.transition(next) {
                warn!(%err, to = %next, "transition deferred to next tick");
            }
        }

        self.request_provisioning();
        self.current
    }

    pub fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Status(status) => self.pending_status = Some(status),
            LinkEvent::Revoked(result) => {
                self.revoke_requested = false;
                match result {
                    Ok(()) => {
                        info!("network credential revoked");
                        // observed before the revoke
                        self.pending_status = None;
                        if let Err(err) = self.transition(Mode::Provisioning) {
                            warn!(%err, "provisioning transition deferred to next tick");
                        }
                        self.request_provisioning();
                    }
                    Err(err) => warn!(%err, "could not revoke network credential"),
                }
            }
            LinkEvent::ProvisioningStarted(result) => {
                self.provisioning_requested = false;
                match result {
                    Ok(()) => self.provisioning_started = true,
                    Err(err) => warn!(%err, "could not start provisioning, retrying next tick"),
                }
            }
        }
    }

    /// Moves to `next`. A no-op returning `Ok(false)` when already there or
    /// shutting down.
    pub fn transition(&mut self, next: Mode) -> Result<bool, InputError> {
        if self.shutting_down || self.current == Some(next) {
            return Ok(false);
        }
        let previous = self.current;

        self.release_input();

        let table = next.action_table();
        if next.needs_input() {
            if let Err(err) = self.input.bind(next, &table.buttons()) {
                warn!(%err, from = ?previous, to = %next, "binding buttons failed, keeping previous mode");
                self.restore(previous);
                return Err(err);
            }
            self.bound = Some(next);
        }

        self.binding_tx.send_replace(Some(Binding { mode: next, table }));
        self.current = Some(next);
        if next == Mode::Provisioning {
            self.provisioning_started = false;
        }
        info!(from = ?previous, to = %next, "mode changed");
        Ok(true)
    }

    pub fn handle(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::ForgetAndReprovision => self.forget_and_reprovision(),
        }
    }

    /// Asks the link task to drop the stored network. The switch to
    /// provisioning happens once the revoke is confirmed.
    pub fn forget_and_reprovision(&mut self) {
        if self.shutting_down || self.revoke_requested {
            return;
        }
        info!("forgetting network");
        self.revoke_requested = self.send(LinkCommand::Revoke);
    }

    /// Stops all further transitions and gives back the input resources.
    pub fn shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        self.release_input();
        info!("mode controller stopped");
    }

    fn evaluate(&self, status: LinkStatus) -> Mode {
        if !status.has_credential {
            Mode::Provisioning
        } else if self.current == Some(Mode::Provisioning) {
            // credential showed up while provisioning: setup is done
            Mode::Monitoring
        } else if status.usable {
            Mode::Monitoring
        } else {
            Mode::Degraded
        }
    }

    /// Re-binds the current mode when an earlier bind or restore left it
    /// without input.
    fn ensure_bound(&mut self) {
        let Some(mode) = self.current else {
            return;
        };
        if !mode.needs_input() || self.bound == Some(mode) {
            return;
        }
        let table = mode.action_table();
        match self.input.bind(mode, &table.buttons()) {
            Ok(()) => {
                self.bound = Some(mode);
                self.binding_tx.send_replace(Some(Binding { mode, table }));
                info!(%mode, "buttons re-bound");
            }
            Err(err) => warn!(%err, %mode, "buttons still unbound"),
        }
    }

    fn request_provisioning(&mut self) {
        if self.shutting_down
            || self.current != Some(Mode::Provisioning)
            || self.provisioning_started
            || self.provisioning_requested
        {
            return;
        }
        self.provisioning_requested = self.send(LinkCommand::BeginProvisioning);
    }

    fn send(&self, command: LinkCommand) -> bool {
        let sent = self.commands.send(command).is_ok();
        if !sent {
            error!(?command, "link task gone");
        }
        sent
    }

    fn release_input(&mut self) {
        if let Some(mode) = self.bound.take() {
            if let Err(err) = self.input.release() {
                warn!(%err, %mode, "releasing buttons failed");
            }
        }
        self.binding_tx.send_replace(None);
    }

    fn restore(&mut self, previous: Option<Mode>) {
        let Some(mode) = previous else {
            return;
        };
        let table = mode.action_table();
        if mode.needs_input() {
            if let Err(err) = self.input.bind(mode, &table.buttons()) {
                error!(%err, %mode, "could not restore previous buttons, retrying next tick");
                return;
            }
            self.bound = Some(mode);
        }
        self.binding_tx.send_replace(Some(Binding { mode, table }));
    }
}
