use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::controller::ModeController;
use crate::input::{Binding, ControlRequest, InputError, InputSubstrate};
use crate::link::LinkError;
use crate::mode::{ButtonId, Mode};
use crate::monitor::{LinkCommand, LinkEvent, LinkStatus};

/// Records successful binds and every release.
#[derive(Default)]
struct RecordingInput {
    binds: Vec<Mode>,
    releases: usize,
    refused: Mutex<Vec<Mode>>,
}

impl RecordingInput {
    fn refuse(&self, modes: &[Mode]) {
        *self.refused.lock().expect("refused lock") = modes.to_vec();
    }
}

impl InputSubstrate for RecordingInput {
    fn bind(&mut self, mode: Mode, buttons: &[ButtonId]) -> Result<(), InputError> {
        if self.refused.lock().expect("refused lock").contains(&mode) {
            return Err(InputError::Claim {
                button: buttons.first().copied().unwrap_or(ButtonId::A),
                reason: "line busy".to_string(),
            });
        }
        self.binds.push(mode);
        Ok(())
    }

    fn release(&mut self) -> Result<(), InputError> {
        self.releases += 1;
        Ok(())
    }
}

struct Harness {
    controller: ModeController<RecordingInput>,
    commands: mpsc::UnboundedReceiver<LinkCommand>,
}

impl Harness {
    fn new() -> Self {
        let (command_tx, commands) = mpsc::unbounded_channel();
        Self {
            controller: ModeController::new(RecordingInput::default(), command_tx),
            commands,
        }
    }

    /// Feeds one link observation and ticks once.
    fn observe(&mut self, has_credential: bool, usable: bool) -> Option<Mode> {
        self.controller.on_link_event(LinkEvent::Status(LinkStatus {
            has_credential,
            usable,
        }));
        self.controller.tick()
    }

    fn sent(&mut self) -> Vec<LinkCommand> {
        let mut sent = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            sent.push(command);
        }
        sent
    }

    fn published(&self) -> Option<Binding> {
        *self.controller.bindings().borrow()
    }
}

fn failure() -> LinkError {
    LinkError::Command {
        command: "nmcli device wifi hotspot".to_string(),
        stderr: "NetworkManager is not running".to_string(),
    }
}

#[test]
fn missing_credential_at_startup_enters_provisioning() {
    // Arrange
    let mut harness = Harness::new();

    // Act
    let mode = harness.observe(false, false);

    // Assert
    assert_eq!(mode, Some(Mode::Provisioning));
    assert!(harness.controller.input().binds.is_empty());
    assert_eq!(
        harness.published(),
        Some(Binding {
            mode: Mode::Provisioning,
            table: Mode::Provisioning.action_table(),
        })
    );
    assert_eq!(harness.sent(), vec![LinkCommand::BeginProvisioning]);
}

#[test]
fn usable_link_enters_monitoring() {
    // Arrange
    let mut harness = Harness::new();

    // Act
    let mode = harness.observe(true, true);

    // Assert
    assert_eq!(mode, Some(Mode::Monitoring));
    assert_eq!(harness.controller.input().binds, vec![Mode::Monitoring]);
    assert_eq!(harness.published().map(|b| b.mode), Some(Mode::Monitoring));
    assert!(harness.sent().is_empty());
}

#[test]
fn unusable_link_enters_degraded() {
    // Arrange
    let mut harness = Harness::new();

    // Act
    let mode = harness.observe(true, false);

    // Assert
    assert_eq!(mode, Some(Mode::Degraded));
    assert_eq!(harness.controller.input().binds, vec![Mode::Degraded]);
}

#[test]
fn tick_without_an_observation_keeps_the_mode() {
    // Arrange
    let mut harness = Harness::new();

    // Act
    let before = harness.controller.tick();
    harness.observe(true, true);
    let after = harness.controller.tick();

    // Assert
    assert_eq!(before, None);
    assert_eq!(after, Some(Mode::Monitoring));
    assert_eq!(harness.controller.input().binds, vec![Mode::Monitoring]);
}

#[test]
fn losing_the_link_degrades_exactly_once() {
    // Arrange
    let mut harness = Harness::new();
    harness.observe(true, true);

    // Act
    for _ in 0..3 {
        harness.observe(true, false);
    }

    // Assert
    assert_eq!(harness.controller.current(), Some(Mode::Degraded));
    assert_eq!(
        harness.controller.input().binds,
        vec![Mode::Monitoring, Mode::Degraded]
    );
    assert_eq!(harness.controller.input().releases, 1);
}

#[test]
fn transition_to_current_mode_is_a_no_op() {
    // Arrange
    let mut harness = Harness::new();
    harness.observe(true, true);

    // Act
    let changed = harness
        .controller
        .transition(Mode::Monitoring)
        .expect("no-op transition");

    // Assert
    assert!(!changed);
    assert_eq!(harness.controller.input().binds, vec![Mode::Monitoring]);
    assert_eq!(harness.controller.input().releases, 0);
}

#[test]
fn forget_network_revokes_then_provisions() {
    // Arrange
    let mut harness = Harness::new();
    harness.observe(true, false);

    // Act
    harness.controller.handle(ControlRequest::ForgetAndReprovision);
    let requested = harness.sent();
    let mode_while_revoking = harness.controller.current();
    harness.controller.on_link_event(LinkEvent::Revoked(Ok(())));

    // Assert
    assert_eq!(requested, vec![LinkCommand::Revoke]);
    assert_eq!(mode_while_revoking, Some(Mode::Degraded));
    assert_eq!(harness.controller.current(), Some(Mode::Provisioning));
    assert_eq!(harness.sent(), vec![LinkCommand::BeginProvisioning]);
    assert_eq!(harness.controller.input().releases, 1);
    assert_eq!(harness.published().map(|b| b.mode), Some(Mode::Provisioning));
}

#[test]
fn observation_from_before_the_revoke_is_discarded() {
    // Arrange
    let mut harness = Harness::new();
    harness.observe(true, true);
    harness.controller.forget_and_reprovision();

    // Act
    harness.controller.on_link_event(LinkEvent::Status(LinkStatus {
        has_credential: true,
        usable: true,
    }));
    harness.controller.on_link_event(LinkEvent::Revoked(Ok(())));
    let mode = harness.controller.tick();

    // Assert
    assert_eq!(mode, Some(Mode::Provisioning));
}

#[test]
fn repeated_forget_requests_revoke_once() {
    // Arrange
    let mut harness = Harness::new();
    harness.observe(true, true);

    // Act
    harness.controller.forget_and_reprovision();
    harness.controller.forget_and_reprovision();

    // Assert
    assert_eq!(harness.sent(), vec![LinkCommand::Revoke]);
}

#[test]
fn failed_revoke_keeps_the_mode() {
    // Arrange
    let mut harness = Harness::new();
    harness.observe(true, false);
    harness.controller.forget_and_reprovision();
    harness.sent();

    // Act
    harness
        .controller
        .on_link_event(LinkEvent::Revoked(Err(LinkError::NoConnection("wlan0".to_string()))));
    harness.controller.tick();
    harness.controller.forget_and_reprovision();

    // Assert
    assert_eq!(harness.controller.current(), Some(Mode::Degraded));
    assert_eq!(harness.controller.input().releases, 0);
    assert_eq!(harness.sent(), vec![LinkCommand::Revoke], "a second forget is allowed");
}

#[test]
fn forget_while_provisioning_does_not_restart_the_hotspot() {
    // Arrange
    let mut harness = Harness::new();
    harness.observe(false, false);
    harness.controller.on_link_event(LinkEvent::ProvisioningStarted(Ok(())));
    harness.sent();

    // Act
    harness.controller.forget_and_reprovision();
    harness.controller.on_link_event(LinkEvent::Revoked(Ok(())));
    harness.observe(false, false);

    // Assert
    assert_eq!(harness.controller.current(), Some(Mode::Provisioning));
    assert_eq!(harness.sent(), vec![LinkCommand::Revoke]);
}

#[test]
fn provisioning_start_is_requested_once_while_pending() {
    // Arrange
    let mut harness = Harness::new();
    harness.observe(false, false);

    // Act
    for _ in 0..3 {
        harness.observe(false, false);
    }

    // Assert
    assert_eq!(harness.sent(), vec![LinkCommand::BeginProvisioning]);
}

#[test]
fn provisioning_start_is_retried_until_it_succeeds() {
    // Arrange
    let mut harness = Harness::new();
    harness.observe(false, false);

    // Act
    let mut requested = harness.sent();
    for result in [Err(failure()), Err(failure()), Ok(())] {
        harness
            .controller
            .on_link_event(LinkEvent::ProvisioningStarted(result));
        harness.controller.tick();
        requested.extend(harness.sent());
    }

    // Assert
    assert_eq!(harness.controller.current(), Some(Mode::Provisioning));
    assert_eq!(requested, vec![LinkCommand::BeginProvisioning; 3]);
}

#[test]
fn new_credential_finishes_provisioning() {
    // Arrange
    let mut harness = Harness::new();
    harness.observe(false, false);

    // Act
    let mode = harness.observe(true, false);

    // Assert
    assert_eq!(mode, Some(Mode::Monitoring));
    assert_eq!(harness.controller.input().binds, vec![Mode::Monitoring]);
}

#[test]
fn bind_failure_keeps_previous_mode_and_retries() {
    // Arrange
    let mut harness = Harness::new();
    harness.observe(true, true);
    harness.controller.input().refuse(&[Mode::Degraded]);

    // Act
    let refused = harness.observe(true, false);
    let binding_after_refusal = harness.published();
    harness.controller.input().refuse(&[]);
    let retried = harness.observe(true, false);

    // Assert
    assert_eq!(refused, Some(Mode::Monitoring));
    assert_eq!(binding_after_refusal.map(|b| b.mode), Some(Mode::Monitoring));
    assert_eq!(retried, Some(Mode::Degraded));
    assert_eq!(
        harness.controller.input().binds,
        vec![Mode::Monitoring, Mode::Monitoring, Mode::Degraded]
    );
}

#[test]
fn lost_binding_comes_back_when_the_link_recovers() {
    // Arrange
    let mut harness = Harness::new();
    harness.observe(true, true);
    harness
        .controller
        .input()
        .refuse(&[Mode::Degraded, Mode::Monitoring]);
    let stuck = harness.observe(true, false);
    let binding_while_stuck = harness.published();

    // Act
    harness.controller.input().refuse(&[]);
    let recovered = harness.observe(true, true);

    // Assert
    assert_eq!(stuck, Some(Mode::Monitoring));
    assert_eq!(binding_while_stuck, None);
    assert_eq!(recovered, Some(Mode::Monitoring));
    assert_eq!(harness.published().map(|b| b.mode), Some(Mode::Monitoring));
    assert_eq!(
        harness.controller.input().binds,
        vec![Mode::Monitoring, Mode::Monitoring]
    );
}

#[test]
fn lost_binding_is_rebound_on_a_quiet_tick() {
    // Arrange
    let mut harness = Harness::new();
    harness.observe(true, true);
    harness
        .controller
        .input()
        .refuse(&[Mode::Degraded, Mode::Monitoring]);
    harness.observe(true, false);

    // Act
    let still_stuck = harness.controller.tick();
    harness.controller.input().refuse(&[]);
    harness.controller.tick();

    // Assert
    assert_eq!(still_stuck, Some(Mode::Monitoring));
    assert_eq!(harness.published().map(|b| b.mode), Some(Mode::Monitoring));
}

#[test]
fn bind_failure_is_reported_from_transition() {
    // Arrange
    let mut harness = Harness::new();
    harness.controller.input().refuse(&[Mode::Monitoring]);

    // Act
    let result = harness.controller.transition(Mode::Monitoring);

    // Assert
    assert!(matches!(result, Err(InputError::Claim { .. })));
    assert_eq!(harness.controller.current(), None);
    assert_eq!(harness.published(), None);
}

#[test]
fn no_transitions_after_shutdown() {
    // Arrange
    let mut harness = Harness::new();
    harness.observe(true, true);

    // Act
    harness.controller.shutdown();
    let mode = harness.observe(true, false);
    let changed = harness
        .controller
        .transition(Mode::Degraded)
        .expect("ignored transition");
    harness.controller.forget_and_reprovision();

    // Assert
    assert_eq!(mode, Some(Mode::Monitoring));
    assert!(!changed);
    assert!(harness.sent().is_empty());
    assert_eq!(harness.controller.input().releases, 1);
    assert_eq!(harness.controller.input().binds, vec![Mode::Monitoring]);
    assert_eq!(harness.published(), None);
}
