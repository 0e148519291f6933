use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use crate::input::{
    Binding, ButtonEvent, ChannelInput, ControlRequest, Dispatch, InputDispatcher, InputSubstrate,
};
use crate::mode::{Action, ButtonId, Mode};

const WINDOW: Duration = Duration::from_millis(300);

fn bound(mode: Mode) -> Option<Binding> {
    Some(Binding {
        mode,
        table: mode.action_table(),
    })
}

fn dispatcher(
    binding: Option<Binding>,
) -> (
    InputDispatcher,
    watch::Sender<Option<Binding>>,
    mpsc::UnboundedReceiver<ControlRequest>,
) {
    let (binding_tx, binding_rx) = watch::channel(binding);
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let dispatcher = InputDispatcher::new(WINDOW, 4, binding_rx, control_tx);
    (dispatcher, binding_tx, control_rx)
}

fn press(button: ButtonId, at: Instant) -> ButtonEvent {
    ButtonEvent { button, at }
}

#[test]
fn debounce_window_is_shared_across_buttons() {
    // Arrange
    let (mut dispatcher, _binding, _control) = dispatcher(bound(Mode::Monitoring));
    let t0 = Instant::now();

    // Act
    let first = dispatcher.on_event(press(ButtonId::Y, t0));
    let other_button = dispatcher.on_event(press(ButtonId::B, t0 + Duration::from_millis(100)));
    let same_button = dispatcher.on_event(press(ButtonId::Y, t0 + Duration::from_millis(299)));
    let after_window = dispatcher.on_event(press(ButtonId::B, t0 + Duration::from_millis(400)));

    // Assert
    assert_eq!(first, Dispatch::Handled(Action::NextScreen));
    assert_eq!(other_button, Dispatch::Debounced);
    assert_eq!(same_button, Dispatch::Debounced);
    assert_eq!(after_window, Dispatch::Handled(Action::PreviousScreen));
    assert_eq!(dispatcher.screen(), 1);
}

#[test]
fn screen_index_stays_within_bounds() {
    // Arrange
    let (mut dispatcher, _binding, _control) = dispatcher(bound(Mode::Monitoring));
    let t0 = Instant::now();
    let step = WINDOW + Duration::from_millis(1);

    // Act
    dispatcher.on_event(press(ButtonId::B, t0));
    let after_prev = dispatcher.screen();
    for i in 1..=6 {
        dispatcher.on_event(press(ButtonId::Y, t0 + step * i));
    }

    // Assert
    assert_eq!(after_prev, 1);
    assert_eq!(dispatcher.screen(), 4);
}

#[test]
fn unmapped_press_still_resets_the_window() {
    // Arrange
    let (mut dispatcher, _binding, _control) = dispatcher(bound(Mode::Monitoring));
    let t0 = Instant::now();

    // Act
    let unmapped = dispatcher.on_event(press(ButtonId::A, t0));
    let next = dispatcher.on_event(press(ButtonId::Y, t0 + Duration::from_millis(50)));

    // Assert
    assert_eq!(unmapped, Dispatch::Unmapped);
    assert_eq!(next, Dispatch::Debounced);
    assert_eq!(dispatcher.screen(), 1);
}

#[test]
fn presses_before_binding_are_dropped() {
    // Arrange
    let (mut dispatcher, _binding, _control) = dispatcher(None);

    // Act
    let outcome = dispatcher.on_event(press(ButtonId::Y, Instant::now()));

    // Assert
    assert_eq!(outcome, Dispatch::Unbound);
    assert_eq!(dispatcher.screen(), 1);
}

#[test]
fn routes_through_the_currently_bound_table() {
    // Arrange
    let (mut dispatcher, binding, mut control) = dispatcher(bound(Mode::Monitoring));
    let t0 = Instant::now();

    // Act
    binding.send_replace(bound(Mode::Degraded));
    let forget = dispatcher.on_event(press(ButtonId::B, t0));
    binding.send_replace(bound(Mode::Provisioning));
    let provisioning = dispatcher.on_event(press(ButtonId::B, t0 + Duration::from_secs(1)));

    // Assert
    assert_eq!(forget, Dispatch::Handled(Action::ForgetNetwork));
    assert_eq!(control.try_recv().ok(), Some(ControlRequest::ForgetAndReprovision));
    assert_eq!(provisioning, Dispatch::Unmapped);
    assert!(control.try_recv().is_err());
}

#[test]
fn action_tables_match_modes() {
    assert_eq!(Mode::Monitoring.action_table().buttons(), vec![ButtonId::B, ButtonId::Y]);
    assert_eq!(Mode::Degraded.action_table().get(ButtonId::B), Some(Action::ForgetNetwork));
    assert!(Mode::Provisioning.action_table().is_empty());
    assert!(!Mode::Provisioning.needs_input());
}

#[test]
fn channel_input_forwards_only_watched_buttons() {
    // Arrange
    let (mut input, mut events) = ChannelInput::new();
    let feed = input.feed();

    // Act
    let before_bind = feed.press(ButtonId::B);
    input.bind(Mode::Monitoring, &[ButtonId::B, ButtonId::Y]).expect("bind");
    let watched = feed.press(ButtonId::B);
    let unwatched = feed.press(ButtonId::A);
    input.release().expect("release");
    let after_release = feed.press(ButtonId::Y);

    // Assert
    assert!(!before_bind);
    assert!(watched);
    assert!(!unwatched);
    assert!(!after_release);
    assert_eq!(events.try_recv().map(|event| event.button).ok(), Some(ButtonId::B));
    assert!(events.try_recv().is_err());
}
