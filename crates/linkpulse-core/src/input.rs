use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::mode::{Action, ActionTable, ButtonId, Mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: ButtonId,
    pub at: Instant,
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to claim {button:?}: {reason}")]
    Claim { button: ButtonId, reason: String },
    #[error("failed to release buttons: {0}")]
    Release(String),
}

/// Hardware side of the buttons. The controller always calls `release`
/// before `bind`, and binds at most one mode at a time.
pub trait InputSubstrate: Send {
    fn bind(&mut self, mode: Mode, buttons: &[ButtonId]) -> Result<(), InputError>;
    fn release(&mut self) -> Result<(), InputError>;
}

/// The table currently bound by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub mode: Mode,
    pub table: ActionTable,
}

/// Requests an action makes of the mode controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    ForgetAndReprovision,
}

/// Substrate that forwards presses from a [`ButtonFeed`] over a channel,
/// letting through only the buttons of the bound mode.
pub struct ChannelInput {
    watched: Arc<Mutex<Vec<ButtonId>>>,
    tx: mpsc::UnboundedSender<ButtonEvent>,
}

/// Cloneable producer side of a [`ChannelInput`].
#[derive(Clone)]
pub struct ButtonFeed {
    watched: Arc<Mutex<Vec<ButtonId>>>,
    tx: mpsc::UnboundedSender<ButtonEvent>,
}

impl ChannelInput {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ButtonEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let input = Self {
            watched: Arc::new(Mutex::new(Vec::new())),
            tx,
        };
        (input, rx)
    }

    pub fn feed(&self) -> ButtonFeed {
        ButtonFeed {
            watched: Arc::clone(&self.watched),
            tx: self.tx.clone(),
        }
    }
}

impl InputSubstrate for ChannelInput {
    fn bind(&mut self, mode: Mode, buttons: &[ButtonId]) -> Result<(), InputError> {
        let mut watched = self.watched.lock().unwrap_or_else(PoisonError::into_inner);
        watched.clear();
        watched.extend_from_slice(buttons);
        debug!(%mode, ?buttons, "buttons bound");
        Ok(())
    }

    fn release(&mut self) -> Result<(), InputError> {
        self.watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

impl ButtonFeed {
    /// Returns false when the press was dropped because nothing watches it
    /// or the receiver is gone.
    pub fn press(&self, button: ButtonId) -> bool {
        let watched = self
            .watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&button);
        if !watched {
            return false;
        }
        self.tx
            .send(ButtonEvent {
                button,
                at: Instant::now(),
            })
            .is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Inside the debounce window of the last accepted press.
    Debounced,
    /// No table bound yet.
    Unbound,
    /// Bound table has no entry for the button.
    Unmapped,
    Handled(Action),
}

/// Debounces presses and runs them through the bound mode's table.
///
/// The debounce window is shared by all buttons: any accepted press
/// suppresses presses on every button until the window has passed.
pub struct InputDispatcher {
    debounce_window: Duration,
    last_accepted: Option<Instant>,
    binding: watch::Receiver<Option<Binding>>,
    control: mpsc::UnboundedSender<ControlRequest>,
    screen: u8,
    total_screens: u8,
}

impl InputDispatcher {
    pub fn new(
        debounce_window: Duration,
        total_screens: u8,
        binding: watch::Receiver<Option<Binding>>,
        control: mpsc::UnboundedSender<ControlRequest>,
    ) -> Self {
        Self {
            debounce_window,
            last_accepted: None,
            binding,
            control,
            screen: 1,
            total_screens: total_screens.max(1),
        }
    }

    pub fn screen(&self) -> u8 {
        self.screen
    }

    pub fn on_event(&mut self, event: ButtonEvent) -> Dispatch {
        if let Some(last) = self.last_accepted {
            if event.at.saturating_duration_since(last) < self.debounce_window {
                return Dispatch::Debounced;
            }
        }
        self.last_accepted = Some(event.at);

        let Some(binding) = *self.binding.borrow() else {
            return Dispatch::Unbound;
        };
        let Some(action) = binding.table.get(event.button) else {
            return Dispatch::Unmapped;
        };

        self.invoke(action);
        debug!(button = ?event.button, ?action, mode = %binding.mode, screen = self.screen, "button");
        Dispatch::Handled(action)
    }

    fn invoke(&mut self, action: Action) {
        match action {
            Action::PreviousScreen => self.screen = self.screen.saturating_sub(1).max(1),
            Action::NextScreen => self.screen = self.screen.saturating_add(1).min(self.total_screens),
            Action::ForgetNetwork => {
                if self.control.send(ControlRequest::ForgetAndReprovision).is_err() {
                    warn!("mode controller gone, dropping forget-network request");
                }
            }
        }
    }
}
