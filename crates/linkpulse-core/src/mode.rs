use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Link usable, normal monitoring.
    Monitoring,
    /// A network is configured but the wider network is unreachable.
    Degraded,
    /// No network configured; setup hotspot is up.
    Provisioning,
}

impl Mode {
    pub fn action_table(self) -> ActionTable {
        match self {
            Self::Monitoring => ActionTable::new(&[
                (ButtonId::B, Action::PreviousScreen),
                (ButtonId::Y, Action::NextScreen),
            ]),
            Self::Degraded => ActionTable::new(&[(ButtonId::B, Action::ForgetNetwork)]),
            Self::Provisioning => ActionTable::new(&[]),
        }
    }

    /// Whether entering this mode has to claim input resources at all.
    pub fn needs_input(self) -> bool {
        !self.action_table().is_empty()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Monitoring => "monitoring",
            Self::Degraded => "degraded",
            Self::Provisioning => "provisioning",
        };
        f.write_str(name)
    }
}

/// The four front-panel buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ButtonId {
    A,
    B,
    X,
    Y,
}

impl ButtonId {
    pub const ALL: [ButtonId; 4] = [ButtonId::A, ButtonId::B, ButtonId::X, ButtonId::Y];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    PreviousScreen,
    NextScreen,
    ForgetNetwork,
}

/// Static button-to-action map for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionTable {
    entries: [Option<Action>; 4],
}

impl ActionTable {
    fn new(pairs: &[(ButtonId, Action)]) -> Self {
        let mut entries = [None; 4];
        for (button, action) in pairs {
            entries[*button as usize] = Some(*action);
        }
        Self { entries }
    }

    pub fn get(&self, button: ButtonId) -> Option<Action> {
        self.entries[button as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }

    /// Buttons the input substrate has to watch for this table.
    pub fn buttons(&self) -> Vec<ButtonId> {
        ButtonId::ALL
            .into_iter()
            .filter(|button| self.get(*button).is_some())
            .collect()
    }
}
