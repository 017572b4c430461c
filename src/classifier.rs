//! Decides what happens to a single event given the current lock state.
//!
//! Classification is a pure function of its inputs so it can be exercised
//! directly with synthetic events, without installing any hook.

use std::fmt::Display;

use crate::{
    event::{EventKind, InputEvent, KeyCode, Modifiers},
    lock_state::LockState,
};

/// The key combination that ends a lockout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockCombo {
    pub key_code: KeyCode,
    /// The minimum set of modifiers that must be held.
    pub modifiers: Modifiers,
}

impl UnlockCombo {
    pub const fn new(key_code: KeyCode, modifiers: Modifiers) -> Self {
        Self {
            key_code,
            modifiers,
        }
    }

    /// Returns `true` if `event` is a key press of this combo.
    ///
    /// Extra held modifiers do not prevent a match: the required modifiers
    /// only have to be a subset of the held ones.
    pub fn matches(&self, event: &InputEvent) -> bool {
        event.kind == EventKind::KeyDown
            && event.key_code == Some(self.key_code)
            && event.modifiers.contains(self.modifiers)
    }
}

impl Display for UnlockCombo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.modifiers.is_empty() {
            write!(f, "key {:#04x}", self.key_code.0)
        } else {
            write!(f, "{}+key {:#04x}", self.modifiers, self.key_code.0)
        }
    }
}

/// What to do with a classified event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Deliver the event as usual.
    PassThrough,
    /// Drop the event.
    Suppress,
    /// The event is the unlock combo.
    UnlockMatch,
}

pub fn classify(event: &InputEvent, state: LockState, combo: &UnlockCombo) -> Decision {
    match state {
        LockState::Unlocked => Decision::PassThrough,
        LockState::Locked if combo.matches(event) => Decision::UnlockMatch,
        LockState::Locked => Decision::Suppress,
    }
}
