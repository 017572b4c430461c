//! Build-time defaults and the lockout configuration.

use std::time::Duration;

use crate::{
    classifier::UnlockCombo,
    event::{KeyCode, Modifiers},
};

/// How long a lock lasts before the failsafe unlocks it.
pub const DEFAULT_AUTO_UNLOCK: Duration = Duration::from_secs(30 * 60);

/// The `U` key.
pub const DEFAULT_UNLOCK_KEY: KeyCode = KeyCode(0x55);

pub const DEFAULT_UNLOCK_MODIFIERS: Modifiers = Modifiers::CONTROL.union(Modifiers::SHIFT);

/// Configuration of a lockout.
///
/// By default a lock lasts [`DEFAULT_AUTO_UNLOCK`] and is ended early with
/// `Ctrl+Shift+U`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Time from a lock until the failsafe unlocks it.
    pub auto_unlock: Duration,
    /// The key combination that ends a lock.
    pub unlock_combo: UnlockCombo,
}

impl Config {
    /// Sets how long a lock lasts before it is lifted automatically.
    pub fn set_auto_unlock(mut self, auto_unlock: Duration) -> Self {
        self.auto_unlock = auto_unlock;
        self
    }

    /// Sets the key combination that ends a lock.
    ///
    /// Holding modifiers in addition to the ones in `combo` still unlocks.
    pub fn set_unlock_combo(mut self, combo: UnlockCombo) -> Self {
        self.unlock_combo = combo;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_unlock: DEFAULT_AUTO_UNLOCK,
            unlock_combo: UnlockCombo::new(DEFAULT_UNLOCK_KEY, DEFAULT_UNLOCK_MODIFIERS),
        }
    }
}
