//! Locks all keyboard and pointer input for the desktop session.
//!
//! While locked, every input event is swallowed except the unlock combo
//! (`Ctrl+Shift+U` by default). A failsafe timer lifts the lock after a
//! bounded time no matter what, so the session can never stay locked for
//! good.
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn main() -> input_lockout::error::Result<()> {
//! let lockout = input_lockout::start(Default::default())?;
//! for state in lockout.subscribe() {
//!     println!("input {state}");
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```

pub mod classifier;
pub mod config;
pub mod error;
pub mod event;
pub mod hook;
pub mod lock_state;
pub mod timer;
#[cfg(windows)]
pub mod windows_hook;

use std::{sync::mpsc, time::Duration};

use config::Config;
use error::Result;
use hook::{EventTap, HookManager, Interceptor};
use lock_state::{LockEngine, LockState};

/// Installs the Windows input hooks and locks input right away.
#[cfg(windows)]
pub fn start(config: Config) -> Result<Lockout<windows_hook::WindowsTap>> {
    start_with(windows_hook::WindowsTap::default(), config)
}

/// Installs the hook provided by `tap` and locks input right away.
///
/// Nothing is locked if the hook cannot be installed.
pub fn start_with<T: EventTap>(tap: T, config: Config) -> Result<Lockout<T>> {
    let engine = LockEngine::new(config.auto_unlock);
    let hooks = HookManager::new(
        tap,
        Interceptor::new(engine.clone(), config.unlock_combo),
    );

    hooks.install()?;
    engine.lock();

    Ok(Lockout { engine, hooks })
}

/// A running lockout: the installed hook plus the lock state it enforces.
///
/// Dropping it removes the hook.
pub struct Lockout<T: EventTap> {
    engine: LockEngine,
    hooks: HookManager<T>,
}

impl<T: EventTap> Lockout<T> {
    /// Locks when unlocked and unlocks when locked. Returns the new state.
    pub fn toggle(&self) -> LockState {
        self.engine.toggle()
    }

    pub fn lock(&self) {
        self.engine.lock();
    }

    pub fn force_unlock(&self) {
        self.engine.unlock();
    }

    pub fn state(&self) -> LockState {
        self.engine.current_state()
    }

    /// Time left until the failsafe unlocks, if locked.
    pub fn remaining(&self) -> Option<Duration> {
        self.engine.remaining()
    }

    /// Receives every state change from now on.
    pub fn subscribe(&self) -> mpsc::Receiver<LockState> {
        self.engine.subscribe()
    }

    pub fn engine(&self) -> &LockEngine {
        &self.engine
    }

    pub fn hooks(&self) -> &HookManager<T> {
        &self.hooks
    }

    /// Removes the hook. The lock state is left as it is but no longer
    /// enforced.
    pub fn stop(self) {
        self.hooks.remove();
    }
}
