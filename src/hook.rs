//! Interception of every input event while the session is locked.
//!
//! The OS-specific part of a hook is behind [`EventTap`]: a backend installs
//! the system-level registration and calls [`Interceptor::intercept`] once
//! per observed event, passing itself as a [`HookControl`] so the interceptor
//! can re-arm a revoked hook. [`HookManager`] owns the resulting
//! [`TapHandle`].
//!
//! Because backends are injected, the interceptor can be driven with
//! synthetic events in tests, without any real hook.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use crate::{
    classifier::{Decision, UnlockCombo, classify},
    error::Result,
    event::{EventKind, InputEvent},
    lock_state::{LockEngine, LockState, UnlockCause},
};

/// What the backend should do with an event after interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Deliver the event onward unmodified.
    Forward,
    /// Drop the event so it never reaches its destination.
    Swallow,
}

/// Access to the live hook from inside its own callback.
pub trait HookControl {
    /// Re-enables a hook the OS has disabled, keeping the existing
    /// registration handle.
    fn reenable(&self);
}

/// A system-level input hook backend.
pub trait EventTap {
    type Handle: TapHandle;

    /// Registers for all keyboard and pointer events at the highest priority
    /// the platform offers, routing each of them through `interceptor`.
    ///
    /// Fails with [`Error::PermissionDenied`](crate::error::Error::PermissionDenied)
    /// when the process is not allowed to monitor input.
    fn install(&self, interceptor: Arc<Interceptor>) -> Result<Self::Handle>;
}

/// An installed hook registration.
pub trait TapHandle: Send {
    /// Unregisters the hook and releases the OS resources behind it.
    fn remove(self);
}

/// The per-event decision point that runs inside the hook callback.
///
/// Everything done here has to finish quickly: the OS revokes hooks that
/// hold up input delivery.
#[derive(Debug)]
pub struct Interceptor {
    engine: LockEngine,
    combo: UnlockCombo,
    revocations: AtomicU64,
}

impl Interceptor {
    pub fn new(engine: LockEngine, combo: UnlockCombo) -> Self {
        Self {
            engine,
            combo,
            revocations: AtomicU64::new(0),
        }
    }

    pub fn intercept(&self, event: &InputEvent, hook: &dyn HookControl) -> Verdict {
        if let EventKind::HookDisabled(_reason) = event.kind {
            self.revocations.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "log")]
            log::warn!("input hook disabled by {}, re-enabling", _reason);
            hook.reenable();
            return Verdict::Forward;
        }

        let state = self.engine.current_state();
        if state == LockState::Unlocked {
            return Verdict::Forward;
        }

        let decision = classify(event, state, &self.combo);
        #[cfg(feature = "log")]
        log::trace!("{:?} -> {:?}", event, decision);

        match decision {
            Decision::PassThrough => Verdict::Forward,
            Decision::UnlockMatch => {
                self.engine.unlock_by(UnlockCause::UnlockCombo);
                Verdict::Swallow
            }
            Decision::Suppress => Verdict::Swallow,
        }
    }

    pub fn engine(&self) -> &LockEngine {
        &self.engine
    }

    pub fn combo(&self) -> &UnlockCombo {
        &self.combo
    }

    /// How many times the OS has revoked the hook so far.
    pub fn revocations(&self) -> u64 {
        self.revocations.load(Ordering::Relaxed)
    }
}

/// Owns the hook registration for the lifetime of the lockout.
///
/// Dropping the manager removes the hook.
pub struct HookManager<T: EventTap> {
    tap: T,
    interceptor: Arc<Interceptor>,
    handle: Mutex<Option<T::Handle>>,
}

impl<T: EventTap> HookManager<T> {
    pub fn new(tap: T, interceptor: Interceptor) -> Self {
        Self {
            tap,
            interceptor: Arc::new(interceptor),
            handle: Mutex::new(None),
        }
    }

    /// Installs the hook. Does nothing if it is already installed.
    pub fn install(&self) -> Result<()> {
        let mut handle = self.handle();
        if handle.is_some() {
            return Ok(());
        }

        let installed = self.tap.install(self.interceptor.clone()).inspect_err(|_e| {
            #[cfg(feature = "log")]
            log::error!("failed to install input hook: {}", _e);
        })?;
        *handle = Some(installed);

        #[cfg(feature = "log")]
        log::info!("installed input hook, unlock with {}", self.interceptor.combo);
        Ok(())
    }

    /// Removes the hook. Does nothing if no hook is installed.
    pub fn remove(&self) {
        if let Some(handle) = self.handle().take() {
            handle.remove();
            #[cfg(feature = "log")]
            log::info!("removed input hook");
        }
    }

    pub fn is_installed(&self) -> bool {
        self.handle().is_some()
    }

    pub fn interceptor(&self) -> &Arc<Interceptor> {
        &self.interceptor
    }

    pub fn tap(&self) -> &T {
        &self.tap
    }

    fn handle(&self) -> MutexGuard<'_, Option<T::Handle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: EventTap> Drop for HookManager<T> {
    fn drop(&mut self) {
        self.remove();
    }
}
