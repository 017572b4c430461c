//! The process-wide lock flag and its failsafe deadline.
//!
//! [`LockEngine`] owns the lock state together with the [`AutoUnlockTimer`]
//! and the list of change subscribers. All three sit behind one mutex, so a
//! transition always updates the state and the timer as a single unit. The
//! engine is called from the hook callback, from timer threads and from
//! whatever thread drives the UI.

use std::{
    fmt::Display,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak, mpsc},
    time::{Duration, Instant},
};

use crate::timer::AutoUnlockTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
}

impl LockState {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockState::Locked)
    }
}

impl Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LockState::Locked => "locked",
            LockState::Unlocked => "unlocked",
        };
        write!(f, "{}", s)
    }
}

/// What caused an unlock. Only used for diagnostics; subscribers see the
/// same [`LockState::Unlocked`] whatever the cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnlockCause {
    Manual,
    UnlockCombo,
    AutoUnlock,
}

impl Display for UnlockCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnlockCause::Manual => "manual",
            UnlockCause::UnlockCombo => "unlock combo",
            UnlockCause::AutoUnlock => "auto-unlock",
        };
        write!(f, "{}", s)
    }
}

/// A cloneable handle to the lock state.
///
/// Starts out [`LockState::Unlocked`]. Every lock arms a fresh auto-unlock
/// deadline of the configured duration; every unlock cancels it.
#[derive(Debug, Clone)]
pub struct LockEngine {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    auto_unlock: Duration,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: LockState,
    timer: AutoUnlockTimer,
    subscribers: Vec<mpsc::Sender<LockState>>,
}

impl LockEngine {
    pub fn new(auto_unlock: Duration) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let weak = weak.clone();
            Shared {
                auto_unlock,
                inner: Mutex::new(Inner {
                    state: LockState::Unlocked,
                    timer: AutoUnlockTimer::new(move |generation| expire(&weak, generation)),
                    subscribers: Vec::new(),
                }),
            }
        });
        Self { shared }
    }

    pub fn current_state(&self) -> LockState {
        self.inner().state
    }

    /// Locks input and (re)arms the auto-unlock deadline.
    ///
    /// Locking while already locked keeps the state and restarts the deadline
    /// from the full duration.
    pub fn lock(&self) {
        let changed = self.lock_locked(&mut self.inner());
        self.log_lock(changed);
    }

    /// Unlocks input and cancels the auto-unlock deadline. Does nothing when
    /// already unlocked.
    pub fn unlock(&self) {
        self.unlock_by(UnlockCause::Manual);
    }

    /// Locks when unlocked, unlocks when locked. Returns the new state.
    pub fn toggle(&self) -> LockState {
        let mut inner = self.inner();
        match inner.state {
            LockState::Unlocked => {
                let changed = self.lock_locked(&mut inner);
                drop(inner);
                self.log_lock(changed);
                LockState::Locked
            }
            LockState::Locked => {
                let changed = unlock_locked(&mut inner);
                drop(inner);
                log_unlock(changed, UnlockCause::Manual);
                LockState::Unlocked
            }
        }
    }

    /// Registers for state changes.
    ///
    /// The receiver gets every new state in transition order. Renewing a lock
    /// or unlocking while unlocked is not a change and is not sent.
    pub fn subscribe(&self) -> mpsc::Receiver<LockState> {
        let (tx, rx) = mpsc::channel();
        self.inner().subscribers.push(tx);
        rx
    }

    /// The instant the failsafe fires at, if locked.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner().timer.deadline()
    }

    /// Time left until the failsafe fires, if locked.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_timer_armed(&self) -> bool {
        self.inner().timer.is_armed()
    }

    /// The configured auto-unlock duration.
    pub fn auto_unlock(&self) -> Duration {
        self.shared.auto_unlock
    }

    pub(crate) fn unlock_by(&self, cause: UnlockCause) {
        let changed = unlock_locked(&mut self.inner());
        log_unlock(changed, cause);
    }

    /// Returns `true` if the state changed, `false` if the lock was renewed.
    fn lock_locked(&self, inner: &mut Inner) -> bool {
        inner.timer.arm(self.shared.auto_unlock);

        if inner.state == LockState::Locked {
            return false;
        }
        inner.state = LockState::Locked;
        inner.notify();
        true
    }

    fn log_lock(&self, _changed: bool) {
        #[cfg(feature = "log")]
        log::info!(
            "{}, auto-unlock in {:?}",
            if _changed { "input locked" } else { "lock renewed" },
            self.shared.auto_unlock
        );
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner()
    }
}

impl Shared {
    fn inner(&self) -> MutexGuard<'_, Inner> {
        // Every transition leaves `Inner` consistent before it can panic.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn notify(&mut self) {
        let state = self.state;
        self.subscribers.retain(|tx| tx.send(state).is_ok());
    }
}

/// Returns `true` if the state changed.
fn unlock_locked(inner: &mut Inner) -> bool {
    inner.timer.disarm();

    if inner.state == LockState::Unlocked {
        return false;
    }
    inner.state = LockState::Unlocked;
    inner.notify();
    true
}

fn log_unlock(_changed: bool, _cause: UnlockCause) {
    if _changed {
        #[cfg(feature = "log")]
        log::info!("input unlocked ({})", _cause);
    }
}

fn expire(shared: &Weak<Shared>, generation: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    let mut inner = shared.inner();
    if !inner.timer.is_current(generation) {
        drop(inner);
        #[cfg(feature = "log")]
        log::debug!("ignoring stale auto-unlock deadline #{}", generation);
        return;
    }

    let changed = unlock_locked(&mut inner);
    drop(inner);
    log_unlock(changed, UnlockCause::AutoUnlock);
}
