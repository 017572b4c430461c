use std::{
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

/// A single-shot failsafe deadline served by one long-lived worker thread.
///
/// Arming and disarming only send a message to the worker, so neither blocks
/// nor spawns. When the armed deadline passes, the worker calls `on_expire`
/// with its generation. A deadline that has already timed out may still call
/// `on_expire` after it was disarmed or replaced, so the callee must check the
/// generation with [`AutoUnlockTimer::is_current`] under the same lock that
/// guards the timer.
pub struct AutoUnlockTimer {
    commands: mpsc::Sender<Command>,
    armed: Option<Deadline>,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    generation: u64,
}

enum Command {
    Arm(Deadline),
    Disarm,
}

impl std::fmt::Debug for AutoUnlockTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoUnlockTimer")
            .field("deadline", &self.deadline())
            .field("generation", &self.generation)
            .finish()
    }
}

impl AutoUnlockTimer {
    /// Starts the worker thread. It exits once the timer is dropped.
    pub fn new<F: Fn(u64) + Send + 'static>(on_expire: F) -> Self {
        let (commands, rx) = mpsc::channel();
        thread::spawn(move || run_worker(rx, on_expire));

        Self {
            commands,
            armed: None,
            generation: 0,
        }
    }

    /// Arms a fresh deadline `duration` from now, replacing any armed one.
    ///
    /// Returns the generation of the new deadline.
    pub fn arm(&mut self, duration: Duration) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        let deadline = Deadline {
            at: Instant::now() + duration,
            generation: self.generation,
        };

        let _ = self.commands.send(Command::Arm(deadline));
        self.armed = Some(deadline);
        deadline.generation
    }

    /// Cancels the armed deadline. Returns `false` if none was armed.
    pub fn disarm(&mut self) -> bool {
        if self.armed.take().is_none() {
            return false;
        }
        let _ = self.commands.send(Command::Disarm);
        true
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Returns `true` if `generation` is the deadline that is armed right now.
    pub fn is_current(&self, generation: u64) -> bool {
        self.armed
            .as_ref()
            .is_some_and(|deadline| deadline.generation == generation)
    }

    /// The instant the armed deadline fires at.
    pub fn deadline(&self) -> Option<Instant> {
        self.armed.as_ref().map(|deadline| deadline.at)
    }
}

fn run_worker<F: Fn(u64)>(rx: mpsc::Receiver<Command>, on_expire: F) {
    let mut armed: Option<Deadline> = None;

    loop {
        let command = match armed {
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some(deadline) => {
                let wait = deadline.at.saturating_duration_since(Instant::now());
                rx.recv_timeout(wait)
            }
        };

        match command {
            Ok(Command::Arm(deadline)) => armed = Some(deadline),
            Ok(Command::Disarm) => armed = None,
            Err(RecvTimeoutError::Timeout) => {
                if let Some(deadline) = armed.take() {
                    on_expire(deadline.generation);
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
