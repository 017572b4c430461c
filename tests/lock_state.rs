use std::{
    sync::mpsc::RecvTimeoutError,
    thread,
    time::{Duration, Instant},
};

use input_lockout::{
    lock_state::{LockEngine, LockState},
    timer::AutoUnlockTimer,
};

const LONG: Duration = Duration::from_secs(60);
const SHORT: Duration = Duration::from_millis(100);
const WAIT: Duration = Duration::from_secs(5);

#[test]
fn starts_unlocked_without_timer() {
    let engine = LockEngine::new(LONG);

    assert_eq!(engine.current_state(), LockState::Unlocked);
    assert!(!engine.is_timer_armed());
    assert_eq!(engine.deadline(), None);
    assert_eq!(engine.remaining(), None);
}

#[test]
fn lock_arms_timer_for_configured_duration() {
    let engine = LockEngine::new(LONG);

    let before = Instant::now();
    engine.lock();
    let after = Instant::now();

    assert_eq!(engine.current_state(), LockState::Locked);
    assert!(engine.is_timer_armed());
    let deadline = engine.deadline().unwrap();
    assert!(deadline >= before + LONG);
    assert!(deadline <= after + LONG);
    assert!(engine.remaining().unwrap() <= LONG);
}

#[test]
fn lock_then_unlock_leaves_no_timer() {
    let engine = LockEngine::new(LONG);

    engine.lock();
    engine.unlock();

    assert_eq!(engine.current_state(), LockState::Unlocked);
    assert!(!engine.is_timer_armed());

    engine.unlock();
    assert_eq!(engine.current_state(), LockState::Unlocked);
    assert!(!engine.is_timer_armed());
}

#[test]
fn relock_resets_deadline() {
    let engine = LockEngine::new(LONG);

    engine.lock();
    let first = engine.deadline().unwrap();
    thread::sleep(Duration::from_millis(20));
    engine.lock();
    let second = engine.deadline().unwrap();

    assert_eq!(engine.current_state(), LockState::Locked);
    assert!(second > first);
}

#[test]
fn relock_does_not_stack_deadlines() {
    let engine = LockEngine::new(Duration::from_millis(600));

    engine.lock();
    thread::sleep(Duration::from_millis(400));
    engine.lock();
    // The first deadline has passed by now; only the renewed one counts.
    thread::sleep(Duration::from_millis(400));

    assert_eq!(engine.current_state(), LockState::Locked);
    assert!(engine.is_timer_armed());
}

#[test]
fn toggle_alternates() {
    let engine = LockEngine::new(LONG);

    assert_eq!(engine.toggle(), LockState::Locked);
    assert!(engine.is_timer_armed());
    assert_eq!(engine.toggle(), LockState::Unlocked);
    assert!(!engine.is_timer_armed());
}

#[test]
fn auto_unlock_fires_without_external_calls() {
    let engine = LockEngine::new(SHORT);
    let changes = engine.subscribe();

    engine.lock();
    assert_eq!(changes.recv_timeout(WAIT), Ok(LockState::Locked));
    assert_eq!(changes.recv_timeout(WAIT), Ok(LockState::Unlocked));

    assert_eq!(engine.current_state(), LockState::Unlocked);
    assert!(!engine.is_timer_armed());
}

#[test]
fn unlock_cancels_pending_deadline() {
    let engine = LockEngine::new(SHORT);
    let changes = engine.subscribe();

    engine.lock();
    engine.unlock();
    engine.lock();
    engine.unlock();

    let received: Vec<_> = changes.try_iter().collect();
    assert_eq!(
        received,
        vec![
            LockState::Locked,
            LockState::Unlocked,
            LockState::Locked,
            LockState::Unlocked
        ]
    );

    thread::sleep(SHORT * 3);
    assert_eq!(changes.try_recv(), Err(std::sync::mpsc::TryRecvError::Empty));
}

#[test]
fn disarmed_deadline_does_not_unlock_a_later_lock() {
    let engine = LockEngine::new(Duration::from_millis(400));
    let changes = engine.subscribe();

    engine.lock();
    thread::sleep(Duration::from_millis(250));
    engine.unlock();
    engine.lock();
    // Past the first deadline, before the second one.
    thread::sleep(Duration::from_millis(250));

    assert_eq!(engine.current_state(), LockState::Locked);
    let received: Vec<_> = changes.try_iter().collect();
    assert_eq!(
        received,
        vec![LockState::Locked, LockState::Unlocked, LockState::Locked]
    );
}

#[test]
fn renewals_and_repeated_unlocks_are_not_announced() {
    let engine = LockEngine::new(LONG);
    let changes = engine.subscribe();

    engine.unlock();
    engine.lock();
    engine.lock();
    engine.unlock();
    engine.unlock();

    let received: Vec<_> = changes.try_iter().collect();
    assert_eq!(received, vec![LockState::Locked, LockState::Unlocked]);
}

#[test]
fn dropped_subscribers_are_pruned() {
    let engine = LockEngine::new(LONG);
    drop(engine.subscribe());
    let changes = engine.subscribe();

    engine.lock();

    assert_eq!(changes.recv_timeout(WAIT), Ok(LockState::Locked));
}

#[test]
fn concurrent_transitions_keep_timer_consistent() {
    let engine = LockEngine::new(LONG);

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    if i % 2 == 0 {
                        engine.lock();
                    } else {
                        engine.unlock();
                    }
                    engine.toggle();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(
        engine.is_timer_armed(),
        engine.current_state() == LockState::Locked
    );
}

#[test]
fn engine_drop_silences_timer() {
    let engine = LockEngine::new(SHORT);
    let changes = engine.subscribe();
    engine.lock();
    assert_eq!(changes.recv_timeout(WAIT), Ok(LockState::Locked));

    drop(engine);

    assert_eq!(
        changes.recv_timeout(SHORT * 3),
        Err(RecvTimeoutError::Disconnected)
    );
}

#[test]
fn timer_arm_replaces_previous_deadline() {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut timer = AutoUnlockTimer::new(move |generation| {
        let _ = tx.send(generation);
    });

    let first = timer.arm(Duration::from_millis(50));
    let second = timer.arm(LONG);

    assert_ne!(first, second);
    assert!(timer.is_current(second));
    assert!(!timer.is_current(first));
    // The replaced deadline never fires.
    assert_eq!(
        rx.recv_timeout(Duration::from_millis(300)),
        Err(RecvTimeoutError::Timeout)
    );

    assert!(timer.disarm());
    assert!(!timer.disarm());
    assert!(!timer.is_armed());
}

#[test]
fn timer_disarm_prevents_expiry() {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut timer = AutoUnlockTimer::new(move |generation| {
        let _ = tx.send(generation);
    });

    timer.arm(Duration::from_millis(50));
    timer.disarm();

    assert_eq!(
        rx.recv_timeout(Duration::from_millis(300)),
        Err(RecvTimeoutError::Timeout)
    );
}

#[test]
fn timer_fires_with_its_generation() {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut timer = AutoUnlockTimer::new(move |generation| {
        let _ = tx.send(generation);
    });

    let generation = timer.arm(Duration::from_millis(20));

    assert_eq!(rx.recv_timeout(WAIT), Ok(generation));
    // Firing does not disarm on its own; the owner decides.
    assert!(timer.is_current(generation));
}

#[test]
fn timer_serves_successive_deadlines() {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut timer = AutoUnlockTimer::new(move |generation| {
        let _ = tx.send(generation);
    });

    let first = timer.arm(Duration::from_millis(20));
    assert_eq!(rx.recv_timeout(WAIT), Ok(first));
    let second = timer.arm(Duration::from_millis(20));
    assert_eq!(rx.recv_timeout(WAIT), Ok(second));
}
