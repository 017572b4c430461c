#[cfg(windows)]
fn main() {
    #[cfg(feature = "log")]
    colog::init();

    let lockout = input_lockout::start(Default::default()).unwrap();

    // Runs until the unlock combo or the failsafe lifts the lock.
    for state in lockout.subscribe() {
        if !state.is_locked() {
            break;
        }
    }
    lockout.stop();
}

#[cfg(not(windows))]
fn main() {
    eprintln!("input hooks are only available on Windows");
}
