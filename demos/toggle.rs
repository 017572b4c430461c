//! Locks input for one minute, then toggles the lock every time Enter is
//! pressed on the console while unlocked.

#[cfg(windows)]
fn main() {
    use std::{io::BufRead, thread, time::Duration};

    use input_lockout::{
        classifier::UnlockCombo,
        config::Config,
        event::{KeyCode, Modifiers},
    };

    #[cfg(feature = "log")]
    colog::init();

    let config = Config::default()
        .set_auto_unlock(Duration::from_secs(60))
        .set_unlock_combo(UnlockCombo::new(
            KeyCode(0x4C),
            Modifiers::CONTROL | Modifiers::ALT,
        ));
    let lockout = input_lockout::start(config).unwrap();

    let changes = lockout.subscribe();
    thread::spawn(move || {
        for state in changes {
            println!("input {}", state);
        }
    });

    println!("locked; press Ctrl+Alt+L to unlock, then Enter to lock again");
    for _line in std::io::stdin().lock().lines() {
        let state = lockout.toggle();
        if let Some(remaining) = lockout.remaining() {
            println!("{} for up to {:?}", state, remaining);
        }
    }
}

#[cfg(not(windows))]
fn main() {
    eprintln!("input hooks are only available on Windows");
}
