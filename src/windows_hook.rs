//! Windows backend built on `WH_KEYBOARD_LL` and `WH_MOUSE_LL` hooks.
//!
//! Both hooks live on one dedicated thread that pumps a message loop. Windows
//! silently unregisters low-level hooks that exceed the system hook timeout,
//! so while input is locked a watchdog thread injects a tagged no-op key-up
//! every few seconds. If the keyboard hook does not see it, the watchdog
//! posts a notice to the hook thread, which runs it through the interceptor
//! as a [`DisableReason::Timeout`] event and re-registers both hooks in place.

use std::{
    cell::{Cell, OnceCell, RefCell},
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use windows::{
    Win32::{
        Foundation::{LPARAM, LRESULT, WPARAM},
        System::{LibraryLoader::GetModuleHandleW, Threading::GetCurrentThreadId},
        UI::{
            Input::KeyboardAndMouse::{
                INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYEVENTF_KEYUP, SendInput,
                VIRTUAL_KEY, VK__none_, VK_CONTROL, VK_LCONTROL, VK_LMENU, VK_LSHIFT, VK_LWIN,
                VK_MENU, VK_RCONTROL, VK_RMENU, VK_RSHIFT, VK_RWIN, VK_SHIFT,
            },
            WindowsAndMessaging::{
                CallNextHookEx, DispatchMessageW, GetMessageW, HC_ACTION, HHOOK, HOOKPROC,
                KBDLLHOOKSTRUCT, MSG, MSLLHOOKSTRUCT, PostThreadMessageW, SetWindowsHookExW,
                TranslateMessage, WH_KEYBOARD_LL, WH_MOUSE_LL, WINDOWS_HOOK_ID, WM_APP,
                WM_KEYDOWN, WM_KEYUP, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN, WM_MBUTTONUP,
                WM_MOUSEHWHEEL, WM_MOUSEMOVE, WM_MOUSEWHEEL, WM_QUIT, WM_RBUTTONDOWN,
                WM_RBUTTONUP, WM_SYSKEYDOWN, WM_SYSKEYUP, WM_XBUTTONDOWN, WM_XBUTTONUP,
            },
        },
    },
    core::Owned,
};

use crate::{
    error::{Error, Result},
    event::{Button, DisableReason, EventKind, InputEvent, KeyCode, Modifiers},
    hook::{EventTap, HookControl, Interceptor, TapHandle, Verdict},
    lock_state::LockEngine,
};

/// How often the watchdog checks that the hooks are still registered.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(5);

/// How long the watchdog waits for its heartbeat to reach the keyboard hook.
const HEARTBEAT_GRACE: Duration = Duration::from_secs(1);

/// Marks heartbeat input in `dwExtraInfo`.
const HEARTBEAT_TAG: usize = 0x4C4F_434B;

/// How often `remove` tries to deliver `WM_QUIT` before giving up.
const QUIT_ATTEMPTS: u32 = 5;
const QUIT_RETRY: Duration = Duration::from_millis(20);

/// Posted to the hook thread when a heartbeat went missing.
const WM_HOOK_DISABLED: u32 = WM_APP + 1;

thread_local! {
    static HOOK_THREAD: OnceCell<HookThread> = const { OnceCell::new() };
}

/// Installs low-level keyboard and mouse hooks.
///
/// By default a watchdog verifies the hooks every [`DEFAULT_HEARTBEAT`].
#[derive(Debug, Clone)]
pub struct WindowsTap {
    heartbeat: Option<Duration>,
}

impl WindowsTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the watchdog interval. `None` disables the watchdog, leaving a
    /// hook that Windows unregisters unrecovered.
    ///
    /// The heartbeat is injected input and resets the session idle timer, so
    /// it is only sent while input is locked. A hook dropped while unlocked
    /// is recovered within one interval of the next lock.
    pub fn set_heartbeat(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat = interval;
        self
    }
}

impl Default for WindowsTap {
    fn default() -> Self {
        Self {
            heartbeat: Some(DEFAULT_HEARTBEAT),
        }
    }
}

impl EventTap for WindowsTap {
    type Handle = WindowsHookHandle;

    fn install(&self, interceptor: Arc<Interceptor>) -> Result<WindowsHookHandle> {
        let heartbeats = Arc::new(AtomicU64::new(0));
        let stopping = Arc::new(AtomicBool::new(false));
        let engine = interceptor.engine().clone();
        let (result_tx, result_rx) = oneshot::channel::<Result<u32>>();

        let context = ThreadContext {
            interceptor,
            heartbeats: heartbeats.clone(),
            stopping: stopping.clone(),
        };
        let hook_thread = thread::spawn(move || run_hook_thread(context, result_tx));

        let thread_id = match result_rx.recv() {
            Ok(Ok(thread_id)) => thread_id,
            Ok(Err(e)) => {
                let _ = hook_thread.join();
                return Err(e);
            }
            Err(_) => return Err(Error::HookThreadCrashed),
        };

        let watchdog = self.heartbeat.map(|interval| {
            let (stop_tx, stop_rx) = oneshot::channel::<()>();
            let join = thread::spawn(move || {
                run_watchdog(thread_id, engine, heartbeats, interval, stop_rx)
            });
            Watchdog {
                _stop: stop_tx,
                join,
            }
        });

        Ok(WindowsHookHandle {
            thread_id,
            hook_thread,
            stopping,
            watchdog,
        })
    }
}

/// The hook thread together with its watchdog.
#[derive(Debug)]
pub struct WindowsHookHandle {
    thread_id: u32,
    hook_thread: thread::JoinHandle<()>,
    stopping: Arc<AtomicBool>,
    watchdog: Option<Watchdog>,
}

struct Watchdog {
    // Dropping the sender stops the watchdog.
    _stop: oneshot::Sender<()>,
    join: thread::JoinHandle<()>,
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog").finish_non_exhaustive()
    }
}

impl TapHandle for WindowsHookHandle {
    fn remove(self) {
        // From here on the hooks forward everything, even if the thread
        // cannot be told to quit.
        self.stopping.store(true, Ordering::Release);

        if let Some(watchdog) = self.watchdog {
            let Watchdog { _stop, join } = watchdog;
            drop(_stop);
            let _ = join.join();
        }

        // The hooks are released by the thread-local destructor when the
        // thread exits.
        let thread_id = self.thread_id;
        let posted = post_with_retry(|| unsafe {
            PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0))
        });
        if let Err(_e) = posted {
            #[cfg(feature = "log")]
            log::error!("failed to stop the hook thread, leaving it detached: {}", _e);
            return;
        }
        let _ = self.hook_thread.join();
    }
}

/// Everything the hook thread needs from the installing thread.
struct ThreadContext {
    interceptor: Arc<Interceptor>,
    heartbeats: Arc<AtomicU64>,
    stopping: Arc<AtomicBool>,
}

fn run_hook_thread(context: ThreadContext, result_tx: oneshot::Sender<Result<u32>>) {
    let hooks = match unsafe { register_hooks() } {
        Err(e) => {
            #[cfg(feature = "log")]
            log::error!("failed to register input hooks: {}", e);
            let _ = result_tx.send(Err(registration_error(e)));
            return;
        }
        Ok(hooks) => hooks,
    };

    HOOK_THREAD.with(|cell| {
        let _ = cell.set(HookThread::new(context, hooks));
    });

    let _ = result_tx.send(Ok(unsafe { GetCurrentThreadId() }));

    #[cfg(feature = "log")]
    log::debug!("registered low-level keyboard and mouse hooks");

    let mut msg = MSG::default();
    unsafe {
        while GetMessageW(&mut msg, None, 0, 0).into() {
            if msg.message == WM_HOOK_DISABLED {
                let notice = InputEvent::hook_disabled(DisableReason::Timeout);
                HOOK_THREAD.with(|cell| {
                    if let Some(thread) = cell.get() {
                        thread.interceptor.intercept(&notice, thread);
                    }
                });
                continue;
            }
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

fn run_watchdog(
    thread_id: u32,
    engine: LockEngine,
    heartbeats: Arc<AtomicU64>,
    interval: Duration,
    stop: oneshot::Receiver<()>,
) {
    loop {
        if !matches!(
            stop.recv_timeout(interval),
            Err(oneshot::RecvTimeoutError::Timeout)
        ) {
            return;
        }
        if !heartbeat_due(&engine) {
            continue;
        }

        let seen = heartbeats.load(Ordering::Acquire);
        if let Err(_e) = send_heartbeat() {
            #[cfg(feature = "log")]
            log::error!("failed to send hook heartbeat: {}", _e);
            continue;
        }

        if !matches!(
            stop.recv_timeout(HEARTBEAT_GRACE),
            Err(oneshot::RecvTimeoutError::Timeout)
        ) {
            return;
        }

        if heartbeats.load(Ordering::Acquire) == seen {
            let posted =
                unsafe { PostThreadMessageW(thread_id, WM_HOOK_DISABLED, WPARAM(0), LPARAM(0)) };
            if posted.is_err() {
                return;
            }
        }
    }
}

/// Injected heartbeats count as user activity, so they are only sent while
/// there is input to protect.
fn heartbeat_due(engine: &LockEngine) -> bool {
    engine.current_state().is_locked()
}

fn post_with_retry<F>(mut post: F) -> windows::core::Result<()>
where
    F: FnMut() -> windows::core::Result<()>,
{
    let mut result = post();
    for _ in 1..QUIT_ATTEMPTS {
        if result.is_ok() {
            break;
        }
        thread::sleep(QUIT_RETRY);
        result = post();
    }
    result
}

/// State owned by the hook thread and reachable from the hook procedures.
struct HookThread {
    interceptor: Arc<Interceptor>,
    heartbeats: Arc<AtomicU64>,
    stopping: Arc<AtomicBool>,
    hooks: RefCell<Hooks>,
    // Tracked from the raw hook stream: keys swallowed here never update the
    // async key state.
    held_modifiers: Cell<u8>,
    held_buttons: Cell<u8>,
}

#[derive(Default)]
struct Hooks {
    _keyboard: Option<Owned<HHOOK>>,
    _mouse: Option<Owned<HHOOK>>,
}

impl HookControl for HookThread {
    fn reenable(&self) {
        let mut hooks = self.hooks.borrow_mut();
        // Release the revoked registrations first so the two never overlap.
        *hooks = Hooks::default();
        match unsafe { register_hooks() } {
            Ok(registered) => {
                *hooks = registered;
                #[cfg(feature = "log")]
                log::info!("re-registered low-level input hooks");
            }
            Err(_e) => {
                #[cfg(feature = "log")]
                log::error!("failed to re-register low-level input hooks: {}", _e);
            }
        }
    }
}

impl HookThread {
    fn new(context: ThreadContext, hooks: Hooks) -> Self {
        Self {
            interceptor: context.interceptor,
            heartbeats: context.heartbeats,
            stopping: context.stopping,
            hooks: RefCell::new(hooks),
            held_modifiers: Cell::new(0),
            held_buttons: Cell::new(0),
        }
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    fn keyboard_event(&self, kbd: &KBDLLHOOKSTRUCT, w_param: WPARAM) -> Verdict {
        if kbd.dwExtraInfo == HEARTBEAT_TAG {
            self.heartbeats.fetch_add(1, Ordering::Release);
            return Verdict::Swallow;
        }
        if self.is_stopping() {
            return Verdict::Forward;
        }

        let Some(is_down) = key_is_down(w_param) else {
            return Verdict::Forward;
        };
        let vk = VIRTUAL_KEY(kbd.vkCode as u16);
        let key_code = KeyCode(vk.0);

        let event = if let Some(bit) = modifier_bit(vk) {
            let held = if is_down {
                self.held_modifiers.get() | bit
            } else {
                self.held_modifiers.get() & !bit
            };
            self.held_modifiers.set(held);
            InputEvent::modifiers_changed(key_code, self.modifiers())
        } else if is_down {
            InputEvent::key_down(key_code, self.modifiers())
        } else {
            InputEvent::key_up(key_code, self.modifiers())
        };

        self.interceptor.intercept(&event, self)
    }

    fn mouse_event(&self, mouse: &MSLLHOOKSTRUCT, w_param: WPARAM) -> Verdict {
        if self.is_stopping() {
            return Verdict::Forward;
        }

        let message = w_param.0 as u32;
        let kind = match message {
            WM_MOUSEMOVE => match self.held_button() {
                Some(button) => EventKind::PointerDrag(button),
                None => EventKind::PointerMove,
            },
            WM_LBUTTONDOWN => self.press(Button::Left),
            WM_LBUTTONUP => self.release(Button::Left),
            WM_RBUTTONDOWN => self.press(Button::Right),
            WM_RBUTTONUP => self.release(Button::Right),
            WM_MBUTTONDOWN => self.press(Button::Middle),
            WM_MBUTTONUP => self.release(Button::Middle),
            WM_XBUTTONDOWN => self.press(Button::Extra(x_button(mouse))),
            WM_XBUTTONUP => self.release(Button::Extra(x_button(mouse))),
            WM_MOUSEWHEEL | WM_MOUSEHWHEEL => EventKind::Scroll,
            _ => EventKind::Other,
        };

        let event = InputEvent::pointer(kind, self.modifiers());
        self.interceptor.intercept(&event, self)
    }

    fn modifiers(&self) -> Modifiers {
        let held = self.held_modifiers.get();
        let mut modifiers = Modifiers::empty();
        for (mask, modifier) in [
            (SHIFT_BITS, Modifiers::SHIFT),
            (CONTROL_BITS, Modifiers::CONTROL),
            (ALT_BITS, Modifiers::ALT),
            (META_BITS, Modifiers::META),
        ] {
            if held & mask != 0 {
                modifiers |= modifier;
            }
        }
        modifiers
    }

    fn press(&self, button: Button) -> EventKind {
        self.held_buttons
            .set(self.held_buttons.get() | button_bit(button));
        EventKind::PointerDown(button)
    }

    fn release(&self, button: Button) -> EventKind {
        self.held_buttons
            .set(self.held_buttons.get() & !button_bit(button));
        EventKind::PointerUp(button)
    }

    fn held_button(&self) -> Option<Button> {
        let held = self.held_buttons.get();
        [
            Button::Left,
            Button::Right,
            Button::Middle,
            Button::Extra(1),
            Button::Extra(2),
        ]
        .into_iter()
        .find(|button| held & button_bit(*button) != 0)
    }
}

const SHIFT_BITS: u8 = 0b0000_0011;
const CONTROL_BITS: u8 = 0b0000_1100;
const ALT_BITS: u8 = 0b0011_0000;
const META_BITS: u8 = 0b1100_0000;

/// One bit per physical modifier key, so releasing one side of a modifier
/// while the other side is held keeps the modifier active.
fn modifier_bit(vk: VIRTUAL_KEY) -> Option<u8> {
    match vk {
        VK_LSHIFT | VK_SHIFT => Some(1 << 0),
        VK_RSHIFT => Some(1 << 1),
        VK_LCONTROL | VK_CONTROL => Some(1 << 2),
        VK_RCONTROL => Some(1 << 3),
        VK_LMENU | VK_MENU => Some(1 << 4),
        VK_RMENU => Some(1 << 5),
        VK_LWIN => Some(1 << 6),
        VK_RWIN => Some(1 << 7),
        _ => None,
    }
}

fn button_bit(button: Button) -> u8 {
    match button {
        Button::Left => 1 << 0,
        Button::Right => 1 << 1,
        Button::Middle => 1 << 2,
        Button::Extra(n) => 1 << (2 + n.clamp(1, 5)),
    }
}

fn x_button(mouse: &MSLLHOOKSTRUCT) -> u8 {
    (mouse.mouseData >> 16) as u8
}

fn key_is_down(w_param: WPARAM) -> Option<bool> {
    match w_param.0 as u32 {
        WM_KEYDOWN | WM_SYSKEYDOWN => Some(true),
        WM_KEYUP | WM_SYSKEYUP => Some(false),
        _ => None,
    }
}

unsafe extern "system" fn low_level_keyboard_proc(
    n_code: i32,
    w_param: WPARAM,
    l_param: LPARAM,
) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        let kbd = unsafe { *(l_param.0 as *const KBDLLHOOKSTRUCT) };
        let verdict =
            HOOK_THREAD.with(|cell| cell.get().map(|thread| thread.keyboard_event(&kbd, w_param)));
        if verdict == Some(Verdict::Swallow) {
            return LRESULT(1);
        }
    }

    unsafe { CallNextHookEx(None, n_code, w_param, l_param) }
}

unsafe extern "system" fn low_level_mouse_proc(
    n_code: i32,
    w_param: WPARAM,
    l_param: LPARAM,
) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        let mouse = unsafe { *(l_param.0 as *const MSLLHOOKSTRUCT) };
        let verdict =
            HOOK_THREAD.with(|cell| cell.get().map(|thread| thread.mouse_event(&mouse, w_param)));
        if verdict == Some(Verdict::Swallow) {
            return LRESULT(1);
        }
    }

    unsafe { CallNextHookEx(None, n_code, w_param, l_param) }
}

unsafe fn register_hooks() -> io::Result<Hooks> {
    let keyboard = unsafe { register_hook(WH_KEYBOARD_LL, Some(low_level_keyboard_proc)) }?;
    let mouse = unsafe { register_hook(WH_MOUSE_LL, Some(low_level_mouse_proc)) }?;
    Ok(Hooks {
        _keyboard: Some(keyboard),
        _mouse: Some(mouse),
    })
}

unsafe fn register_hook(id: WINDOWS_HOOK_ID, f: HOOKPROC) -> io::Result<Owned<HHOOK>> {
    let module = unsafe { GetModuleHandleW(None) }?;
    let hook = unsafe { SetWindowsHookExW(id, f, Some(module.into()), 0) }?;

    Ok(unsafe { Owned::new(hook) })
}

fn registration_error(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::PermissionDenied {
        Error::PermissionDenied
    } else {
        Error::HookRegistrationFailed(e)
    }
}

/// Injects a key-up of the reserved no-op key, tagged so the keyboard hook
/// recognises it.
fn send_heartbeat() -> io::Result<()> {
    let inputs = [INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VK__none_,
                dwFlags: KEYEVENTF_KEYUP,
                dwExtraInfo: HEARTBEAT_TAG,
                ..Default::default()
            },
        },
    }];

    let sent = unsafe { SendInput(&inputs, std::mem::size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use windows::Win32::Foundation::E_FAIL;

    use super::*;
    use crate::{classifier::UnlockCombo, config};

    fn hook_thread(stopping: bool) -> HookThread {
        let engine = LockEngine::new(Duration::from_secs(60));
        engine.lock();
        let combo = UnlockCombo::new(
            config::DEFAULT_UNLOCK_KEY,
            config::DEFAULT_UNLOCK_MODIFIERS,
        );
        let context = ThreadContext {
            interceptor: Arc::new(Interceptor::new(engine, combo)),
            heartbeats: Arc::new(AtomicU64::new(0)),
            stopping: Arc::new(AtomicBool::new(stopping)),
        };
        HookThread::new(context, Hooks::default())
    }

    fn key_down() -> (KBDLLHOOKSTRUCT, WPARAM) {
        let kbd = KBDLLHOOKSTRUCT {
            vkCode: 0x41,
            ..Default::default()
        };
        (kbd, WPARAM(WM_KEYDOWN as usize))
    }

    #[test]
    fn locked_hooks_swallow_input() {
        let thread = hook_thread(false);
        let (kbd, w_param) = key_down();
        let click = WPARAM(WM_LBUTTONDOWN as usize);

        assert_eq!(thread.keyboard_event(&kbd, w_param), Verdict::Swallow);
        assert_eq!(
            thread.mouse_event(&MSLLHOOKSTRUCT::default(), click),
            Verdict::Swallow
        );
    }

    #[test]
    fn stopping_hooks_forward_input_while_locked() {
        let thread = hook_thread(true);
        let (kbd, w_param) = key_down();
        let click = WPARAM(WM_LBUTTONDOWN as usize);

        assert!(thread.interceptor.engine().current_state().is_locked());
        assert_eq!(thread.keyboard_event(&kbd, w_param), Verdict::Forward);
        assert_eq!(
            thread.mouse_event(&MSLLHOOKSTRUCT::default(), click),
            Verdict::Forward
        );
    }

    #[test]
    fn stopping_hooks_still_count_heartbeats() {
        let thread = hook_thread(true);
        let kbd = KBDLLHOOKSTRUCT {
            dwExtraInfo: HEARTBEAT_TAG,
            ..Default::default()
        };

        assert_eq!(
            thread.keyboard_event(&kbd, WPARAM(WM_KEYUP as usize)),
            Verdict::Swallow
        );
        assert_eq!(thread.heartbeats.load(Ordering::Acquire), 1);
    }

    #[test]
    fn quit_post_is_retried_until_delivered() {
        let mut calls = 0;
        let posted = post_with_retry(|| {
            calls += 1;
            if calls < 3 {
                Err(windows::core::Error::from_hresult(E_FAIL))
            } else {
                Ok(())
            }
        });

        assert!(posted.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn quit_post_gives_up_after_bounded_attempts() {
        let mut calls = 0;
        let posted = post_with_retry(|| {
            calls += 1;
            Err(windows::core::Error::from_hresult(E_FAIL))
        });

        assert!(posted.is_err());
        assert_eq!(calls, QUIT_ATTEMPTS);
    }

    #[test]
    fn heartbeat_only_runs_while_locked() {
        let engine = LockEngine::new(Duration::from_secs(60));
        assert!(!heartbeat_due(&engine));

        engine.lock();
        assert!(heartbeat_due(&engine));

        engine.unlock();
        assert!(!heartbeat_due(&engine));
    }
}
