//! Platform-neutral input events as seen at the hook boundary.
//!
//! Backends translate whatever the operating system delivers into an
//! [`InputEvent`] and hand it to the [`Interceptor`](crate::hook::Interceptor).
//! Tests build the same values by hand.

use std::{
    fmt::Display,
    ops::{BitOr, BitOrAssign},
};

/// A platform key identifier.
///
/// On Windows this is the virtual-key code of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u16);

/// A set of held modifier keys.
///
/// Left and right variants of a modifier are not distinguished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const SHIFT: Modifiers = Modifiers(1 << 0);
    pub const CONTROL: Modifiers = Modifiers(1 << 1);
    pub const ALT: Modifiers = Modifiers(1 << 2);
    /// The Windows key, or Command on macOS keyboards.
    pub const META: Modifiers = Modifiers(1 << 3);

    pub const fn empty() -> Self {
        Modifiers(0)
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every modifier in `other` is also held in `self`.
    pub const fn contains(&self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Modifiers) -> Self {
        Modifiers(self.0 | other.0)
    }

    pub fn insert(&mut self, other: Modifiers) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Modifiers) {
        self.0 &= !other.0;
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl BitOrAssign for Modifiers {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl Display for Modifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = [
            (Modifiers::CONTROL, "Ctrl"),
            (Modifiers::ALT, "Alt"),
            (Modifiers::SHIFT, "Shift"),
            (Modifiers::META, "Meta"),
        ];
        let mut first = true;
        for (modifier, name) in names {
            if self.contains(modifier) {
                if !first {
                    write!(f, "+")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// A pointer button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Left,
    Right,
    Middle,
    /// An extra button, numbered from 1.
    Extra(u8),
}

/// Why the operating system stopped delivering events to the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableReason {
    /// The hook took too long to answer and was considered unresponsive.
    Timeout,
    /// The hook was disabled in response to user input.
    UserInput,
}

impl Display for DisableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DisableReason::Timeout => "timeout",
            DisableReason::UserInput => "user input",
        };
        write!(f, "{}", s)
    }
}

/// The kind of an observed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    KeyDown,
    KeyUp,
    /// A modifier key was pressed or released.
    ModifiersChanged,
    PointerMove,
    /// The pointer moved while a button was held.
    PointerDrag(Button),
    PointerDown(Button),
    PointerUp(Button),
    Scroll,
    /// Any other input the hook observes.
    Other,
    /// Not input: the OS revoked the hook and is telling us about it.
    HookDisabled(DisableReason),
}

/// A single event observed by the hook.
///
/// Lives only for the duration of one callback invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: EventKind,
    /// Present only for key events.
    pub key_code: Option<KeyCode>,
    /// Modifiers held when the event was generated.
    pub modifiers: Modifiers,
}

impl InputEvent {
    pub fn key_down(key_code: KeyCode, modifiers: Modifiers) -> Self {
        Self {
            kind: EventKind::KeyDown,
            key_code: Some(key_code),
            modifiers,
        }
    }

    pub fn key_up(key_code: KeyCode, modifiers: Modifiers) -> Self {
        Self {
            kind: EventKind::KeyUp,
            key_code: Some(key_code),
            modifiers,
        }
    }

    pub fn modifiers_changed(key_code: KeyCode, modifiers: Modifiers) -> Self {
        Self {
            kind: EventKind::ModifiersChanged,
            key_code: Some(key_code),
            modifiers,
        }
    }

    /// Builds a non-key event. `kind` should not be a key event kind.
    pub fn pointer(kind: EventKind, modifiers: Modifiers) -> Self {
        Self {
            kind,
            key_code: None,
            modifiers,
        }
    }

    pub fn hook_disabled(reason: DisableReason) -> Self {
        Self {
            kind: EventKind::HookDisabled(reason),
            key_code: None,
            modifiers: Modifiers::empty(),
        }
    }

    /// Returns `true` for revocation notices, which are not user input.
    pub fn is_hook_disabled(&self) -> bool {
        matches!(self.kind, EventKind::HookDisabled(_))
    }
}
