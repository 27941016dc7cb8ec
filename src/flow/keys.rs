//! Enter-to-continue keyboard policy.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub shift: bool,
}

impl KeyEvent {
    #[must_use]
    pub const fn enter() -> Self {
        Self {
            key: Key::Enter,
            shift: false,
        }
    }

    #[must_use]
    pub const fn shift_enter() -> Self {
        Self {
            key: Key::Enter,
            shift: true,
        }
    }
}

/// Where keyboard focus sits when the key arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    SingleLine,
    MultiLine,
    Elsewhere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Treat as `go_next`.
    Commit,
    /// Let the focused input handle it.
    PassThrough,
}

/// Enter without Shift commits, except inside a multi-line field, on the
/// terminal screen, or while voice capture is busy.
#[must_use]
pub const fn resolve(event: KeyEvent, focus: Focus, terminal: bool, capture_busy: bool) -> KeyAction {
    if terminal || capture_busy {
        return KeyAction::PassThrough;
    }
    match (event.key, event.shift, focus) {
        (Key::Enter, false, Focus::SingleLine | Focus::Elsewhere) => KeyAction::Commit,
        _ => KeyAction::PassThrough,
    }
}
