/// Terminal-independent key press. The binary maps terminal events onto this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Ctrl(char),
    Enter,
    Esc,
    Tab,
    BackTab,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Home,
    End,
}

impl Key {
    /// Vertical movement: arrows plus vi keys.
    pub(crate) fn vertical(self) -> Option<isize> {
        match self {
            Key::Up | Key::Char('k') => Some(-1),
            Key::Down | Key::Char('j') => Some(1),
            Key::PageUp => Some(-10),
            Key::PageDown => Some(10),
            _ => None,
        }
    }

    /// Arrow-only vertical movement, for contexts where letters are typed.
    pub(crate) fn arrows(self) -> Option<isize> {
        match self {
            Key::Up => Some(-1),
            Key::Down => Some(1),
            Key::PageUp => Some(-10),
            Key::PageDown => Some(10),
            _ => None,
        }
    }
}
