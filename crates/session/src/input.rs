use crate::keys::Key;

/// Single-line text buffer. Cursor is always at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    value: String,
}

impl TextInput {
    pub fn with_value(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn clear(&mut self) {
        self.value.clear();
    }

    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }

    /// Apply an editing key. Returns false if the key is not an edit.
    pub fn edit(&mut self, key: Key) -> bool {
        match key {
            Key::Char(c) => {
                self.value.push(c);
                true
            }
            Key::Backspace => {
                self.value.pop();
                true
            }
            Key::Ctrl('u') => {
                self.value.clear();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_append_and_pop() {
        let mut t = TextInput::default();
        for c in "web".chars() {
            assert!(t.edit(Key::Char(c)));
        }
        assert!(t.edit(Key::Backspace));
        assert_eq!(t.value(), "we");
        assert!(!t.edit(Key::Enter));
        assert!(t.edit(Key::Ctrl('u')));
        assert!(t.is_blank());
    }
}
