/// A key press relevant to the note input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter { shift: bool },
    Char(char),
    Backspace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The buffer should be submitted as a note.
    Submit,
    /// The buffer changed.
    Edited,
}

/// Uncommitted input text. Nothing here is persisted.
#[derive(Debug, Default, Clone)]
pub struct InputBuffer {
    text: String,
}

impl InputBuffer {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Enter submits without inserting a newline. Shift+Enter inserts a raw
    /// newline and never formats.
    pub fn handle_key(&mut self, key: Key) -> KeyOutcome {
        match key {
            Key::Enter { shift: false } => KeyOutcome::Submit,
            Key::Enter { shift: true } => {
                self.text.push('\n');
                KeyOutcome::Edited
            }
            Key::Char(c) => {
                self.text.push(c);
                KeyOutcome::Edited
            }
            Key::Backspace => {
                self.text.pop();
                KeyOutcome::Edited
            }
        }
    }

    /// Feed one terminal line. A trailing `\` stands in for Shift+Enter.
    pub fn handle_line(&mut self, line: &str) -> KeyOutcome {
        let (body, continued) = match line.strip_suffix('\\') {
            Some(body) => (body, true),
            None => (line, false),
        };
        for c in body.chars() {
            self.handle_key(Key::Char(c));
        }
        self.handle_key(Key::Enter { shift: continued })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_submits_without_newline() {
        let mut input = InputBuffer::default();
        input.handle_key(Key::Char('h'));
        input.handle_key(Key::Char('i'));
        assert_eq!(input.handle_key(Key::Enter { shift: false }), KeyOutcome::Submit);
        assert_eq!(input.text(), "hi");
    }

    #[test]
    fn shift_enter_inserts_newline() {
        let mut input = InputBuffer::default();
        input.set_text("* a");
        assert_eq!(input.handle_key(Key::Enter { shift: true }), KeyOutcome::Edited);
        assert_eq!(input.text(), "* a\n");
    }

    #[test]
    fn backspace_removes_last_char() {
        let mut input = InputBuffer::default();
        input.set_text("ab");
        input.handle_key(Key::Backspace);
        assert_eq!(input.text(), "a");
    }

    #[test]
    fn trailing_backslash_continues_the_note() {
        let mut input = InputBuffer::default();
        assert_eq!(input.handle_line("first\\"), KeyOutcome::Edited);
        assert_eq!(input.handle_line("second"), KeyOutcome::Submit);
        assert_eq!(input.text(), "first\nsecond");
    }
}
