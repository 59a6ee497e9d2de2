//! UTF-8 safe text editing state with cursor management.
//!
//! Shared by every widget with a typed text part: plain text fields, the
//! combobox search box, file paths and the date/time parts.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
    /// Byte index into `text`, always on a char boundary.
    cursor: usize,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Empty text reads as no value. Whitespace is kept as typed.
    pub fn value(&self) -> Option<String> {
        (!self.text.is_empty()).then(|| self.text.clone())
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Replaces the whole text and moves the cursor to the end.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.cursor = self.text.len();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn move_left(&mut self) {
        if let Some(prev) = self.text[..self.cursor].chars().last() {
            self.cursor -= prev.len_utf8();
        }
    }

    pub fn move_right(&mut self) {
        if let Some(next) = self.text[self.cursor..].chars().next() {
            self.cursor += next.len_utf8();
        }
    }

    pub fn insert_char(&mut self, c: char) {
        self.text.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    /// Deletes the char before the cursor.
    pub fn backspace(&mut self) {
        let Some(prev) = self.text[..self.cursor].chars().last() else {
            return;
        };
        let start = self.cursor - prev.len_utf8();
        self.text.drain(start..self.cursor);
        self.cursor = start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_move_insert_backspace() {
        let mut buffer = TextBuffer::new();
        buffer.set_text("h🙂llo");
        buffer.move_left();
        buffer.move_left();
        buffer.move_left();
        buffer.backspace();
        assert_eq!(buffer.text(), "hllo");
        buffer.insert_char('e');
        assert_eq!(buffer.text(), "hello");
        buffer.move_right();
        buffer.backspace();
        assert_eq!(buffer.text(), "helo");
    }

    #[test]
    fn empty_text_has_no_value_but_whitespace_does() {
        let mut buffer = TextBuffer::new();
        assert_eq!(buffer.value(), None);
        buffer.set_text(" ");
        assert_eq!(buffer.value().as_deref(), Some(" "));
        assert!(buffer.is_blank());
        buffer.backspace();
        assert_eq!(buffer.value(), None);
    }
}
