// ABOUTME: Query line of the host picker
// ABOUTME: Plain text state edited by key presses; rendering lives in the picker

#[derive(Clone, Debug, Default)]
pub struct SearchInput {
    pub query: String,
    pub prompt: String,
}

impl SearchInput {
    pub fn new(prompt: String, query: String) -> Self {
        Self { query, prompt }
    }

    pub fn handle_input(&mut self, c: char) {
        self.query.push(c);
    }

    pub fn handle_backspace(&mut self) {
        self.query.pop();
    }

    /// Ctrl-W: drop trailing whitespace, then the word before it.
    pub fn delete_word(&mut self) {
        let trimmed = self.query.trim_end().len();
        self.query.truncate(trimmed);
        let cut = self
            .query
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        self.query.truncate(cut);
    }

    pub fn clear(&mut self) {
        self.query.clear();
    }

    /// Prompt followed by the query, as drawn on screen.
    pub fn line(&self) -> String {
        format!("{}{}", self.prompt, self.query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typing_and_backspace() {
        let mut input = SearchInput::new("SSH > ".to_string(), String::new());
        input.handle_input('w');
        input.handle_input('e');
        input.handle_input('b');
        assert_eq!(input.query, "web");

        input.handle_backspace();
        assert_eq!(input.query, "we");
        assert_eq!(input.line(), "SSH > we");
    }

    #[test]
    fn test_backspace_on_empty_query() {
        let mut input = SearchInput::default();
        input.handle_backspace();
        assert!(input.query.is_empty());
    }

    #[test]
    fn test_delete_word() {
        let mut input = SearchInput::new(String::new(), "prod web  ".to_string());
        input.delete_word();
        assert_eq!(input.query, "prod ");
        input.delete_word();
        assert_eq!(input.query, "");
    }

    #[test]
    fn test_delete_word_after_wide_space() {
        let mut input = SearchInput::new(String::new(), "prod\u{3000}web".to_string());
        input.delete_word();
        assert_eq!(input.query, "prod\u{3000}");
        input.delete_word();
        assert_eq!(input.query, "");
    }

    #[test]
    fn test_clear() {
        let mut input = SearchInput::new(String::new(), "db".to_string());
        input.clear();
        assert!(input.query.is_empty());
    }
}
