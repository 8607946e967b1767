// ABOUTME: Interactive prompts for passphrases, passwords and keyboard-interactive challenges
// ABOUTME: A trait seam so the auth chain can be driven by scripted answers in tests

use std::io::{self, BufRead, Write};

pub trait Prompter: Send + Sync {
    /// Read a line without echoing it back.
    fn secret(&self, prompt: &str) -> io::Result<String>;

    /// Read a line with normal echo.
    fn visible(&self, prompt: &str) -> io::Result<String>;

    /// Show text the server sent along with a challenge.
    fn notice(&self, text: &str);
}

/// Prompts on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn secret(&self, prompt: &str) -> io::Result<String> {
        rpassword::prompt_password(prompt)
    }

    fn visible(&self, prompt: &str) -> io::Result<String> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(prompt.as_bytes())?;
        stdout.flush()?;
        drop(stdout);

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(answer.trim().to_string())
    }

    fn notice(&self, text: &str) {
        println!("{text}");
    }
}
