// ABOUTME: SSH side of the tool: config parsing, authentication and the interactive session
// ABOUTME: Everything here talks to russh or reads OpenSSH files; terminal handling lives in crate::terminal

pub mod agent;
pub mod auth;
pub mod parser;
pub mod prompt;
pub mod session;

pub use parser::{HostRecord, parse_ssh_config};
pub use prompt::TerminalPrompter;
pub use session::SessionManager;
