// ABOUTME: Host selection: the selector contract and the terminal picker that implements it
// ABOUTME: The picker is plain state driven by key events and drawn with ratatui

pub mod host_list;
pub mod picker;
pub mod search_input;

pub use host_list::HostList;
pub use picker::Picker;
pub use search_input::SearchInput;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Index into the host list handed to the selector.
    Chosen(usize),
    Cancelled,
}

/// Interactive choice of one host out of many.
pub trait HostSelector {
    fn select(&mut self, displays: &[String], previews: &[String], query: &str) -> Result<Selection>;
}
