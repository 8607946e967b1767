// ABOUTME: Full-screen fuzzy host picker drawn with ratatui
// ABOUTME: Key handling is pure state so selection behaviour is testable without a terminal

use std::io::IsTerminal;

use ratatui::{
    DefaultTerminal, Frame,
    crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    layout::{Constraint, Layout},
    style::{Modifier, Style},
    text::Line,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};

use super::{HostList, HostSelector, SearchInput, Selection};
use crate::config::UiSettings;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::fuzzy::SearchEngine;

pub struct PickerState {
    pub input: SearchInput,
    pub list: HostList,
    engine: SearchEngine,
    case_sensitive: bool,
    max_results: usize,
}

impl PickerState {
    pub fn new(displays: &[String], settings: &UiSettings, query: &str) -> Self {
        let engine = SearchEngine::new(displays.to_vec());
        let list = HostList::new(engine.search(query, settings.case_sensitive, settings.max_results));

        Self {
            input: SearchInput::new(settings.prompt.clone(), query.to_string()),
            list,
            engine,
            case_sensitive: settings.case_sensitive,
            max_results: settings.max_results,
        }
    }

    fn refilter(&mut self) {
        let matches = self
            .engine
            .search(&self.input.query, self.case_sensitive, self.max_results);
        self.list.set_matches(matches);
    }

    /// Apply one key press; `Some` once the user has decided.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Selection> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Esc => return Some(Selection::Cancelled),
            KeyCode::Char('c') | KeyCode::Char('d') | KeyCode::Char('g') if ctrl => {
                return Some(Selection::Cancelled);
            }
            KeyCode::Enter => return self.list.selected().map(Selection::Chosen),
            KeyCode::Up => self.list.select_previous(),
            KeyCode::Down | KeyCode::Tab => self.list.select_next(),
            KeyCode::Char('p') | KeyCode::Char('k') if ctrl => self.list.select_previous(),
            KeyCode::Char('n') | KeyCode::Char('j') if ctrl => self.list.select_next(),
            KeyCode::Char('w') if ctrl => {
                self.input.delete_word();
                self.refilter();
            }
            KeyCode::Char('u') if ctrl => {
                self.input.clear();
                self.refilter();
            }
            KeyCode::Backspace => {
                self.input.handle_backspace();
                self.refilter();
            }
            KeyCode::Char(c) if !ctrl => {
                self.input.handle_input(c);
                self.refilter();
            }
            _ => {}
        }
        None
    }

    pub fn count_line(&self) -> String {
        format!("  {}/{}", self.list.len(), self.engine.host_count())
    }
}

pub struct Picker {
    settings: UiSettings,
    diag: Diagnostics,
}

impl Picker {
    pub fn new(settings: UiSettings, diag: Diagnostics) -> Self {
        Self { settings, diag }
    }
}

impl HostSelector for Picker {
    fn select(&mut self, displays: &[String], previews: &[String], query: &str) -> Result<Selection> {
        if displays.is_empty() {
            return Err(Error::Selector("no hosts to choose from".to_string()));
        }
        if !std::io::stdin().is_terminal() {
            return Err(Error::Selector("standard input is not a terminal".to_string()));
        }

        let mut state = PickerState::new(displays, &self.settings, query);
        let mut terminal =
            ratatui::try_init().map_err(|e| Error::Selector(format!("cannot open terminal: {e}")))?;

        let result = picker_loop(&mut terminal, &mut state, &self.settings.header, displays, previews);
        ratatui::restore();

        if let Ok(selection) = &result {
            self.diag.debug(&format!("Picker result: {selection:?}"));
        }
        result
    }
}

fn picker_loop(
    terminal: &mut DefaultTerminal,
    state: &mut PickerState,
    header: &str,
    displays: &[String],
    previews: &[String],
) -> Result<Selection> {
    loop {
        terminal
            .draw(|frame| render(frame, state, header, displays, previews))
            .map_err(|e| Error::Selector(e.to_string()))?;

        let event = event::read().map_err(|e| Error::Selector(e.to_string()))?;
        if let Event::Key(key) = event {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if let Some(selection) = state.handle_key(key) {
                return Ok(selection);
            }
        }
    }
}

fn render(frame: &mut Frame, state: &PickerState, header: &str, displays: &[String], previews: &[String]) {
    let rows = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .split(frame.area());
    let panes =
        Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)]).split(rows[3]);

    frame.render_widget(Paragraph::new(state.input.line()), rows[0]);
    frame.render_widget(
        Paragraph::new(Line::styled(state.count_line(), Style::default().add_modifier(Modifier::DIM))),
        rows[1],
    );
    frame.render_widget(
        Paragraph::new(Line::styled(header, Style::default().add_modifier(Modifier::BOLD))),
        rows[2],
    );

    let items: Vec<ListItem> = state
        .list
        .matches
        .iter()
        .filter_map(|&i| displays.get(i))
        .map(|line| ListItem::new(line.as_str()))
        .collect();
    let list = List::new(items)
        .highlight_style(Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED))
        .highlight_symbol("> ");
    let mut list_state = ListState::default();
    if !state.list.is_empty() {
        list_state.select(Some(state.list.selected_index));
    }
    frame.render_stateful_widget(list, panes[0], &mut list_state);

    let preview = state
        .list
        .selected()
        .and_then(|i| previews.get(i))
        .map(String::as_str)
        .unwrap_or_default();
    frame.render_widget(
        Paragraph::new(preview)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL)),
        panes[1],
    );
}
