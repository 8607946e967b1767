// ABOUTME: Filtered host list of the picker with the highlighted row
// ABOUTME: Holds indices into the full host list so a choice maps back to its record

#[derive(Clone, Debug, Default)]
pub struct HostList {
    pub matches: Vec<usize>,
    pub selected_index: usize,
}

impl HostList {
    pub fn new(matches: Vec<usize>) -> Self {
        Self {
            matches,
            selected_index: 0,
        }
    }

    /// Replace the filtered rows; the cursor returns to the top.
    pub fn set_matches(&mut self, matches: Vec<usize>) {
        self.matches = matches;
        self.selected_index = 0;
    }

    pub fn select_next(&mut self) {
        if !self.matches.is_empty() {
            self.selected_index = (self.selected_index + 1) % self.matches.len();
        }
    }

    pub fn select_previous(&mut self) {
        if !self.matches.is_empty() {
            self.selected_index = if self.selected_index == 0 {
                self.matches.len() - 1
            } else {
                self.selected_index - 1
            };
        }
    }

    /// Index into the full host list of the highlighted row.
    pub fn selected(&self) -> Option<usize> {
        self.matches.get(self.selected_index).copied()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}
