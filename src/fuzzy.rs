// ABOUTME: Fuzzy matching of a typed query against host display lines
// ABOUTME: Returns indices into the original host list, best match first

pub struct SearchEngine {
    lines: Vec<String>,
}

impl SearchEngine {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn host_count(&self) -> usize {
        self.lines.len()
    }

    /// Indices of matching lines. Ties keep file order.
    pub fn search(&self, query: &str, case_sensitive: bool, max_results: usize) -> Vec<usize> {
        if query.is_empty() {
            return (0..self.lines.len()).take(max_results).collect();
        }

        let query = normalize(query, case_sensitive);

        let mut results: Vec<(usize, usize)> = self
            .lines
            .iter()
            .enumerate()
            .filter_map(|(index, line)| {
                let score = calculate_fuzzy_score(line, &query, case_sensitive);
                if score > 0 { Some((index, score)) } else { None }
            })
            .collect();

        results.sort_by(|a, b| b.1.cmp(&a.1));

        results
            .into_iter()
            .take(max_results)
            .map(|(index, _)| index)
            .collect()
    }
}

fn normalize(text: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}

/// `query` must already be normalized.
fn calculate_fuzzy_score(target: &str, query: &str, case_sensitive: bool) -> usize {
    // Display lines are padded; trailing spaces never count toward a match
    let target = normalize(target.trim_end(), case_sensitive);

    if target == query {
        return 1000;
    }

    if let Some(rest) = target.strip_prefix(query) {
        let length_bonus = 50 - target.chars().count().min(50);
        let mut score = 900 + length_bonus;

        if rest.chars().next().is_some_and(|c| !c.is_alphanumeric()) {
            score += 50;
        }

        return score;
    }

    if let Some(position) = target.find(query) {
        return 700 - position.min(100);
    }

    // All query characters in order, consecutive runs rewarded
    let mut score = 0;
    let mut query_chars = query.chars();
    let mut current_query_char = query_chars.next();
    let mut consecutive_matches = 0;
    let mut first_match = None;

    for (i, target_char) in target.chars().enumerate() {
        let Some(qc) = current_query_char else {
            break;
        };
        if target_char == qc {
            first_match.get_or_insert(i);
            score += 100 + consecutive_matches * 10;
            consecutive_matches += 1;
            current_query_char = query_chars.next();
        } else {
            consecutive_matches = 0;
        }
    }

    match (current_query_char, first_match) {
        (None, Some(0)) => score + 50,
        (None, Some(_)) => score,
        _ => 0,
    }
}
