use crate::types::Exchange;

/// Returned when there is no context to include.
pub const NO_PRIOR_CONVERSATION: &str = "No prior conversation.";

/// Recency-windowed context. Keeps the last N exchanges of the log, no
/// ranking or deduplication.
#[derive(Debug, Clone, Copy)]
pub struct HistoryFormatter {
    window: usize,
}

impl Default for HistoryFormatter {
    fn default() -> Self {
        Self::new(3)
    }
}

impl HistoryFormatter {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// The exchanges that fall inside the window, oldest first.
    pub fn window_of<'a>(&self, log: &'a [Exchange]) -> &'a [Exchange] {
        let start = log.len().saturating_sub(self.window);
        &log[start..]
    }

    pub fn format(&self, log: &[Exchange]) -> String {
        let recent = self.window_of(log);
        if recent.is_empty() {
            return NO_PRIOR_CONVERSATION.to_string();
        }
        render_pairs(recent.iter().map(|e| (e.input(), e.output())))
    }
}

/// Render `(input, output)` pairs as "User:"/"Assistant:" lines.
pub fn render_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .into_iter()
        .map(|(input, output)| format!("User: {input}\nAssistant: {output}"))
        .collect::<Vec<_>>()
        .join("\n")
}
