//! Model-free summarizer that lifts the leading sentences of an abstract.

use async_trait::async_trait;

use super::{SummaryError, SummaryRequest, SummaryResult, Summarizer};

/// Characters of the body considered for extraction.
const EXTRACT_WINDOW: usize = 450;
/// Maximum number of bullet sentences.
const MAX_BULLETS: usize = 3;
/// Characters of the first sentence kept in the takeaway line.
const TAKEAWAY_CHARS: usize = 120;

/// Builds up to three bullet sentences and a one-line takeaway from the
/// start of the document body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    pub fn new() -> Self {
        Self
    }

    /// Summarize `body` synchronously.
    ///
    /// # Errors
    /// Returns `SummaryError::EmptyInput` when the body has no sentences
    pub fn extract(&self, body: &str) -> SummaryResult<String> {
        let window: String = body.trim().chars().take(EXTRACT_WINDOW).collect();
        let sentences: Vec<&str> = window
            .split(". ")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let Some(first) = sentences.first() else {
            return Err(SummaryError::EmptyInput);
        };

        let bullets: Vec<String> = sentences
            .iter()
            .take(MAX_BULLETS)
            .map(|s| format!("- {}.", s.trim_end_matches('.')))
            .collect();
        let takeaway: String = first.chars().take(TAKEAWAY_CHARS).collect();

        Ok(format!("{}\n\nKey takeaway: {}...", bullets.join("\n"), takeaway))
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> SummaryResult<String> {
        self.extract(&request.body)
    }

    fn name(&self) -> &str {
        "extractive"
    }
}
