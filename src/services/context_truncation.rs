//! Trimming of failure payloads before they leave the failure extractor.
//!
//! Diagnosis runs on whatever we hand it, so failure records are cut down:
//! long free text is truncated on a char boundary, screenshot paths are
//! dropped, detail rows are capped with failing rows kept first, and every
//! remaining string goes through the secret scrubber.

use crate::domain::models::{ExtractionConfig, StepDetail};
use crate::infrastructure::logging::SecretScrubber;

/// Default maximum characters of any single free-text field.
const DEFAULT_MAX_TEXT_CHARS: usize = 400;

/// Default maximum detail rows per failure.
const DEFAULT_MAX_STEPS: usize = 20;

/// Configuration for payload trimming.
#[derive(Debug, Clone)]
pub struct TruncationConfig {
    /// Maximum characters kept from one free-text field.
    pub max_text_chars: usize,
    /// Maximum detail rows kept per failure.
    pub max_steps: usize,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl From<&ExtractionConfig> for TruncationConfig {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            max_text_chars: config.max_text_chars,
            max_steps: config.max_steps_per_failure,
        }
    }
}

/// Truncate `text` to at most `max_chars` characters, appending a marker when cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => {
            let dropped = text[cut..].chars().count();
            format!("{}… [truncated {dropped} chars]", &text[..cut])
        }
    }
}

/// Trims and scrubs free text fields.
pub struct PayloadTrimmer {
    config: TruncationConfig,
    scrubber: SecretScrubber,
}

impl PayloadTrimmer {
    pub fn new(config: TruncationConfig, scrubber: SecretScrubber) -> Self {
        Self { config, scrubber }
    }

    /// Scrub, then truncate one field.
    pub fn text(&self, text: &str) -> String {
        truncate_text(&self.scrubber.scrub_message(text), self.config.max_text_chars)
    }

    fn opt_text(&self, text: Option<String>) -> Option<String> {
        text.map(|t| self.text(&t))
    }

    /// Trim the detail rows of one failure.
    pub fn details(&self, mut details: Vec<StepDetail>) -> Vec<StepDetail> {
        // Stable sort: failing rows first, original order within each group.
        details.sort_by_key(|d| !d.status().is_failure());
        details.truncate(self.config.max_steps);
        details.sort_by_key(StepDetail::ordinal);

        details
            .into_iter()
            .map(|detail| match detail {
                StepDetail::Scripted(mut d) => {
                    d.failure_reason = self.opt_text(d.failure_reason);
                    d.action = self.opt_text(d.action);
                    d.expected = self.opt_text(d.expected);
                    d.actual = self.opt_text(d.actual);
                    d.screenshot = None;
                    StepDetail::Scripted(d)
                }
                StepDetail::Exploratory(mut d) => {
                    d.description = self.text(&d.description);
                    d.notes = self.opt_text(d.notes);
                    d.screenshot = None;
                    StepDetail::Exploratory(d)
                }
            })
            .collect()
    }
}
