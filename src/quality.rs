//! Heuristic detection of structural noise in retrieved chunks
//!
//! Tables of contents, bare headers and metadata blocks embed close to many
//! queries but make poor context. [`QualityFilter`] flags them with a set of
//! independent line-level and density checks; any single check is enough.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Thresholds for [`QualityFilter`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityFilterConfig {
    /// Trimmed texts shorter than this are always low quality
    pub min_chars: usize,
    /// Maximum ratio of TOC indicators to lines
    pub toc_ratio: f32,
    /// Chunks with at most this many lines may be header blocks
    pub max_header_lines: usize,
    /// Every line of a header block is shorter than this
    pub header_line_chars: usize,
    /// Word density is only checked above this many characters
    pub density_min_chars: usize,
    /// Minimum ratio of words to `chars / 6`
    pub min_word_density: f32,
}

impl Default for QualityFilterConfig {
    fn default() -> Self {
        Self {
            min_chars: 20,
            toc_ratio: 0.25,
            max_header_lines: 3,
            header_line_chars: 50,
            density_min_chars: 50,
            min_word_density: 0.3,
        }
    }
}

impl QualityFilterConfig {
    /// Check that ratios are within `[0, 1]`
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.toc_ratio) {
            return Err(Error::InvalidConfig(
                "quality.toc_ratio must be between 0 and 1".into(),
            ));
        }
        if self.min_word_density < 0.0 {
            return Err(Error::InvalidConfig(
                "quality.min_word_density must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Classifies chunk text as prose or structural noise
#[derive(Debug, Clone)]
pub struct QualityFilter {
    config: QualityFilterConfig,
    dot_leader: Regex,
    numbered_entry: Regex,
    section_heading: Regex,
    page_number_line: Regex,
    toc_keyword: Regex,
    word: Regex,
}

impl QualityFilter {
    /// Create a filter with the given thresholds
    #[must_use]
    pub fn new(config: QualityFilterConfig) -> Self {
        Self {
            config,
            dot_leader: Regex::new(r"\.(\s*\.){2,}").expect("valid dot leader pattern"),
            numbered_entry: Regex::new(r"^[\d.]+\s+[A-Z].*[\s.]+\d+$")
                .expect("valid numbered entry pattern"),
            section_heading: Regex::new(r"^[\d.]{3,}\s+[A-Z]").expect("valid heading pattern"),
            page_number_line: Regex::new(r"^[\s.\d]*\d+$").expect("valid page number pattern"),
            toc_keyword: Regex::new(
                r"(?i)\b(Table of Contents|List of Figures|List of Tables|CONTENTS|Chapter \d+)\b",
            )
            .expect("valid keyword pattern"),
            word: Regex::new(r"\b[a-zA-Z]{3,}\b").expect("valid word pattern"),
        }
    }

    /// Get the thresholds
    #[must_use]
    pub fn config(&self) -> &QualityFilterConfig {
        &self.config
    }

    /// Returns true when `text` looks like a table of contents, a bare
    /// header block, or symbol/number soup
    #[must_use]
    pub fn is_low_quality(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.chars().count() < self.config.min_chars {
            return true;
        }

        let lines: Vec<&str> = trimmed.split('\n').collect();

        let indicators: usize = lines.iter().map(|line| self.toc_indicators(line)).sum();
        let ratio = indicators as f32 / lines.len() as f32;
        if ratio > self.config.toc_ratio {
            debug!(
                indicators,
                lines = lines.len(),
                preview = preview(text),
                "filtered TOC-like chunk"
            );
            return true;
        }

        if lines.len() <= self.config.max_header_lines
            && lines
                .iter()
                .all(|line| line.trim().chars().count() < self.config.header_line_chars)
        {
            debug!(preview = preview(text), "filtered header-only chunk");
            return true;
        }

        let words = self.word.find_iter(text).count();
        let chars = text.chars().count();
        if chars > self.config.density_min_chars {
            let density = words as f32 / (chars as f32 / 6.0);
            if density < self.config.min_word_density {
                debug!(density, preview = preview(text), "filtered low word-density chunk");
                return true;
            }
        }

        false
    }

    fn toc_indicators(&self, line: &str) -> usize {
        let line = line.trim();
        let mut count = 0;
        if self.dot_leader.is_match(line) {
            count += 1;
        }
        if self.numbered_entry.is_match(line) {
            count += 1;
        }
        if self.section_heading.is_match(line) {
            count += 1;
        }
        if self.page_number_line.is_match(line) && line.chars().count() < 100 {
            count += 1;
        }
        if self.toc_keyword.is_match(line) {
            count += 2;
        }
        count
    }
}

impl Default for QualityFilter {
    fn default() -> Self {
        Self::new(QualityFilterConfig::default())
    }
}

fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}
