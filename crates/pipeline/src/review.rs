//! Reviewer verdicts.
//!
//! Satisfaction is a case-folded substring match against a fixed keyword set.
//! False positives (feedback that mentions "approved" in passing) are an
//! accepted property of the heuristic.

use serde::{Deserialize, Serialize};

/// Keywords that mark technical review feedback as satisfied.
pub const TECHNICAL_APPROVAL_KEYWORDS: &[&str] = &["lgtm", "satisfactory", "approved", "looks good"];

/// Keywords that mark style review feedback as satisfied.
pub const STYLE_APPROVAL_KEYWORDS: &[&str] = &["lgtm", "satisfactory", "approved"];

/// Which reviewer produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAspect {
    /// Technical correctness and efficiency.
    Technical,
    /// Code style and readability.
    Style,
}

impl ReviewAspect {
    /// Keywords whose presence marks feedback for this aspect as satisfied.
    pub fn approval_keywords(self) -> &'static [&'static str] {
        match self {
            Self::Technical => TECHNICAL_APPROVAL_KEYWORDS,
            Self::Style => STYLE_APPROVAL_KEYWORDS,
        }
    }

    /// Phrase used in reviewer instructions and report headings.
    pub fn focus(self) -> &'static str {
        match self {
            Self::Technical => "technical correctness and efficiency",
            Self::Style => "code style and readability",
        }
    }

    /// Report heading for this aspect.
    pub fn title(self) -> &'static str {
        match self {
            Self::Technical => "Technical Review",
            Self::Style => "Style Review",
        }
    }
}

impl std::fmt::Display for ReviewAspect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Technical => f.write_str("technical"),
            Self::Style => f.write_str("style"),
        }
    }
}

/// One reviewer's judgement on the current working set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    /// Which reviewer produced the feedback.
    pub aspect: ReviewAspect,
    /// Raw reviewer output.
    pub feedback: String,
    /// Derived from `feedback` by keyword match.
    pub satisfied: bool,
}

impl ReviewVerdict {
    /// Builds a verdict, deriving `satisfied` from the feedback text.
    pub fn from_feedback(aspect: ReviewAspect, feedback: impl Into<String>) -> Self {
        let feedback = feedback.into();
        let satisfied = is_satisfied(aspect, &feedback);
        Self {
            aspect,
            feedback,
            satisfied,
        }
    }
}

/// `true` if `feedback` contains any approval keyword for `aspect`, ignoring case.
pub fn is_satisfied(aspect: ReviewAspect, feedback: &str) -> bool {
    let folded = feedback.to_lowercase();
    aspect
        .approval_keywords()
        .iter()
        .any(|keyword| folded.contains(keyword))
}
