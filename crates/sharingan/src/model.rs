use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Depth of an audit. Changes only what is asked of the model, never the response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanMode {
    Standard,
    /// Deep scan: stricter scoring and psychological analysis.
    Mangekyou,
}

impl ScanMode {
    pub fn from_deep_flag(deep: bool) -> Self {
        if deep {
            Self::Mangekyou
        } else {
            Self::Standard
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Mangekyou => "MANGEKYOU",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The five radar metrics. Nominally 0-100 but taken as the model sent them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditScores {
    pub aesthetics: i64,
    pub storytelling: i64,
    pub authority: i64,
    pub ux: i64,
    pub uniqueness: i64,
}

impl AuditScores {
    /// Axis labels and values, in radar order.
    pub fn axes(&self) -> [(&'static str, i64); 5] {
        [
            ("AESTHETICS", self.aesthetics),
            ("STORYTELLING", self.storytelling),
            ("AUTHORITY", self.authority),
            ("UX / FLOW", self.ux),
            ("UNIQUENESS", self.uniqueness),
        ]
    }

    /// Rounded mean of the five axes.
    pub fn overall(&self) -> i64 {
        // Axes are unclamped model output; summed wide so extremes cannot overflow.
        let sum: i128 = self.axes().iter().map(|(_, v)| i128::from(*v)).sum();
        (sum as f64 / 5.0).round() as i64
    }
}

/// A web source the model says it used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingCitation {
    pub uri: Option<String>,
    pub title: Option<String>,
}

/// Normalized result of one audit. Never mutated after creation; shared via `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    /// Long-form markdown report.
    pub markdown_report: String,
    pub scores: AuditScores,
    /// Image-generation prompts visualizing the proposed identity.
    #[serde(default)]
    pub vision_prompts: Vec<String>,
    /// Competitive comparison, present only when a competitor was audited and answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versus_report: Option<String>,
    #[serde(default)]
    pub citations: Vec<GroundingCitation>,
}

/// One stored audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub company: String,
    pub mode: ScanMode,
    pub data: Arc<AuditResponse>,
}

/// What the presentation layer sees. Only the session controller changes it.
#[derive(Debug, Clone, Default)]
pub enum AuditSessionState {
    #[default]
    Idle,
    Scanning,
    Complete(Arc<AuditResponse>),
    Error(String),
}

impl AuditSessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Complete(_) => "complete",
            Self::Error(_) => "error",
        }
    }

    pub fn data(&self) -> Option<&Arc<AuditResponse>> {
        match self {
            Self::Complete(data) => Some(data),
            _ => None,
        }
    }
}
