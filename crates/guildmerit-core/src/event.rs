use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of a contribution event as reported by the code host
///
/// Wire names are snake_case. Names this build does not recognise are kept
/// verbatim in [`EventKind::Unknown`] so they survive a storage round trip;
/// every engine ignores them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    PrOpened,
    PrMerged,
    PrMergedWithFailedCi,
    PrReverted,
    PrReviewed,
    IssueOpened,
    IssueClosed,
    IssueAssigned,
    Comment,
    HelpfulComment,
    Unknown(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::PrOpened => "pr_opened",
            EventKind::PrMerged => "pr_merged",
            EventKind::PrMergedWithFailedCi => "pr_merged_with_failed_ci",
            EventKind::PrReverted => "pr_reverted",
            EventKind::PrReviewed => "pr_reviewed",
            EventKind::IssueOpened => "issue_opened",
            EventKind::IssueClosed => "issue_closed",
            EventKind::IssueAssigned => "issue_assigned",
            EventKind::Comment => "comment",
            EventKind::HelpfulComment => "helpful_comment",
            EventKind::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventKind::Unknown(_))
    }
}

impl From<&str> for EventKind {
    fn from(raw: &str) -> Self {
        match raw {
            "pr_opened" => EventKind::PrOpened,
            "pr_merged" => EventKind::PrMerged,
            "pr_merged_with_failed_ci" => EventKind::PrMergedWithFailedCi,
            "pr_reverted" => EventKind::PrReverted,
            "pr_reviewed" => EventKind::PrReviewed,
            "issue_opened" => EventKind::IssueOpened,
            "issue_closed" => EventKind::IssueClosed,
            "issue_assigned" => EventKind::IssueAssigned,
            "comment" => EventKind::Comment,
            "helpful_comment" => EventKind::HelpfulComment,
            other => EventKind::Unknown(other.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(raw: String) -> Self {
        EventKind::from(raw.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single developer-activity event (immutable, append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionEvent {
    /// Code-host login of the acting user
    pub user: String,

    pub kind: EventKind,

    /// Repository name (without owner)
    pub repo: String,

    pub occurred_at: DateTime<Utc>,

    /// Free-form attributes: `pr_number`, `issue_number`, `difficulty_labels`, `state`, ...
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl ContributionEvent {
    pub fn new(
        user: impl Into<String>,
        kind: EventKind,
        repo: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user: user.into(),
            kind,
            repo: repo.into(),
            occurred_at,
            payload: Map::new(),
        }
    }

    /// Builder-style payload attribute
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    /// An event without a user or repository cannot be attributed and is dropped on ingestion
    pub fn is_well_formed(&self) -> bool {
        !self.user.trim().is_empty() && !self.repo.trim().is_empty()
    }

    pub fn pr_number(&self) -> Option<u64> {
        self.number_field("pr_number")
    }

    pub fn issue_number(&self) -> Option<u64> {
        self.number_field("issue_number")
    }

    /// Issue number when present, otherwise the PR number
    pub fn target_number(&self) -> Option<u64> {
        self.issue_number().or_else(|| self.pr_number())
    }

    /// Review state (`APPROVED`, `CHANGES_REQUESTED`, ...) of a review event
    pub fn review_state(&self) -> Option<&str> {
        self.payload.get("state").and_then(Value::as_str)
    }

    pub fn is_approval(&self) -> bool {
        self.review_state()
            .is_some_and(|state| state.eq_ignore_ascii_case("approved"))
    }

    pub fn author(&self) -> Option<&str> {
        self.payload.get("author").and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.payload.get("title").and_then(Value::as_str)
    }

    pub fn difficulty_labels(&self) -> Vec<String> {
        match self.payload.get("difficulty_labels") {
            Some(Value::Array(labels)) => labels
                .iter()
                .map(|label| match label {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn number_field(&self, key: &str) -> Option<u64> {
        let number = match self.payload.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        // zero is never a valid issue or PR number
        number.filter(|n| *n > 0)
    }
}
