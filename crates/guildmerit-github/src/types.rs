use chrono::{DateTime, Utc};
use guildmerit_core::{ContributionEvent, EventKind};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// User object embedded in REST responses
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserRecord {
    pub login: String,
    #[serde(rename = "type", default)]
    pub account_type: String,
}

impl UserRecord {
    /// Bot accounts never earn contributions
    pub fn is_bot(&self) -> bool {
        self.account_type.eq_ignore_ascii_case("bot")
            || self.login.to_lowercase().ends_with("[bot]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LabelRecord {
    pub name: String,
}

/// Entry of `GET /repos/{owner}/{repo}/pulls`
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestRecord {
    pub number: u64,
    pub user: Option<UserRecord>,
    pub title: Option<String>,
    pub labels: Option<Vec<LabelRecord>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
}

/// Entry of `GET /repos/{owner}/{repo}/issues`
///
/// The endpoint also lists pull requests; those carry a `pull_request` object.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueRecord {
    pub number: u64,
    pub user: Option<UserRecord>,
    pub closed_by: Option<UserRecord>,
    #[serde(default)]
    pub title: String,
    pub labels: Option<Vec<LabelRecord>>,
    pub assignees: Option<Vec<UserRecord>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub pull_request: Option<Value>,
}

/// Entry of `GET /repos/{owner}/{repo}/pulls/{number}/reviews`
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRecord {
    pub id: u64,
    pub user: Option<UserRecord>,
    pub state: Option<String>,
    /// Absent on pending reviews
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Issue comment or pull request review comment
#[derive(Debug, Clone, Deserialize)]
pub struct CommentRecord {
    pub id: u64,
    pub user: Option<UserRecord>,
    pub created_at: Option<DateTime<Utc>>,
    pub html_url: Option<String>,
}

/// The parts of a pull request that ingestion looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestFacts {
    pub number: u64,
    pub author: Option<String>,
    pub author_is_bot: bool,
    pub title: Option<String>,
    pub labels: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
}

/// The parts of an issue that ingestion looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueFacts {
    pub number: u64,
    pub author: String,
    pub author_is_bot: bool,
    pub closed_by: Option<String>,
    pub title: String,
    pub labels: Vec<String>,
    /// Non-bot assignees
    pub assignees: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub is_pull_request: bool,
}

/// Where a comment was left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentTarget {
    Issue(u64),
    PullRequest(u64),
}

fn label_names(labels: &Option<Vec<LabelRecord>>) -> Vec<String> {
    labels
        .iter()
        .flatten()
        .map(|label| label.name.clone())
        .collect()
}

impl From<&PullRequestRecord> for PullRequestFacts {
    fn from(pr: &PullRequestRecord) -> Self {
        Self {
            number: pr.number,
            author: pr.user.as_ref().map(|user| user.login.clone()),
            author_is_bot: pr.user.as_ref().is_some_and(UserRecord::is_bot),
            title: pr.title.clone(),
            labels: label_names(&pr.labels),
            created_at: pr.created_at,
            updated_at: pr.updated_at,
            merged_at: pr.merged_at,
        }
    }
}

impl From<&IssueRecord> for IssueFacts {
    fn from(issue: &IssueRecord) -> Self {
        Self {
            number: issue.number,
            author: issue.user.as_ref().map(|user| user.login.clone()).unwrap_or_default(),
            author_is_bot: issue.user.as_ref().is_some_and(UserRecord::is_bot),
            closed_by: issue.closed_by.as_ref().map(|user| user.login.clone()),
            title: issue.title.clone(),
            labels: label_names(&issue.labels),
            assignees: issue
                .assignees
                .iter()
                .flatten()
                .filter(|user| !user.is_bot())
                .map(|user| user.login.clone())
                .collect(),
            created_at: issue.created_at,
            updated_at: issue.updated_at,
            closed_at: issue.closed_at,
            is_pull_request: issue.pull_request.is_some(),
        }
    }
}

fn labels_value(labels: &[String]) -> Value {
    Value::Array(labels.iter().cloned().map(Value::String).collect())
}

/// `pr_opened` and `pr_merged` events at or after `since`
///
/// Labels of a merged PR are carried as `difficulty_labels`.
pub fn pull_request_events(
    repo: &str,
    pr: &PullRequestFacts,
    since: DateTime<Utc>,
) -> Vec<ContributionEvent> {
    let Some(author) = pr.author.as_deref() else {
        return Vec::new();
    };
    if pr.author_is_bot {
        return Vec::new();
    }

    let title = pr.title.clone().unwrap_or_default();
    let mut events = Vec::new();

    if let Some(created_at) = pr.created_at.filter(|at| *at >= since) {
        events.push(
            ContributionEvent::new(author, EventKind::PrOpened, repo, created_at)
                .with("pr_number", pr.number)
                .with("title", title.clone()),
        );
    }

    if let Some(merged_at) = pr.merged_at.filter(|at| *at >= since) {
        events.push(
            ContributionEvent::new(author, EventKind::PrMerged, repo, merged_at)
                .with("pr_number", pr.number)
                .with("title", title)
                .with("difficulty_labels", labels_value(&pr.labels)),
        );
    }

    events
}

/// `issue_opened`, `issue_closed` and `issue_assigned` events at or after `since`
///
/// The REST API has no assignment timestamp; the issue's last update stands in.
pub fn issue_events(
    repo: &str,
    issue: &IssueFacts,
    since: DateTime<Utc>,
) -> Vec<ContributionEvent> {
    if issue.is_pull_request {
        return Vec::new();
    }

    let payload = |event: ContributionEvent| {
        event
            .with("issue_number", issue.number)
            .with("title", issue.title.clone())
            .with("labels", labels_value(&issue.labels))
    };

    let mut events = Vec::new();

    if issue.created_at >= since && !issue.author_is_bot && !issue.author.is_empty() {
        events.push(payload(ContributionEvent::new(
            issue.author.as_str(),
            EventKind::IssueOpened,
            repo,
            issue.created_at,
        )));
    }

    if let Some(closed_at) = issue.closed_at.filter(|at| *at >= since) {
        let closer = issue.closed_by.as_deref().unwrap_or(&issue.author);
        if !closer.is_empty() && !closer.to_lowercase().ends_with("[bot]") {
            events.push(payload(ContributionEvent::new(
                closer,
                EventKind::IssueClosed,
                repo,
                closed_at,
            )));
        }
    }

    if let Some(updated_at) = issue.updated_at.filter(|at| *at >= since) {
        for assignee in &issue.assignees {
            events.push(payload(ContributionEvent::new(
                assignee.as_str(),
                EventKind::IssueAssigned,
                repo,
                updated_at,
            )));
        }
    }

    events
}

/// `pr_reviewed` events for submitted reviews at or after `since`
pub fn review_events(
    repo: &str,
    pr_number: u64,
    reviews: &[ReviewRecord],
    since: DateTime<Utc>,
) -> Vec<ContributionEvent> {
    reviews
        .iter()
        .filter_map(|review| {
            let user = review.user.as_ref().filter(|user| !user.is_bot())?;
            let submitted_at = review.submitted_at.filter(|at| *at >= since)?;
            let reviewer = user.login.as_str();
            Some(
                ContributionEvent::new(reviewer, EventKind::PrReviewed, repo, submitted_at)
                    .with("pr_number", pr_number)
                    .with("review_id", review.id)
                    .with("state", review.state.clone().unwrap_or_default()),
            )
        })
        .collect()
}

/// `comment` events at or after `since`, one per comment id
pub fn comment_events(
    repo: &str,
    target: CommentTarget,
    comments: &[CommentRecord],
    since: DateTime<Utc>,
) -> Vec<ContributionEvent> {
    let mut seen = BTreeSet::new();

    comments
        .iter()
        .filter_map(|comment| {
            let user = comment
                .user
                .as_ref()
                .filter(|user| !user.is_bot() && !user.login.is_empty())?;
            let created_at = comment.created_at.filter(|at| *at >= since)?;
            if !seen.insert(comment.id) {
                return None;
            }

            let author = user.login.as_str();
            let event = ContributionEvent::new(author, EventKind::Comment, repo, created_at)
                .with("comment_id", comment.id)
                .with("url", comment.html_url.clone().unwrap_or_default());
            Some(match target {
                CommentTarget::Issue(number) => event.with("issue_number", number),
                CommentTarget::PullRequest(number) => event.with("pr_number", number),
            })
        })
        .collect()
}
