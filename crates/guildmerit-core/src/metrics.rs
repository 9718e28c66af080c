//! Read-only activity metrics
//!
//! Informational only: nothing here feeds role or assignment planning.

use crate::event::{ContributionEvent, EventKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Issue engagement weight of an opened issue
pub const ISSUE_ENGAGEMENT_ISSUE_WEIGHT: f64 = 1.0;

/// Issue engagement weight of a comment
pub const ISSUE_ENGAGEMENT_COMMENT_WEIGHT: f64 = 0.5;

/// Per-user activity counts for one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMetrics {
    pub user: String,
    pub prs_opened: u32,
    pub prs_merged: u32,
    pub reviews_submitted: u32,
    pub issues_opened: u32,
    pub comments: u32,
    /// `issues_opened * 1.0 + comments * 0.5`
    pub issue_engagement: f64,
    /// Sum of the base weight of every event kind, zero for unweighted kinds
    pub total_score: i64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

/// Aggregate events inside `[period_start, period_end]` per user, sorted by user
///
/// # Examples
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use guildmerit_core::event::{ContributionEvent, EventKind};
/// use guildmerit_core::metrics::contribution_metrics;
/// use std::collections::BTreeMap;
///
/// let end = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
/// let events = vec![
///     ContributionEvent::new("alice", EventKind::IssueOpened, "core", end),
///     ContributionEvent::new("alice", EventKind::Comment, "core", end),
/// ];
///
/// let metrics = contribution_metrics(&events, end - Duration::days(7), end, &BTreeMap::new());
/// assert_eq!(metrics[0].issue_engagement, 1.5);
/// ```
pub fn contribution_metrics(
    events: &[ContributionEvent],
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    weights: &BTreeMap<String, i64>,
) -> Vec<UserMetrics> {
    let mut buckets: BTreeMap<&str, UserMetrics> = BTreeMap::new();

    for event in events {
        if event.occurred_at < period_start || event.occurred_at > period_end {
            continue;
        }

        let metrics = buckets
            .entry(event.user.as_str())
            .or_insert_with(|| UserMetrics {
                user: event.user.clone(),
                prs_opened: 0,
                prs_merged: 0,
                reviews_submitted: 0,
                issues_opened: 0,
                comments: 0,
                issue_engagement: 0.0,
                total_score: 0,
                period_start,
                period_end,
            });

        match event.kind {
            EventKind::PrOpened => metrics.prs_opened += 1,
            EventKind::PrMerged => metrics.prs_merged += 1,
            EventKind::PrReviewed => metrics.reviews_submitted += 1,
            EventKind::IssueOpened => metrics.issues_opened += 1,
            EventKind::Comment => metrics.comments += 1,
            _ => {}
        }
        metrics.total_score += weights.get(event.kind.as_str()).copied().unwrap_or(0);
    }

    buckets
        .into_values()
        .map(|mut metrics| {
            metrics.issue_engagement = f64::from(metrics.issues_opened)
                * ISSUE_ENGAGEMENT_ISSUE_WEIGHT
                + f64::from(metrics.comments) * ISSUE_ENGAGEMENT_COMMENT_WEIGHT;
            metrics
        })
        .collect()
}

/// Highest `total_score` first, ties broken by user
pub fn rank_by_activity(mut metrics: Vec<UserMetrics>) -> Vec<UserMetrics> {
    metrics.sort_by(|a, b| b.total_score.cmp(&a.total_score).then_with(|| a.user.cmp(&b.user)));
    metrics
}

/// 1-based position of `user` in a ranked list
pub fn rank_of(ranked: &[UserMetrics], user: &str) -> Option<usize> {
    ranked.iter().position(|m| m.user == user).map(|index| index + 1)
}
