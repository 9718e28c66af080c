use crate::config::ScoringConfig;
use crate::event::{ContributionEvent, EventKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Maximum helpful-comment bonus applications per user and target
pub const HELPFUL_COMMENT_CAP: u32 = 5;

/// Points earned by a user within one scoring period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub user: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub points: i64,
}

/// Per-user activity counts shown in the human-readable report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionSummary {
    pub user: String,
    pub issues_opened: u32,
    pub prs_opened: u32,
    pub prs_merged: u32,
    pub reviews: u32,
    pub comments: u32,
    pub score: i64,
}

/// An issue or PR, identified across repositories
type Target<'a> = (&'a str, u64);

/// Per-user tallies gathered before any arithmetic happens
#[derive(Debug, Default)]
struct Tally<'a> {
    merge_points: Vec<i64>,
    reverted: BTreeSet<Target<'a>>,
    failed_ci: BTreeSet<Target<'a>>,
    approvals: BTreeSet<Target<'a>>,
    helpful: BTreeMap<Target<'a>, u32>,
}

/// Compute sparse per-user scores for the window ending at `period_end`
///
/// Only merged PRs earn base points. Quality adjustments are added on top
/// when configured. Users whose total is zero are omitted and the result is
/// sorted by user.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use guildmerit_core::config::ScoringConfig;
/// use guildmerit_core::event::{ContributionEvent, EventKind};
/// use guildmerit_core::scoring::compute_scores;
///
/// let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
/// let events = vec![
///     ContributionEvent::new("alice", EventKind::PrMerged, "core", now),
///     ContributionEvent::new("alice", EventKind::PrOpened, "core", now),
/// ];
///
/// let scores = compute_scores(&events, now, &ScoringConfig::default());
/// assert_eq!(scores.len(), 1);
/// assert_eq!(scores[0].points, 10);
/// ```
pub fn compute_scores(
    events: &[ContributionEvent],
    period_end: DateTime<Utc>,
    config: &ScoringConfig,
) -> Vec<Score> {
    let (period_start, period_end) = config.window(period_end);
    let difficulty = config.normalized_difficulty_weights();
    let adjustments = config.quality_adjustments.clone().unwrap_or_default();

    let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();

    for event in events {
        if event.occurred_at < period_start || event.occurred_at > period_end {
            continue;
        }

        match &event.kind {
            EventKind::PrMerged => {
                let points = merge_points(event, &difficulty, config.merge_weight());
                let tally = tallies.entry(event.user.as_str()).or_default();
                tally.merge_points.push(points);
            }
            EventKind::PrReverted if adjustments.penalties.reverted_pr.is_some() => {
                if let Some(number) = event.pr_number() {
                    let tally = tallies.entry(event.user.as_str()).or_default();
                    tally.reverted.insert((event.repo.as_str(), number));
                }
            }
            EventKind::PrMergedWithFailedCi
                if adjustments.penalties.failed_ci_merge.is_some() =>
            {
                if let Some(number) = event.pr_number() {
                    let tally = tallies.entry(event.user.as_str()).or_default();
                    tally.failed_ci.insert((event.repo.as_str(), number));
                }
            }
            EventKind::PrReviewed if adjustments.bonuses.pr_review.is_some() => {
                if !event.is_approval() {
                    continue;
                }
                if let Some(number) = event.pr_number() {
                    let tally = tallies.entry(event.user.as_str()).or_default();
                    tally.approvals.insert((event.repo.as_str(), number));
                }
            }
            EventKind::HelpfulComment if adjustments.bonuses.helpful_comment.is_some() => {
                if let Some(target) = event.target_number() {
                    let count = tallies
                        .entry(event.user.as_str())
                        .or_default()
                        .helpful
                        .entry((event.repo.as_str(), target))
                        .or_insert(0);
                    *count = (*count + 1).min(HELPFUL_COMMENT_CAP);
                }
            }
            _ => {}
        }
    }

    let reverted_penalty = adjustments.penalties.reverted_pr.unwrap_or(0);
    let failed_ci_penalty = adjustments.penalties.failed_ci_merge.unwrap_or(0);
    let review_bonus = adjustments.bonuses.pr_review.unwrap_or(0);
    let comment_bonus = adjustments.bonuses.helpful_comment.unwrap_or(0);

    tallies
        .into_iter()
        .filter_map(|(user, tally)| {
            let helpful: i64 = tally.helpful.values().map(|count| i64::from(*count)).sum();
            let points = tally.merge_points.iter().sum::<i64>()
                + reverted_penalty * tally.reverted.len() as i64
                + failed_ci_penalty * tally.failed_ci.len() as i64
                + review_bonus * tally.approvals.len() as i64
                + comment_bonus * helpful;

            (points != 0).then(|| Score {
                user: user.to_string(),
                period_start,
                period_end,
                points,
            })
        })
        .collect()
}

/// Highest matching difficulty weight, falling back to the base merge weight
fn merge_points(
    event: &ContributionEvent,
    difficulty: &BTreeMap<String, i64>,
    fallback: i64,
) -> i64 {
    if difficulty.is_empty() {
        return fallback;
    }

    event
        .difficulty_labels()
        .iter()
        .filter_map(|label| difficulty.get(&label.to_lowercase()).copied())
        .max()
        .unwrap_or(fallback)
}

/// Count activity per user inside `[period_start, period_end]` and attach scores
pub fn summarize_contributions(
    events: &[ContributionEvent],
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    scores: &[Score],
) -> Vec<ContributionSummary> {
    let mut summaries: BTreeMap<&str, ContributionSummary> = BTreeMap::new();

    for event in events {
        if event.occurred_at < period_start || event.occurred_at > period_end {
            continue;
        }

        let summary = summaries
            .entry(event.user.as_str())
            .or_insert_with(|| ContributionSummary {
                user: event.user.clone(),
                ..Default::default()
            });

        match event.kind {
            EventKind::IssueOpened => summary.issues_opened += 1,
            EventKind::PrOpened => summary.prs_opened += 1,
            EventKind::PrMerged => summary.prs_merged += 1,
            EventKind::PrReviewed => summary.reviews += 1,
            EventKind::Comment | EventKind::HelpfulComment => summary.comments += 1,
            _ => {}
        }
    }

    for score in scores {
        if let Some(summary) = summaries.get_mut(score.user.as_str()) {
            summary.score = score.points;
        }
    }

    summaries.into_values().collect()
}
