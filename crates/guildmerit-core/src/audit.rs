use crate::assignment::{AssignmentDecision, TargetKind};
use crate::config::{QualityAdjustments, RepoFilter, RepoFilterMode};
use crate::error::{CoreError, CoreResult};
use crate::event::{ContributionEvent, EventKind};
use crate::policy::RunMode;
use crate::roles::{RoleDecision, RoleEvidence};
use crate::scoring::ContributionSummary;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything the pre-mutation audit report shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSnapshot {
    /// Supplied by the caller so rendering stays deterministic
    pub timestamp: DateTime<Utc>,
    pub run_mode: RunMode,
    pub org: String,
    pub repo_filter: Option<RepoFilter>,
    /// Repositories seen during discovery, when known
    pub repo_count: Option<usize>,
    pub period_days: u32,
    pub difficulty_weights: Option<BTreeMap<String, i64>>,
    pub quality_adjustments: Option<QualityAdjustments>,
    pub contribution_summaries: Vec<ContributionSummary>,
    pub role_decisions: Vec<RoleDecision>,
    pub assignment_decisions: Vec<AssignmentDecision>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedAudit {
    pub json: String,
    pub markdown: String,
}

#[derive(Serialize)]
struct AuditCounts {
    role_changes: usize,
    assignments: usize,
}

#[derive(Serialize)]
struct AuditPayload<'a> {
    timestamp: String,
    run_mode: RunMode,
    org: &'a str,
    repo_filter: Option<RepoFilter>,
    summary: AuditCounts,
    role_decisions: Vec<&'a RoleDecision>,
    assignment_decisions: Vec<&'a AssignmentDecision>,
}

fn sorted_roles(decisions: &[RoleDecision]) -> Vec<&RoleDecision> {
    let mut sorted: Vec<&RoleDecision> = decisions.iter().collect();
    sorted.sort_by(|a, b| {
        (&a.chat_user_id, &a.role, a.action, a.kind)
            .cmp(&(&b.chat_user_id, &b.role, b.action, b.kind))
    });
    sorted
}

fn sorted_assignments(decisions: &[AssignmentDecision]) -> Vec<&AssignmentDecision> {
    let mut sorted: Vec<&AssignmentDecision> = decisions.iter().collect();
    sorted.sort_by(|a, b| {
        (&a.repo, a.target_kind, a.target_number, a.action, &a.assignee).cmp(&(
            &b.repo,
            b.target_kind,
            b.target_number,
            b.action,
            &b.assignee,
        ))
    });
    sorted
}

fn sorted_filter(filter: &Option<RepoFilter>) -> Option<RepoFilter> {
    filter.as_ref().map(|f| {
        let mut names = f.names.clone();
        names.sort();
        RepoFilter { mode: f.mode, names }
    })
}

/// Render the snapshot as pretty JSON and as a Markdown review document
///
/// Decisions are sorted by stable keys in both renderings, so the same
/// snapshot always produces byte-identical output.
pub fn render_audit(snapshot: &AuditSnapshot) -> CoreResult<RenderedAudit> {
    let roles = sorted_roles(&snapshot.role_decisions);
    let assignments = sorted_assignments(&snapshot.assignment_decisions);

    let payload = AuditPayload {
        timestamp: snapshot.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        run_mode: snapshot.run_mode,
        org: &snapshot.org,
        repo_filter: sorted_filter(&snapshot.repo_filter),
        summary: AuditCounts {
            role_changes: roles.len(),
            assignments: assignments.len(),
        },
        role_decisions: roles.clone(),
        assignment_decisions: assignments.clone(),
    };
    let json = serde_json::to_string_pretty(&payload)
        .map_err(|e| CoreError::AuditRender(format!("Failed to serialize audit payload: {}", e)))?;

    let sections = [
        render_summary(snapshot, roles.len(), assignments.len()),
        render_contributions(snapshot),
        render_roles(&roles),
        render_targets(&assignments, TargetKind::Issue),
        render_targets(&assignments, TargetKind::PullRequest),
    ];
    let markdown = format!("{}\n", sections.join("\n\n"));

    Ok(RenderedAudit { json, markdown })
}

fn render_summary(snapshot: &AuditSnapshot, role_changes: usize, assignments: usize) -> String {
    let mut lines = vec![
        "## Summary".to_string(),
        format!("- Runtime mode: `{}`", snapshot.run_mode),
        format!("- Organization: `{}`", snapshot.org),
        format!(
            "- Generated at: `{}`",
            snapshot.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        format!("- Discord role changes: `{}`", role_changes),
        format!("- GitHub assignments: `{}`", assignments),
    ];

    match sorted_filter(&snapshot.repo_filter) {
        Some(filter) => {
            let mode = match filter.mode {
                RepoFilterMode::Allow => "allow",
                RepoFilterMode::Deny => "deny",
            };
            lines.push(format!("- Repo filter: `{}` ({})", mode, filter.names.join(", ")));
        }
        None => lines.push("- Repo filter: `all`".to_string()),
    }

    if snapshot.repo_count == Some(0) {
        lines.push("- Repositories discovered: 0 (new or empty organization)".to_string());
    }

    lines.join("\n")
}

fn render_contributions(snapshot: &AuditSnapshot) -> String {
    let mut lines = vec![format!(
        "## Contribution Summary (Last {} days)",
        snapshot.period_days
    )];

    if let Some(weights) = snapshot.difficulty_weights.as_ref().filter(|w| !w.is_empty()) {
        let listed: Vec<String> = weights.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        lines.push(format!(
            "*Difficulty-aware scoring enabled ({}).*",
            listed.join(", ")
        ));
    }

    if let Some(qa) = &snapshot.quality_adjustments {
        let mut notes = Vec::new();
        let penalties: Vec<String> = [
            ("failed_ci_merge", qa.penalties.failed_ci_merge),
            ("reverted_pr", qa.penalties.reverted_pr),
        ]
        .into_iter()
        .filter_map(|(name, v)| v.map(|v| format!("{}: {}", name, v)))
        .collect();
        if !penalties.is_empty() {
            notes.push(format!("Penalties: {}", penalties.join(", ")));
        }
        let bonuses: Vec<String> = [
            ("helpful_comment", qa.bonuses.helpful_comment),
            ("pr_review", qa.bonuses.pr_review),
        ]
        .into_iter()
        .filter_map(|(name, v)| v.map(|v| format!("{}: {}", name, v)))
        .collect();
        if !bonuses.is_empty() {
            notes.push(format!("Bonuses: {}", bonuses.join(", ")));
        }
        if !notes.is_empty() {
            lines.push(format!("*Quality adjustments enabled: {}.*", notes.join("; ")));
        }
    }

    if snapshot.contribution_summaries.is_empty() {
        lines.push("No activity in period.".to_string());
        return lines.join("\n");
    }

    lines.push("| User | Issues | PRs | Merged | Reviews | Comments | Score |".to_string());
    lines.push("|------|--------|-----|--------|---------|----------|-------|".to_string());

    let mut summaries: Vec<&ContributionSummary> = snapshot.contribution_summaries.iter().collect();
    summaries.sort_by(|a, b| a.user.cmp(&b.user));
    for s in summaries {
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {} | {} |",
            s.user, s.issues_opened, s.prs_opened, s.prs_merged, s.reviews, s.comments, s.score
        ));
    }

    lines.join("\n")
}

fn render_roles(decisions: &[&RoleDecision]) -> String {
    let mut lines = vec!["## Discord Role Changes".to_string()];
    if decisions.is_empty() {
        lines.push("No Discord role changes planned.".to_string());
        return lines.join("\n");
    }

    for d in decisions {
        let evidence = match &d.evidence {
            RoleEvidence::Score { score, threshold } => {
                format!("score: {}, threshold: {}", score, threshold)
            }
            RoleEvidence::Merge {
                merged_prs,
                threshold,
            } => format!("merged PRs: {}, threshold: {}", merged_prs, threshold),
            RoleEvidence::Repo { repo } => format!("repo: {}", repo),
        };
        lines.push(format!(
            "- `{}` `{}` for `{}` / `{}` (reason: {}; decision: {}; {})",
            d.action, d.role, d.chat_user_id, d.code_host_user, d.reason, d.kind, evidence
        ));
    }

    lines.join("\n")
}

fn render_targets(decisions: &[&AssignmentDecision], kind: TargetKind) -> String {
    let (title, empty, preposition) = match kind {
        TargetKind::Issue => (
            "## GitHub Issue Assignments",
            "No GitHub issue assignments planned.",
            "to",
        ),
        TargetKind::PullRequest => (
            "## GitHub PR Review Assignments",
            "No GitHub PR review assignments planned.",
            "on",
        ),
    };

    let mut lines = vec![title.to_string()];
    let matching: Vec<&&AssignmentDecision> =
        decisions.iter().filter(|d| d.target_kind == kind).collect();
    if matching.is_empty() {
        lines.push(empty.to_string());
        return lines.join("\n");
    }

    for d in matching {
        let mut evidence = format!("pool: {}", d.evidence.eligible_pool.join(", "));
        if let Some(author) = &d.evidence.author {
            evidence.push_str(&format!("; author: {}", author));
        }
        lines.push(format!(
            "- `{}` `{}` {} `{}#{}` (reason: {}; {})",
            d.action, d.assignee, preposition, d.repo, d.target_number, d.reason, evidence
        ));
    }

    lines.join("\n")
}

/// Longest title shown in the activity feed
const FEED_TITLE_CHARS: usize = 60;

fn feed_line(event: &ContributionEvent, base: &str, repo: &str, kind: TargetKind) -> String {
    let (number, path) = match kind {
        TargetKind::Issue => (event.issue_number(), "issues"),
        TargetKind::PullRequest => (event.pr_number(), "pull"),
    };
    let number = number.map_or_else(|| "?".to_string(), |n| n.to_string());
    let title: String = event
        .title()
        .filter(|t| !t.is_empty())
        .unwrap_or("No title")
        .chars()
        .take(FEED_TITLE_CHARS)
        .collect();

    let mut line = format!("- #{} **{}** by {}", number, title, event.user);
    if event.kind == EventKind::PrMerged {
        let labels = event.difficulty_labels();
        if !labels.is_empty() {
            line.push_str(&format!(" [Labels: {}]", labels.join(", ")));
        }
    }
    line.push_str(&format!(" ({}/{}/{}/{})", base, repo, path, number));
    line
}

/// Repository-by-repository Markdown feed of opened/merged PRs and opened/closed issues
///
/// Other event kinds and events outside `[period_start, period_end]` are left out.
pub fn render_activity_feed(
    events: &[ContributionEvent],
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    org: &str,
) -> String {
    let period_days = (period_end - period_start).num_days().max(1);
    let mut lines = vec![
        "# Activity Feed (read-only)".to_string(),
        format!(
            "Period: last {} days (through {} UTC).",
            period_days,
            period_end.date_naive()
        ),
        String::new(),
    ];

    let sections = [
        (EventKind::PrOpened, "PRs opened", TargetKind::PullRequest),
        (EventKind::PrMerged, "PRs merged", TargetKind::PullRequest),
        (EventKind::IssueOpened, "Issues opened", TargetKind::Issue),
        (EventKind::IssueClosed, "Issues closed", TargetKind::Issue),
    ];

    let mut by_repo: BTreeMap<&str, Vec<&ContributionEvent>> = BTreeMap::new();
    for event in events {
        let in_feed = sections.iter().any(|(kind, _, _)| *kind == event.kind);
        if in_feed && event.occurred_at >= period_start && event.occurred_at <= period_end {
            by_repo.entry(event.repo.as_str()).or_default().push(event);
        }
    }

    if by_repo.is_empty() {
        lines.push("No PR or issue activity in this period.".to_string());
        return format!("{}\n", lines.join("\n"));
    }

    let base = format!("https://github.com/{}", org);
    for (repo, mut repo_events) in by_repo {
        repo_events.sort_by(|a, b| (a.occurred_at, &a.kind).cmp(&(b.occurred_at, &b.kind)));
        lines.push(format!("## {}", repo));

        for (kind, heading, target) in &sections {
            let matching: Vec<&&ContributionEvent> =
                repo_events.iter().filter(|e| e.kind == *kind).collect();
            if matching.is_empty() {
                continue;
            }
            lines.push(format!("### {} ({})", heading, matching.len()));
            for event in matching {
                lines.push(feed_line(event, &base, repo, *target));
            }
        }
        lines.push(String::new());
    }

    format!("{}\n", lines.join("\n").trim_end())
}
