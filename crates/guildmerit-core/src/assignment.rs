use crate::config::IdentityMapping;
use crate::roles::MemberRoles;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::info;

/// Role name -> code-host users holding it
pub type UsersByRole = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenIssue {
    pub repo: String,
    pub number: u64,
    #[serde(default)]
    pub assignees: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPullRequest {
    pub repo: String,
    pub number: u64,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Issue,
    PullRequest,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Issue => "issue",
            TargetKind::PullRequest => "pull_request",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentAction {
    Assign,
    RequestReview,
}

impl AssignmentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentAction::Assign => "assign",
            AssignmentAction::RequestReview => "request_review",
        }
    }
}

impl fmt::Display for AssignmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentEvidence {
    pub eligible_pool: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentDecision {
    pub repo: String,
    pub target_number: u64,
    pub target_kind: TargetKind,
    pub assignee: String,
    pub action: AssignmentAction,
    pub reason: String,
    pub evidence: AssignmentEvidence,
}

/// Invert live chat roles into role -> code-host users for mapped members
pub fn users_by_role(
    identity_mappings: &[IdentityMapping],
    member_roles: &MemberRoles,
) -> UsersByRole {
    let mut by_role = UsersByRole::new();
    for mapping in identity_mappings {
        let Some(held) = member_roles.get(&mapping.chat_user_id) else {
            continue;
        };
        for role in held {
            by_role
                .entry(role.clone())
                .or_default()
                .insert(mapping.code_host_user.clone());
        }
    }
    by_role
}

/// Sorted, deduplicated union of users holding any of `roles`
pub fn eligible_pool(users_by_role: &UsersByRole, roles: &[String]) -> Vec<String> {
    roles
        .iter()
        .filter_map(|role| users_by_role.get(role))
        .flatten()
        .cloned()
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

/// Round-robin issue assignments and review requests
///
/// Targets are sorted by `(repo, number)` and the target at position `i`
/// goes to `pool[i % pool.len()]`. Issues that already have assignees keep
/// their position but get no decision. PR authors never review their own PR.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeSet;
/// use guildmerit_core::assignment::{OpenIssue, UsersByRole, plan_assignments};
///
/// let mut users = UsersByRole::new();
/// users.insert(
///     "Triage".to_string(),
///     BTreeSet::from(["ann".to_string(), "ben".to_string()]),
/// );
/// let issues = vec![
///     OpenIssue { repo: "core".into(), number: 2, assignees: vec![] },
///     OpenIssue { repo: "core".into(), number: 1, assignees: vec![] },
/// ];
///
/// let decisions = plan_assignments(&issues, &[], &users, &["Triage".to_string()], &[]);
/// assert_eq!(decisions[0].target_number, 1);
/// assert_eq!(decisions[0].assignee, "ann");
/// assert_eq!(decisions[1].assignee, "ben");
/// ```
pub fn plan_assignments(
    open_issues: &[OpenIssue],
    open_pull_requests: &[OpenPullRequest],
    users_by_role: &UsersByRole,
    issue_roles: &[String],
    review_roles: &[String],
) -> Vec<AssignmentDecision> {
    let mut decisions =
        plan_issue_assignments(open_issues, &eligible_pool(users_by_role, issue_roles));
    decisions.extend(plan_review_requests(
        open_pull_requests,
        &eligible_pool(users_by_role, review_roles),
    ));

    if decisions.is_empty() {
        info!("No assignment changes required");
    } else {
        info!("Planned {} assignment actions", decisions.len());
    }

    decisions
}

fn plan_issue_assignments(issues: &[OpenIssue], pool: &[String]) -> Vec<AssignmentDecision> {
    if pool.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<&OpenIssue> = issues.iter().collect();
    sorted.sort_by(|a, b| (&a.repo, a.number).cmp(&(&b.repo, b.number)));

    sorted
        .into_iter()
        .enumerate()
        .filter(|(_, issue)| issue.assignees.is_empty())
        .map(|(index, issue)| AssignmentDecision {
            repo: issue.repo.clone(),
            target_number: issue.number,
            target_kind: TargetKind::Issue,
            assignee: pool[index % pool.len()].clone(),
            action: AssignmentAction::Assign,
            reason: "Role-based issue assignment".to_string(),
            evidence: AssignmentEvidence {
                eligible_pool: pool.to_vec(),
                author: None,
            },
        })
        .collect()
}

fn plan_review_requests(prs: &[OpenPullRequest], pool: &[String]) -> Vec<AssignmentDecision> {
    if pool.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<&OpenPullRequest> = prs.iter().collect();
    sorted.sort_by(|a, b| (&a.repo, a.number).cmp(&(&b.repo, b.number)));

    let mut decisions = Vec::new();
    for (index, pr) in sorted.into_iter().enumerate() {
        let candidates: Vec<&String> = pool
            .iter()
            .filter(|user| pr.author.as_deref() != Some(user.as_str()))
            .collect();
        if candidates.is_empty() {
            continue;
        }

        decisions.push(AssignmentDecision {
            repo: pr.repo.clone(),
            target_number: pr.number,
            target_kind: TargetKind::PullRequest,
            assignee: candidates[index % candidates.len()].clone(),
            action: AssignmentAction::RequestReview,
            reason: "Role-based review assignment".to_string(),
            evidence: AssignmentEvidence {
                eligible_pool: pool.to_vec(),
                author: pr.author.clone(),
            },
        });
    }
    decisions
}
