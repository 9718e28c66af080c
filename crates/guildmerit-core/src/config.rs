use crate::error::{CoreError, CoreResult};
use crate::policy::{MutationPolicy, RunMode};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Penalties applied on top of the base score (non-positive values)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Penalties {
    pub reverted_pr: Option<i64>,
    pub failed_ci_merge: Option<i64>,
}

/// Bonuses applied on top of the base score (non-negative values)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bonuses {
    pub pr_review: Option<i64>,
    pub helpful_comment: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityAdjustments {
    #[serde(default)]
    pub penalties: Penalties,
    #[serde(default)]
    pub bonuses: Bonuses,
}

/// Scoring configuration for the rolling window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Length of the rolling scoring window
    #[serde(default = "default_period_days")]
    pub period_days: u32,

    /// Base weight table keyed by event wire name; only `pr_merged` is scored
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, i64>,

    /// Difficulty label -> weight, matched case-insensitively against merged PR labels
    #[serde(default)]
    pub difficulty_weights: Option<BTreeMap<String, i64>>,

    #[serde(default)]
    pub quality_adjustments: Option<QualityAdjustments>,
}

fn default_period_days() -> u32 {
    30
}

fn default_weights() -> BTreeMap<String, i64> {
    BTreeMap::from([("pr_merged".to_string(), 10)])
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            period_days: default_period_days(),
            weights: default_weights(),
            difficulty_weights: None,
            quality_adjustments: None,
        }
    }
}

impl ScoringConfig {
    pub fn period(&self) -> Duration {
        Duration::days(i64::from(self.period_days))
    }

    /// Inclusive `[start, end]` window ending at `period_end`
    pub fn window(&self, period_end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (period_end - self.period(), period_end)
    }

    /// Default weight of a merged PR
    pub fn merge_weight(&self) -> i64 {
        self.weights.get("pr_merged").copied().unwrap_or(0)
    }

    /// Difficulty weights with lowercased keys
    pub fn normalized_difficulty_weights(&self) -> BTreeMap<String, i64> {
        self.difficulty_weights
            .iter()
            .flatten()
            .map(|(label, weight)| (label.to_lowercase(), *weight))
            .collect()
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.period_days == 0 {
            return Err(CoreError::InvalidConfig(
                "scoring.period_days must be positive".to_string(),
            ));
        }

        if let Some(weights) = &self.difficulty_weights {
            let mut seen = BTreeSet::new();
            for label in weights.keys() {
                if label.trim().is_empty() {
                    return Err(CoreError::InvalidConfig(
                        "scoring.difficulty_weights contains an empty label".to_string(),
                    ));
                }
                if !seen.insert(label.to_lowercase()) {
                    return Err(CoreError::InvalidConfig(format!(
                        "scoring.difficulty_weights has duplicate label (case-insensitive): {}",
                        label
                    )));
                }
            }
        }

        if let Some(qa) = &self.quality_adjustments {
            let penalties = [
                ("reverted_pr", qa.penalties.reverted_pr),
                ("failed_ci_merge", qa.penalties.failed_ci_merge),
            ];
            for (name, value) in penalties {
                if value.is_some_and(|v| v > 0) {
                    return Err(CoreError::InvalidConfig(format!(
                        "penalty {} must not be positive",
                        name
                    )));
                }
            }

            let bonuses = [
                ("pr_review", qa.bonuses.pr_review),
                ("helpful_comment", qa.bonuses.helpful_comment),
            ];
            for (name, value) in bonuses {
                if value.is_some_and(|v| v < 0) {
                    return Err(CoreError::InvalidConfig(format!(
                        "bonus {} must not be negative",
                        name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Score threshold rule (revocable)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRoleRule {
    pub role: String,
    #[serde(default)]
    pub min_score: i64,
}

/// Merged PR count threshold rule (promotion-only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRoleRule {
    pub role: String,
    pub min_merged_prs: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRoleRules {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<MergeRoleRule>,
}

impl MergeRoleRules {
    /// Rules in effect, ascending by threshold (stable for equal thresholds)
    pub fn active(&self) -> Vec<&MergeRoleRule> {
        if !self.enabled {
            return Vec::new();
        }
        let mut rules: Vec<&MergeRoleRule> = self.rules.iter().collect();
        rules.sort_by_key(|rule| rule.min_merged_prs);
        rules
    }
}

/// The three role rule families
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRuleSet {
    #[serde(default)]
    pub score_rules: Vec<ScoreRoleRule>,

    #[serde(default)]
    pub merge_rules: MergeRoleRules,

    /// Repository name -> role granted for any lifetime merge in that repository
    #[serde(default)]
    pub repo_roles: BTreeMap<String, String>,
}

impl RoleRuleSet {
    /// Roles managed by the score family
    pub fn score_roles(&self) -> BTreeSet<&str> {
        self.score_rules.iter().map(|r| r.role.as_str()).collect()
    }

    /// Roles that may be granted but never revoked
    pub fn promotion_only_roles(&self) -> BTreeSet<&str> {
        self.merge_rules
            .active()
            .into_iter()
            .map(|r| r.role.as_str())
            .chain(self.repo_roles.values().map(String::as_str))
            .collect()
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.score_rules.is_empty() {
            return Err(CoreError::InvalidConfig(
                "roles.score_rules must not be empty".to_string(),
            ));
        }

        check_unique_roles("roles.score_rules", self.score_rules.iter().map(|r| &r.role))?;
        if let Some(rule) = self.score_rules.iter().find(|r| r.min_score < 0) {
            return Err(CoreError::InvalidConfig(format!(
                "roles.score_rules threshold for {} must not be negative",
                rule.role
            )));
        }
        check_unique_roles(
            "roles.merge_rules.rules",
            self.merge_rules.rules.iter().map(|r| &r.role),
        )?;

        for (repo, role) in &self.repo_roles {
            if repo.trim().is_empty() || role.trim().is_empty() {
                return Err(CoreError::InvalidConfig(
                    "roles.repo_roles entries need a repository and a role".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn check_unique_roles<'a>(
    family: &str,
    roles: impl Iterator<Item = &'a String>,
) -> CoreResult<()> {
    let mut seen = BTreeSet::new();
    for role in roles {
        if role.trim().is_empty() {
            return Err(CoreError::InvalidConfig(format!(
                "{} contains an empty role name",
                family
            )));
        }
        if !seen.insert(role) {
            return Err(CoreError::InvalidConfig(format!(
                "{} lists role {} more than once",
                family, role
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoFilterMode {
    Allow,
    Deny,
}

/// Allow or deny list of repository names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoFilter {
    pub mode: RepoFilterMode,
    pub names: Vec<String>,
}

impl RepoFilter {
    pub fn allows(&self, repo: &str) -> bool {
        let listed = self.names.iter().any(|name| name == repo);
        match self.mode {
            RepoFilterMode::Allow => listed,
            RepoFilterMode::Deny => !listed,
        }
    }
}

/// `true` when no filter is configured or the filter lets `repo` through
pub fn repo_allowed(filter: Option<&RepoFilter>, repo: &str) -> bool {
    filter.is_none_or(|f| f.allows(repo))
}

/// Chat roles whose holders are eligible for each assignment workflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentConfig {
    #[serde(default)]
    pub issue_roles: Vec<String>,
    #[serde(default)]
    pub review_roles: Vec<String>,
}

/// Link between a chat account and a code-host account
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityMapping {
    pub chat_user_id: String,
    pub code_host_user: String,
}

impl IdentityMapping {
    pub fn new(chat_user_id: impl Into<String>, code_host_user: impl Into<String>) -> Self {
        Self {
            chat_user_id: chat_user_id.into(),
            code_host_user: code_host_user.into(),
        }
    }
}

/// Per-channel write switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritePermissions {
    #[serde(default)]
    pub chat: bool,
    #[serde(default)]
    pub code_host: bool,
}

/// Everything one orchestration cycle needs, passed explicitly
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub mode: RunMode,

    #[serde(default)]
    pub permissions: WritePermissions,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub roles: RoleRuleSet,

    #[serde(default)]
    pub assignments: AssignmentConfig,

    /// Static identity fallback used when the verified-link store is empty
    #[serde(default)]
    pub identity_mappings: Vec<IdentityMapping>,

    #[serde(default)]
    pub repo_filter: Option<RepoFilter>,

    /// Write an append-only JSON state snapshot after every cycle
    #[serde(default)]
    pub snapshots: bool,
}

impl EngineConfig {
    pub fn policy(&self) -> MutationPolicy {
        MutationPolicy::new(self.mode, self.permissions.chat, self.permissions.code_host)
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.scoring.validate()?;
        self.roles.validate()?;

        if let Some(filter) = &self.repo_filter {
            if filter.names.is_empty() {
                return Err(CoreError::InvalidConfig(
                    "repo_filter.names must be a non-empty list".to_string(),
                ));
            }
        }

        for mapping in &self.identity_mappings {
            if mapping.chat_user_id.trim().is_empty() || mapping.code_host_user.trim().is_empty() {
                return Err(CoreError::InvalidConfig(
                    "identity_mappings entries need both a chat user id and a code host user"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}
