use serde::{Deserialize, Serialize};
use std::fmt;

/// Run mode fixed for the whole invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Plan and report only
    #[default]
    DryRun,
    /// Plan and report only, for a live community
    Observer,
    /// Apply mutations allowed by the write flags
    Active,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::DryRun => "dry-run",
            RunMode::Observer => "observer",
            RunMode::Active => "active",
        }
    }

    /// Modes that write the audit report before mutation
    pub fn writes_audit_report(&self) -> bool {
        matches!(self, RunMode::DryRun | RunMode::Observer)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dry-run" | "dry_run" => Ok(RunMode::DryRun),
            "observer" => Ok(RunMode::Observer),
            "active" => Ok(RunMode::Active),
            other => Err(format!("unknown run mode: {}", other)),
        }
    }
}

/// Mutation channel a decision targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    ChatRoles,
    CodeHost,
}

/// Why a mutation was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DryRun,
    ObserverMode,
    WriteDisabled,
    Duplicate,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::DryRun => "skipped (dry-run)",
            SkipReason::ObserverMode => "skipped (observer mode)",
            SkipReason::WriteDisabled => "skipped (write disabled)",
            SkipReason::Duplicate => "skipped (duplicate)",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a mutation gate check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gate {
    /// Mutation may be attempted
    Allow,
    /// Mutation must not be attempted
    Skip(SkipReason),
}

/// Final outcome of one decision after application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    Skipped(SkipReason),
    Failed(String),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

impl From<Gate> for Outcome {
    fn from(gate: Gate) -> Self {
        match gate {
            Gate::Allow => Outcome::Applied,
            Gate::Skip(reason) => Outcome::Skipped(reason),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Applied => f.write_str("applied"),
            Outcome::Skipped(reason) => write!(f, "{}", reason),
            Outcome::Failed(message) => write!(f, "failed ({})", message),
        }
    }
}

/// Pure predicate deciding whether a mutation may be attempted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationPolicy {
    pub run_mode: RunMode,
    pub chat_write_allowed: bool,
    pub code_host_write_allowed: bool,
}

impl MutationPolicy {
    pub fn new(run_mode: RunMode, chat_write_allowed: bool, code_host_write_allowed: bool) -> Self {
        Self {
            run_mode,
            chat_write_allowed,
            code_host_write_allowed,
        }
    }

    /// Check whether a mutation on `channel` may be attempted
    ///
    /// Returns `Gate::Allow` only in active mode with the channel's write flag set.
    ///
    /// # Examples
    ///
    /// ```
    /// use guildmerit_core::policy::{Channel, Gate, MutationPolicy, RunMode, SkipReason};
    ///
    /// let policy = MutationPolicy::new(RunMode::Active, false, true);
    /// assert_eq!(policy.gate(Channel::CodeHost), Gate::Allow);
    /// assert_eq!(policy.gate(Channel::ChatRoles), Gate::Skip(SkipReason::WriteDisabled));
    ///
    /// let policy = MutationPolicy::new(RunMode::DryRun, true, true);
    /// assert_eq!(policy.gate(Channel::ChatRoles), Gate::Skip(SkipReason::DryRun));
    /// ```
    pub fn gate(&self, channel: Channel) -> Gate {
        match self.run_mode {
            RunMode::DryRun => Gate::Skip(SkipReason::DryRun),
            RunMode::Observer => Gate::Skip(SkipReason::ObserverMode),
            RunMode::Active => {
                let allowed = match channel {
                    Channel::ChatRoles => self.chat_write_allowed,
                    Channel::CodeHost => self.code_host_write_allowed,
                };
                if allowed {
                    Gate::Allow
                } else {
                    Gate::Skip(SkipReason::WriteDisabled)
                }
            }
        }
    }
}
