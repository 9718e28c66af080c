pub mod assignment;
pub mod audit;
pub mod config;
pub mod error;
pub mod event;
pub mod journal;
pub mod metrics;
pub mod policy;
pub mod ports;
pub mod roles;
pub mod scoring;
pub mod snapshot;

// Re-export commonly used types
pub use assignment::{
    AssignmentAction, AssignmentDecision, AssignmentEvidence, OpenIssue, OpenPullRequest,
    TargetKind, UsersByRole, plan_assignments, users_by_role,
};
pub use audit::{AuditSnapshot, RenderedAudit, render_activity_feed, render_audit};
pub use config::{
    AssignmentConfig, EngineConfig, IdentityMapping, RepoFilter, RepoFilterMode, RoleRuleSet,
    ScoringConfig, WritePermissions, repo_allowed,
};
pub use error::{AdapterError, AdapterResult, CoreError, CoreResult};
pub use event::{ContributionEvent, EventKind};
pub use journal::{
    AuditEvent, AuditFilter, filter_audit_events, format_audit_csv, format_audit_markdown,
};
pub use metrics::{UserMetrics, contribution_metrics, rank_by_activity, rank_of};
pub use policy::{Channel, Gate, MutationPolicy, Outcome, RunMode, SkipReason};
pub use roles::{
    DecisionKind, MemberRoles, MergeHistory, RoleAction, RoleDecision, RoleEvidence,
    plan_role_changes,
};
pub use scoring::{ContributionSummary, Score, compute_scores, summarize_contributions};
pub use snapshot::{SNAPSHOT_SCHEMA_VERSION, StateSnapshot};
