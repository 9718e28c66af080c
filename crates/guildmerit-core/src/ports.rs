//! Capability traits implemented by the adapter crates

use crate::assignment::{OpenIssue, OpenPullRequest};
use crate::audit::RenderedAudit;
use crate::config::IdentityMapping;
use crate::error::AdapterResult;
use crate::event::ContributionEvent;
use crate::journal::AuditEvent;
use crate::roles::MemberRoles;
use crate::scoring::Score;
use crate::snapshot::StateSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistent event store, cursors, scores and optional extras
#[async_trait]
pub trait Storage: Send + Sync {
    /// Append events, ignoring exact duplicates; returns the number newly stored
    async fn append(&self, events: &[ContributionEvent]) -> AdapterResult<usize>;

    /// Events with `occurred_at >= since`, oldest first
    async fn query(&self, since: DateTime<Utc>) -> AdapterResult<Vec<ContributionEvent>>;

    async fn get_cursor(&self, source: &str) -> AdapterResult<Option<DateTime<Utc>>>;

    async fn set_cursor(&self, source: &str, at: DateTime<Utc>) -> AdapterResult<()>;

    async fn upsert_scores(&self, scores: &[Score]) -> AdapterResult<()>;

    /// Verified chat <-> code-host links; empty when the store keeps none
    async fn list_verified_identities(&self) -> AdapterResult<Vec<IdentityMapping>> {
        Ok(Vec::new())
    }

    async fn append_audit_event(&self, _event: &AuditEvent) -> AdapterResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait ChatRoleReader: Send + Sync {
    /// Live snapshot of role names per chat member
    async fn list_member_roles(&self) -> AdapterResult<MemberRoles>;
}

#[async_trait]
pub trait ChatRoleWriter: Send + Sync {
    async fn add_role(&self, chat_user_id: &str, role: &str) -> AdapterResult<()>;

    async fn remove_role(&self, chat_user_id: &str, role: &str) -> AdapterResult<()>;
}

#[async_trait]
pub trait CodeHostReader: Send + Sync {
    async fn list_contributions(
        &self,
        since: DateTime<Utc>,
    ) -> AdapterResult<Vec<ContributionEvent>>;

    async fn list_open_issues(&self) -> AdapterResult<Vec<OpenIssue>>;

    async fn list_open_pull_requests(&self) -> AdapterResult<Vec<OpenPullRequest>>;

    /// Number of repositories in scope, once known
    fn discovered_repo_count(&self) -> Option<usize> {
        None
    }
}

#[async_trait]
pub trait CodeHostWriter: Send + Sync {
    async fn assign(&self, repo: &str, number: u64, assignee: &str) -> AdapterResult<()>;

    async fn request_review(&self, repo: &str, number: u64, reviewer: &str) -> AdapterResult<()>;
}

/// Destination of the pre-mutation audit report and the other cycle outputs
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn write_report(&self, report: &RenderedAudit) -> AdapterResult<()>;

    /// Markdown activity feed written next to the audit report
    async fn write_activity(&self, _markdown: &str) -> AdapterResult<()> {
        Ok(())
    }

    /// Must never replace an earlier snapshot
    async fn write_snapshot(&self, _snapshot: &StateSnapshot) -> AdapterResult<()> {
        Ok(())
    }
}
