use crate::apply::{Applied, apply_assignment_decisions, apply_role_decisions};
use crate::error::EngineResult;
use crate::identity::{IdentitySource, resolve_identities};
use chrono::{DateTime, Utc};
use guildmerit_core::journal::ACTOR_SYSTEM;
use guildmerit_core::ports::{
    ChatRoleReader, ChatRoleWriter, CodeHostReader, CodeHostWriter, ReportSink, Storage,
};
use guildmerit_core::{
    AssignmentDecision, AuditEvent, AuditSnapshot, ContributionEvent, EngineConfig, MergeHistory,
    RoleDecision, RunMode, Score, StateSnapshot, compute_scores, plan_assignments,
    plan_role_changes, render_activity_feed, render_audit, repo_allowed, summarize_contributions,
    users_by_role,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Cursor key for code-host ingestion
pub const GITHUB_CURSOR: &str = "github";

/// Concrete implementations of every capability a cycle uses
#[derive(Clone)]
pub struct Adapters {
    pub storage: Arc<dyn Storage>,
    pub chat_reader: Arc<dyn ChatRoleReader>,
    pub chat_writer: Arc<dyn ChatRoleWriter>,
    pub code_reader: Arc<dyn CodeHostReader>,
    pub code_writer: Arc<dyn CodeHostWriter>,
    pub report_sink: Arc<dyn ReportSink>,
}

/// What one cycle did, printed by the CLI as JSON
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub timestamp: DateTime<Utc>,
    pub run_mode: RunMode,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub identity_source: IdentitySource,
    pub ingested_events: usize,
    pub stored_events: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion_error: Option<String>,
    pub cursor: Option<DateTime<Utc>>,
    pub scores: Vec<Score>,
    pub audit_report_written: bool,
    pub activity_report_written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_run_id: Option<String>,
    pub role_changes: Vec<Applied<RoleDecision>>,
    pub assignments: Vec<Applied<AssignmentDecision>>,
}

impl CycleReport {
    pub fn applied_count(&self) -> usize {
        self.role_changes.iter().filter(|a| a.outcome.is_applied()).count()
            + self.assignments.iter().filter(|a| a.outcome.is_applied()).count()
    }
}

struct Ingestion {
    received: usize,
    stored: usize,
    error: Option<String>,
    cursor: Option<DateTime<Utc>>,
}

pub struct Orchestrator {
    config: EngineConfig,
    org: String,
    adapters: Adapters,
}

impl Orchestrator {
    pub fn new(config: EngineConfig, org: impl Into<String>, adapters: Adapters) -> Self {
        Self {
            config,
            org: org.into(),
            adapters,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one full cycle: ingest, score, plan, report, apply
    pub async fn run_once(&self, now: DateTime<Utc>) -> EngineResult<CycleReport> {
        self.config.validate()?;

        let (period_start, period_end) = self.config.scoring.window(now);
        info!(
            "Starting {} cycle for {} over {} .. {}",
            self.config.mode, self.org, period_start, period_end
        );

        let identities = resolve_identities(
            self.adapters.storage.as_ref(),
            &self.config.identity_mappings,
        )
        .await;
        let mappings = identities.mappings;

        let ingestion = self.ingest(period_start).await?;

        let window_events = self.adapters.storage.query(period_start).await?;
        let scores = compute_scores(&window_events, period_end, &self.config.scoring);
        self.adapters.storage.upsert_scores(&scores).await?;
        info!("Computed {} scores from {} stored events", scores.len(), window_events.len());

        let member_roles = self.adapters.chat_reader.list_member_roles().await?;

        let open_issues = self
            .adapters
            .code_reader
            .list_open_issues()
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to list open issues, planning without them: {}", e);
                Vec::new()
            });
        let open_pull_requests = self
            .adapters
            .code_reader
            .list_open_pull_requests()
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to list open pull requests, planning without them: {}", e);
                Vec::new()
            });

        let lifetime_events = self.adapters.storage.query(DateTime::<Utc>::UNIX_EPOCH).await?;
        let merges = MergeHistory::from_events(
            &window_events,
            &lifetime_events,
            &mappings,
            period_start,
            period_end,
            self.config.repo_filter.as_ref(),
        );

        let role_decisions =
            plan_role_changes(&member_roles, &scores, &mappings, &self.config.roles, &merges);
        let assignment_decisions = plan_assignments(
            &open_issues,
            &open_pull_requests,
            &users_by_role(&mappings, &member_roles),
            &self.config.assignments.issue_roles,
            &self.config.assignments.review_roles,
        );

        let summaries =
            summarize_contributions(&window_events, period_start, period_end, &scores);

        let (audit_report_written, activity_report_written) =
            if self.config.mode.writes_audit_report() {
                let snapshot = AuditSnapshot {
                    timestamp: now,
                    run_mode: self.config.mode,
                    org: self.org.clone(),
                    repo_filter: self.config.repo_filter.clone(),
                    repo_count: self.adapters.code_reader.discovered_repo_count(),
                    period_days: self.config.scoring.period_days,
                    difficulty_weights: self.config.scoring.difficulty_weights.clone(),
                    quality_adjustments: self.config.scoring.quality_adjustments.clone(),
                    contribution_summaries: summaries.clone(),
                    role_decisions: role_decisions.clone(),
                    assignment_decisions: assignment_decisions.clone(),
                };
                let audit = self.write_audit(&snapshot).await;
                let feed =
                    render_activity_feed(&window_events, period_start, period_end, &self.org);
                let activity = self.write_activity(&feed, now).await;
                (audit, activity)
            } else {
                (false, false)
            };

        let policy = self.config.policy();
        let role_changes = apply_role_decisions(
            &role_decisions,
            &policy,
            self.adapters.chat_writer.as_ref(),
        )
        .await;
        let assignments = apply_assignment_decisions(
            &assignment_decisions,
            &policy,
            self.adapters.code_writer.as_ref(),
        )
        .await;

        let snapshot_run_id = if self.config.snapshots {
            let state = StateSnapshot {
                generated_at: now,
                org: self.org.clone(),
                run_id: format!("{:08x}", rand::random::<u32>()),
                period_start,
                period_end,
                identities: mappings.clone(),
                scores: scores.clone(),
                contributors: summaries,
                member_roles: member_roles.clone(),
            };
            self.write_snapshot(&state).await
        } else {
            None
        };

        let report = CycleReport {
            timestamp: now,
            run_mode: self.config.mode,
            period_start,
            period_end,
            identity_source: identities.source,
            ingested_events: ingestion.received,
            stored_events: ingestion.stored,
            ingestion_error: ingestion.error,
            cursor: ingestion.cursor,
            scores,
            audit_report_written,
            activity_report_written,
            snapshot_run_id,
            role_changes,
            assignments,
        };

        let completed = AuditEvent::new(now, ACTOR_SYSTEM, "", "cycle_completed")
            .with("run_mode", self.config.mode.as_str())
            .with("scores", report.scores.len())
            .with("role_decisions", report.role_changes.len())
            .with("assignment_decisions", report.assignments.len())
            .with("applied", report.applied_count());
        if let Err(e) = self.adapters.storage.append_audit_event(&completed).await {
            warn!("Failed to record cycle_completed audit event: {}", e);
        }

        info!(
            "Cycle finished: {} role decisions, {} assignment decisions, {} applied",
            report.role_changes.len(),
            report.assignments.len(),
            report.applied_count()
        );
        Ok(report)
    }

    /// Pull new events since the stored cursor and append them
    ///
    /// Only storage errors abort; a failing code host leaves the cycle on stored data.
    async fn ingest(&self, period_start: DateTime<Utc>) -> EngineResult<Ingestion> {
        let stored_cursor = self.adapters.storage.get_cursor(GITHUB_CURSOR).await?;
        let since = stored_cursor.unwrap_or(period_start);

        let fetched = match self.adapters.code_reader.list_contributions(since).await {
            Ok(events) => events,
            Err(e) => {
                error!("Ingestion failed, continuing with stored events: {}", e);
                return Ok(Ingestion {
                    received: 0,
                    stored: 0,
                    error: Some(e.to_string()),
                    cursor: stored_cursor,
                });
            }
        };

        let events: Vec<ContributionEvent> = fetched
            .into_iter()
            .filter(|event| {
                if !event.is_well_formed() {
                    warn!(
                        "Dropping malformed event {} (user '{}', repo '{}')",
                        event.kind, event.user, event.repo
                    );
                    return false;
                }
                if !repo_allowed(self.config.repo_filter.as_ref(), &event.repo) {
                    debug!("Dropping event from filtered repository {}", event.repo);
                    return false;
                }
                true
            })
            .collect();

        if events.is_empty() {
            info!("No new contribution events since {}", since);
            return Ok(Ingestion {
                received: 0,
                stored: 0,
                error: None,
                cursor: stored_cursor,
            });
        }

        let stored = self.adapters.storage.append(&events).await?;
        info!("Ingested {} events ({} new)", events.len(), stored);

        let mut cursor = stored_cursor;
        if let Some(latest) = events.iter().map(|event| event.occurred_at).max() {
            if stored_cursor.is_none_or(|current| latest > current) {
                self.adapters.storage.set_cursor(GITHUB_CURSOR, latest).await?;
                cursor = Some(latest);
            }
        }

        Ok(Ingestion {
            received: events.len(),
            stored,
            error: None,
            cursor,
        })
    }

    async fn write_audit(&self, snapshot: &AuditSnapshot) -> bool {
        let rendered = match render_audit(snapshot) {
            Ok(rendered) => rendered,
            Err(e) => {
                error!("Failed to render audit report: {}", e);
                return false;
            }
        };

        match self.adapters.report_sink.write_report(&rendered).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to write audit report: {}", e);
                false
            }
        }
    }

    async fn write_activity(&self, markdown: &str, now: DateTime<Utc>) -> bool {
        if let Err(e) = self.adapters.report_sink.write_activity(markdown).await {
            error!("Failed to write activity report: {}", e);
            return false;
        }

        let generated = AuditEvent::new(now, ACTOR_SYSTEM, "", "report_generated")
            .with("org", self.org.as_str())
            .with("mode", self.config.mode.as_str());
        if let Err(e) = self.adapters.storage.append_audit_event(&generated).await {
            warn!("Failed to record report_generated audit event: {}", e);
        }
        true
    }

    /// Returns the run id when the snapshot was written
    async fn write_snapshot(&self, state: &StateSnapshot) -> Option<String> {
        if let Err(e) = self.adapters.report_sink.write_snapshot(state).await {
            warn!("Failed to write state snapshot: {}", e);
            return None;
        }

        let written = AuditEvent::new(state.generated_at, ACTOR_SYSTEM, "", "snapshot_written")
            .with("org", self.org.as_str())
            .with("run_id", state.run_id.as_str())
            .with("snapshot_dir", state.dir_name());
        if let Err(e) = self.adapters.storage.append_audit_event(&written).await {
            warn!("Failed to record snapshot_written audit event: {}", e);
        }
        Some(state.run_id.clone())
    }
}
