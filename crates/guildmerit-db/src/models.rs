use crate::error::{DbError, DbResult};
use chrono::{DateTime, SecondsFormat, Utc};
use guildmerit_core::{AuditEvent, ContributionEvent, EventKind, Score};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;

/// Fixed-width UTC form so that string order equals time order
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(column: &'static str, raw: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| DbError::InvalidTimestamp(column, raw.to_string()))
}

/// Raw contribution event from database (with string timestamp and JSON payload)
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ContributionEventRaw {
    pub github_user: String,
    pub event_type: String,
    pub repo: String,
    pub occurred_at: String,
    pub payload_json: String,
}

impl TryFrom<ContributionEventRaw> for ContributionEvent {
    type Error = DbError;

    fn try_from(raw: ContributionEventRaw) -> DbResult<Self> {
        let payload: Map<String, Value> = serde_json::from_str(&raw.payload_json)?;
        Ok(Self {
            user: raw.github_user,
            kind: EventKind::from(raw.event_type),
            repo: raw.repo,
            occurred_at: parse_ts("occurred_at", &raw.occurred_at)?,
            payload,
        })
    }
}

/// Raw score row from database
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ScoreRaw {
    pub github_user: String,
    pub period_start: String,
    pub period_end: String,
    pub points: i64,
}

impl TryFrom<ScoreRaw> for Score {
    type Error = DbError;

    fn try_from(raw: ScoreRaw) -> DbResult<Self> {
        Ok(Self {
            user: raw.github_user,
            period_start: parse_ts("period_start", &raw.period_start)?,
            period_end: parse_ts("period_end", &raw.period_end)?,
            points: raw.points,
        })
    }
}

/// Identity link database model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLink {
    pub chat_user_id: String,
    pub code_host_user: String,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Raw identity link from database (SQLite BOOLEAN as INTEGER)
#[derive(Debug, Clone, FromRow)]
pub(crate) struct IdentityLinkRaw {
    pub discord_user_id: String,
    pub github_user: String,
    pub verified: i32,
    pub verified_at: Option<String>,
    pub created_at: String,
}

impl TryFrom<IdentityLinkRaw> for IdentityLink {
    type Error = DbError;

    fn try_from(raw: IdentityLinkRaw) -> DbResult<Self> {
        Ok(Self {
            chat_user_id: raw.discord_user_id,
            code_host_user: raw.github_user,
            verified: raw.verified != 0,
            verified_at: raw
                .verified_at
                .as_deref()
                .map(|ts| parse_ts("verified_at", ts))
                .transpose()?,
            created_at: parse_ts("created_at", &raw.created_at)?,
        })
    }
}

/// Raw audit event from database
#[derive(Debug, Clone, FromRow)]
pub(crate) struct AuditEventRaw {
    pub timestamp: String,
    pub actor_type: String,
    pub actor_id: String,
    pub event_type: String,
    pub context_json: String,
}

impl TryFrom<AuditEventRaw> for AuditEvent {
    type Error = DbError;

    fn try_from(raw: AuditEventRaw) -> DbResult<Self> {
        Ok(Self {
            timestamp: parse_ts("timestamp", &raw.timestamp)?,
            actor_type: raw.actor_type,
            actor_id: raw.actor_id,
            event_type: raw.event_type,
            context: serde_json::from_str(&raw.context_json)?,
        })
    }
}
