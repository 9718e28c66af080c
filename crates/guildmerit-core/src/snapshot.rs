//! Append-only JSON state snapshots
//!
//! Each snapshot is a set of small JSON documents sharing one envelope
//! (`schema_version`, `generated_at`, `org`, `run_id`).

use crate::config::IdentityMapping;
use crate::error::{CoreError, CoreResult};
use crate::roles::MemberRoles;
use crate::scoring::{ContributionSummary, Score};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value, json};

/// Bumped on breaking changes to the snapshot documents
pub const SNAPSHOT_SCHEMA_VERSION: &str = "1.0.0";

/// State captured at the end of a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub generated_at: DateTime<Utc>,
    pub org: String,
    pub run_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub identities: Vec<IdentityMapping>,
    pub scores: Vec<Score>,
    pub contributors: Vec<ContributionSummary>,
    pub member_roles: MemberRoles,
}

#[derive(Serialize)]
struct MemberRolesEntry<'a> {
    chat_user_id: &'a str,
    roles: Vec<&'a str>,
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl StateSnapshot {
    /// Directory name unique to this run, e.g. `2024-03-31T08-00-00-1a2b3c4d`
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.generated_at.format("%Y-%m-%dT%H-%M-%S"), self.run_id)
    }

    fn envelope(&self, data: Value) -> Value {
        json!({
            "schema_version": SNAPSHOT_SCHEMA_VERSION,
            "generated_at": ts(&self.generated_at),
            "org": self.org,
            "run_id": self.run_id,
            "data": data,
        })
    }

    /// File name and pretty JSON contents of every snapshot document
    pub fn documents(&self) -> CoreResult<Vec<(&'static str, String)>> {
        let meta = json!({
            "schema_version": SNAPSHOT_SCHEMA_VERSION,
            "generated_at": ts(&self.generated_at),
            "org": self.org,
            "run_id": self.run_id,
            "period_start": ts(&self.period_start),
            "period_end": ts(&self.period_end),
        });

        let roles: Vec<MemberRolesEntry> = self
            .member_roles
            .iter()
            .map(|(chat_user_id, roles)| MemberRolesEntry {
                chat_user_id,
                roles: roles.iter().map(String::as_str).collect(),
            })
            .collect();

        let to_value = |name: &str, value: Result<Value, serde_json::Error>| {
            value.map_err(|e| {
                CoreError::AuditRender(format!("Failed to serialize {}: {}", name, e))
            })
        };

        let documents = [
            ("meta.json", meta),
            (
                "identities.json",
                self.envelope(to_value("identities", serde_json::to_value(&self.identities))?),
            ),
            (
                "scores.json",
                self.envelope(to_value("scores", serde_json::to_value(&self.scores))?),
            ),
            (
                "contributors.json",
                self.envelope(to_value("contributors", serde_json::to_value(&self.contributors))?),
            ),
            (
                "roles.json",
                self.envelope(to_value("roles", serde_json::to_value(&roles))?),
            ),
        ];

        documents
            .into_iter()
            .map(|(name, value)| {
                serde_json::to_string_pretty(&value)
                    .map(|text| (name, text))
                    .map_err(|e| {
                        CoreError::AuditRender(format!("Failed to render {}: {}", name, e))
                    })
            })
            .collect()
    }
}
