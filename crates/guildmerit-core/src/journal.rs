use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const ACTOR_SYSTEM: &str = "system";
pub const ACTOR_CHAT_USER: &str = "discord_user";

/// One entry of the append-only audit journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub actor_type: String,
    pub actor_id: String,
    pub event_type: String,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        actor_type: impl Into<String>,
        actor_id: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            actor_type: actor_type.into(),
            actor_id: actor_id.into(),
            event_type: event_type.into(),
            context: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    fn context_str(&self, key: &str) -> String {
        match self.context.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn timestamp_str(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Criteria for [`filter_audit_events`]; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    /// Matches the actor id or the `github_user` context entry
    pub user: Option<String>,
    pub event_type: Option<String>,
    /// Inclusive lower bound
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub to: Option<DateTime<Utc>>,
}

pub fn filter_audit_events(events: &[AuditEvent], filter: &AuditFilter) -> Vec<AuditEvent> {
    events
        .iter()
        .filter(|e| {
            filter.user.as_deref().is_none_or(|user| {
                e.actor_id == user
                    || e.context.get("github_user").and_then(Value::as_str) == Some(user)
            })
        })
        .filter(|e| {
            filter
                .event_type
                .as_deref()
                .is_none_or(|event_type| e.event_type == event_type)
        })
        .filter(|e| filter.from.is_none_or(|from| e.timestamp >= from))
        .filter(|e| filter.to.is_none_or(|to| e.timestamp <= to))
        .cloned()
        .collect()
}

/// CSV with columns `ts,event_type,github_user,discord_user_id,repo,target,details`
pub fn format_audit_csv(events: &[AuditEvent]) -> String {
    let mut out = String::from("ts,event_type,github_user,discord_user_id,repo,target,details\r\n");

    for event in events {
        let chat_user = if event.actor_type == ACTOR_CHAT_USER {
            event.actor_id.clone()
        } else {
            String::new()
        };
        let target = match event.context_str("target") {
            t if t.is_empty() => event.context_str("location"),
            t => t,
        };
        let details = Value::Object(event.context.clone()).to_string();

        let row = [
            event.timestamp_str(),
            event.event_type.clone(),
            event.context_str("github_user"),
            chat_user,
            event.context_str("repo"),
            target,
            details,
        ];
        let cells: Vec<String> = row.iter().map(|cell| csv_cell(cell)).collect();
        out.push_str(&cells.join(","));
        out.push_str("\r\n");
    }

    out
}

fn csv_cell(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Markdown tables grouped by event type, oldest first within a group
pub fn format_audit_markdown(events: &[AuditEvent]) -> String {
    if events.is_empty() {
        return "# Audit Events\n\nNo events found.\n".to_string();
    }

    let mut by_type: BTreeMap<&str, Vec<&AuditEvent>> = BTreeMap::new();
    for event in events {
        by_type.entry(event.event_type.as_str()).or_default().push(event);
    }

    let mut lines = vec!["# Audit Events".to_string(), String::new()];
    for (event_type, mut group) in by_type {
        group.sort_by_key(|e| e.timestamp);

        lines.push(format!("## {}", event_type));
        lines.push(String::new());
        lines.push("| Timestamp | Actor | GitHub User | Details |".to_string());
        lines.push("|-----------|-------|-------------|---------|".to_string());

        for event in group {
            let actor = if event.actor_id.is_empty() {
                event.actor_type.clone()
            } else {
                format!("{}:{}", event.actor_type, event.actor_id)
            };
            let details: Vec<String> = event
                .context
                .iter()
                .filter(|(key, _)| key.as_str() != "github_user")
                .map(|(key, value)| match value {
                    Value::String(s) => format!("{}={}", key, s),
                    other => format!("{}={}", key, other),
                })
                .collect();
            let details = if details.is_empty() {
                "-".to_string()
            } else {
                details.join(", ")
            };

            lines.push(format!(
                "| {} | {} | {} | {} |",
                event.timestamp_str(),
                actor,
                event.context_str("github_user"),
                details
            ));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}
