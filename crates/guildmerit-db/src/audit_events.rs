use crate::error::DbResult;
use crate::models::{AuditEventRaw, format_ts};
use guildmerit_core::AuditEvent;
use serde_json::Value;
use sqlx::{Any, Pool};

/// Append one audit journal entry
pub async fn append_audit_event(pool: &Pool<Any>, event: &AuditEvent) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO audit_events (timestamp, actor_type, actor_id, event_type, context_json)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(format_ts(&event.timestamp))
    .bind(&event.actor_type)
    .bind(&event.actor_id)
    .bind(&event.event_type)
    .bind(Value::Object(event.context.clone()).to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Entire journal, oldest first
pub async fn list_audit_events(pool: &Pool<Any>) -> DbResult<Vec<AuditEvent>> {
    sqlx::query_as::<_, AuditEventRaw>(
        "SELECT timestamp, actor_type, actor_id, event_type, context_json
         FROM audit_events
         ORDER BY timestamp ASC, id ASC",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(AuditEvent::try_from)
    .collect()
}
