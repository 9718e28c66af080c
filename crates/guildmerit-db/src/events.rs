use crate::error::DbResult;
use crate::models::{ContributionEventRaw, format_ts};
use chrono::{DateTime, Utc};
use guildmerit_core::ContributionEvent;
use serde_json::Value;
use sqlx::{Any, Pool};

/// Append events, keeping the first copy of each natural identity
///
/// An event is identified by user, kind, repository, timestamp and target
/// number. A re-ingested event whose payload changed in the meantime (an
/// edited title, new labels) is not stored again. Returns how many events
/// were newly inserted.
pub async fn append_events(pool: &Pool<Any>, events: &[ContributionEvent]) -> DbResult<usize> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for event in events {
        let payload_json = Value::Object(event.payload.clone()).to_string();
        let result = sqlx::query(
            "INSERT INTO contribution_events
                (github_user, event_type, repo, occurred_at, target_number, payload_json)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(&event.user)
        .bind(event.kind.as_str())
        .bind(&event.repo)
        .bind(format_ts(&event.occurred_at))
        .bind(event.target_number().unwrap_or(0) as i64)
        .bind(payload_json)
        .execute(&mut *tx)
        .await?;

        inserted += result.rows_affected() as usize;
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Events that occurred at or after `since`, oldest first
pub async fn list_events_since(
    pool: &Pool<Any>,
    since: DateTime<Utc>,
) -> DbResult<Vec<ContributionEvent>> {
    sqlx::query_as::<_, ContributionEventRaw>(
        "SELECT github_user, event_type, repo, occurred_at, payload_json
         FROM contribution_events
         WHERE occurred_at >= ?
         ORDER BY occurred_at ASC, id ASC",
    )
    .bind(format_ts(&since))
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(ContributionEvent::try_from)
    .collect()
}

/// Count stored events
pub async fn count_events(pool: &Pool<Any>) -> DbResult<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contribution_events")
        .fetch_one(pool)
        .await?;

    Ok(count)
}
