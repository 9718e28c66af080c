use crate::error::DbResult;
use crate::models::{format_ts, parse_ts};
use chrono::{DateTime, Utc};
use sqlx::{Any, Pool};

pub async fn get_cursor(pool: &Pool<Any>, source: &str) -> DbResult<Option<DateTime<Utc>>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT cursor_at FROM cursors WHERE source = ?")
        .bind(source)
        .fetch_optional(pool)
        .await?;

    row.map(|(raw,)| parse_ts("cursor_at", &raw)).transpose()
}

pub async fn set_cursor(pool: &Pool<Any>, source: &str, at: DateTime<Utc>) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO cursors (source, cursor_at, updated_at)
         VALUES (?, ?, ?)
         ON CONFLICT (source)
         DO UPDATE SET cursor_at = excluded.cursor_at, updated_at = excluded.updated_at",
    )
    .bind(source)
    .bind(format_ts(&at))
    .bind(format_ts(&Utc::now()))
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::setup_test_db;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_missing_cursor_is_none() {
        let pool = setup_test_db().await;
        assert_eq!(get_cursor(&pool, "github").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_and_overwrite_cursor() {
        let pool = setup_test_db().await;
        let first = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();

        set_cursor(&pool, "github", first).await.unwrap();
        assert_eq!(get_cursor(&pool, "github").await.unwrap(), Some(first));

        set_cursor(&pool, "github", second).await.unwrap();
        assert_eq!(get_cursor(&pool, "github").await.unwrap(), Some(second));
        assert_eq!(get_cursor(&pool, "other").await.unwrap(), None);
    }
}
