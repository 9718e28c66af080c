use crate::error::DbResult;
use crate::models::{ScoreRaw, format_ts};
use chrono::{DateTime, Utc};
use guildmerit_core::Score;
use sqlx::{Any, Pool};

/// Insert or replace scores keyed by user and period
pub async fn upsert_scores(pool: &Pool<Any>, scores: &[Score]) -> DbResult<()> {
    let now_str = format_ts(&Utc::now());
    let mut tx = pool.begin().await?;

    for score in scores {
        sqlx::query(
            "INSERT INTO scores (github_user, period_start, period_end, points, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (github_user, period_start, period_end)
             DO UPDATE SET points = excluded.points, updated_at = excluded.updated_at",
        )
        .bind(&score.user)
        .bind(format_ts(&score.period_start))
        .bind(format_ts(&score.period_end))
        .bind(score.points)
        .bind(&now_str)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Scores stored for the period ending at `period_end`, by user
pub async fn list_scores_for_period(
    pool: &Pool<Any>,
    period_end: DateTime<Utc>,
) -> DbResult<Vec<Score>> {
    sqlx::query_as::<_, ScoreRaw>(
        "SELECT github_user, period_start, period_end, points
         FROM scores
         WHERE period_end = ?
         ORDER BY github_user ASC",
    )
    .bind(format_ts(&period_end))
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(Score::try_from)
    .collect()
}
