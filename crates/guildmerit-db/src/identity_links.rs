use crate::error::DbResult;
use crate::models::{IdentityLink, IdentityLinkRaw, format_ts};
use chrono::{DateTime, Utc};
use guildmerit_core::IdentityMapping;
use sqlx::{Any, Pool};

/// Create or update a link between a chat account and a code host account
///
/// Re-linking keeps the original `created_at`. Marking a link verified stamps
/// `verified_at`; marking it unverified clears it.
pub async fn link_identity(
    pool: &Pool<Any>,
    chat_user_id: &str,
    code_host_user: &str,
    verified: bool,
    now: DateTime<Utc>,
) -> DbResult<IdentityLink> {
    let now_str = format_ts(&now);
    let verified_at = verified.then(|| now_str.clone());

    sqlx::query(
        "INSERT INTO identity_links
             (discord_user_id, github_user, verified, verified_at, created_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (discord_user_id, github_user)
         DO UPDATE SET verified = excluded.verified, verified_at = excluded.verified_at",
    )
    .bind(chat_user_id)
    .bind(code_host_user)
    .bind(if verified { 1 } else { 0 })
    .bind(verified_at)
    .bind(&now_str)
    .execute(pool)
    .await?;

    let raw = sqlx::query_as::<_, IdentityLinkRaw>(
        "SELECT discord_user_id, github_user, verified, verified_at, created_at
         FROM identity_links
         WHERE discord_user_id = ? AND github_user = ?",
    )
    .bind(chat_user_id)
    .bind(code_host_user)
    .fetch_one(pool)
    .await?;

    IdentityLink::try_from(raw)
}

/// Every stored link, verified or not, by chat user id
pub async fn list_identity_links(pool: &Pool<Any>) -> DbResult<Vec<IdentityLink>> {
    sqlx::query_as::<_, IdentityLinkRaw>(
        "SELECT discord_user_id, github_user, verified, verified_at, created_at
         FROM identity_links
         ORDER BY discord_user_id ASC, github_user ASC",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(IdentityLink::try_from)
    .collect()
}

/// Verified links as identity mappings, by chat user id
pub async fn list_verified_identities(pool: &Pool<Any>) -> DbResult<Vec<IdentityMapping>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT discord_user_id, github_user
         FROM identity_links
         WHERE verified = 1
         ORDER BY discord_user_id ASC, github_user ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(chat_user_id, code_host_user)| IdentityMapping {
            chat_user_id,
            code_host_user,
        })
        .collect())
}
