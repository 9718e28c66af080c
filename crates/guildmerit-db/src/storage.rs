use crate::{audit_events, cursors, events, identity_links, scores};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guildmerit_core::ports::Storage;
use guildmerit_core::{AdapterResult, AuditEvent, ContributionEvent, IdentityMapping, Score};
use sqlx::{Any, Pool};
use tracing::debug;

/// [`Storage`] backed by a sqlx pool
#[derive(Clone)]
pub struct SqlStorage {
    pool: Pool<Any>,
}

impl SqlStorage {
    pub fn new(pool: Pool<Any>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Any> {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqlStorage {
    async fn append(&self, events: &[ContributionEvent]) -> AdapterResult<usize> {
        let inserted = events::append_events(&self.pool, events).await?;
        debug!("Stored {} of {} events", inserted, events.len());
        Ok(inserted)
    }

    async fn query(&self, since: DateTime<Utc>) -> AdapterResult<Vec<ContributionEvent>> {
        Ok(events::list_events_since(&self.pool, since).await?)
    }

    async fn get_cursor(&self, source: &str) -> AdapterResult<Option<DateTime<Utc>>> {
        Ok(cursors::get_cursor(&self.pool, source).await?)
    }

    async fn set_cursor(&self, source: &str, at: DateTime<Utc>) -> AdapterResult<()> {
        Ok(cursors::set_cursor(&self.pool, source, at).await?)
    }

    async fn upsert_scores(&self, scores: &[Score]) -> AdapterResult<()> {
        Ok(scores::upsert_scores(&self.pool, scores).await?)
    }

    async fn list_verified_identities(&self) -> AdapterResult<Vec<IdentityMapping>> {
        Ok(identity_links::list_verified_identities(&self.pool).await?)
    }

    async fn append_audit_event(&self, event: &AuditEvent) -> AdapterResult<()> {
        Ok(audit_events::append_audit_event(&self.pool, event).await?)
    }
}
