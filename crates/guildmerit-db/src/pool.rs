use crate::error::DbResult;
use sqlx::{Any, Pool, any::AnyPoolOptions};

/// Create a database pool from a connection string
///
/// In-memory SQLite databases are per connection, so callers should pass
/// `max_connections = 1` for `sqlite::memory:`.
pub async fn create_pool(database_url: &str, max_connections: u32) -> DbResult<Pool<Any>> {
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Create every table the store needs; safe to run on each start
pub async fn run_migrations(pool: &Pool<Any>) -> DbResult<()> {
    sqlx::raw_sql(include_str!("../migrations/001_initial.sql"))
        .execute(pool)
        .await?;

    Ok(())
}

/// In-memory database with the schema applied
#[cfg(test)]
pub(crate) async fn setup_test_db() -> Pool<Any> {
    let pool = create_pool("sqlite::memory:", 1)
        .await
        .expect("Failed to create test database pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_pool_sqlite() {
        let pool = create_pool("sqlite::memory:", 1)
            .await
            .expect("Failed to create pool");

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .expect("Failed to execute query");
    }

    #[tokio::test]
    async fn test_run_migrations_is_repeatable() {
        let pool = create_pool("sqlite::memory:", 1)
            .await
            .expect("Failed to create pool");

        run_migrations(&pool).await.expect("First migration failed");
        run_migrations(&pool).await.expect("Second migration failed");

        sqlx::query("SELECT COUNT(*) FROM contribution_events")
            .execute(&pool)
            .await
            .expect("Table missing after migration");
    }
}
