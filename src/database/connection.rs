//! Database connection management

use sqlx::{Pool, Postgres};
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::utils::errors::SchoolEventsError;

pub type DatabasePool = Pool<Postgres>;

const IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_LIFETIME: Duration = Duration::from_secs(1800);

/// Tables the stores read and write; all created by the initial migration
static REQUIRED_TABLES: [&str; 4] = ["users", "events", "registrations", "scheduler_watermarks"];

/// Create the Postgres pool from the `database` settings section
pub async fn create_pool(config: &DatabaseConfig) -> Result<DatabasePool, SchoolEventsError> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .idle_timeout(Some(IDLE_TIMEOUT))
        .max_lifetime(Some(MAX_LIFETIME))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        "Database connection pool created"
    );
    Ok(pool)
}

/// Run database migrations
pub async fn run_migrations(pool: &DatabasePool) -> Result<(), SchoolEventsError> {
    tracing::info!("Running database migrations...");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Check that the database answers and carries the registration schema
pub async fn health_check(pool: &DatabasePool) -> Result<(), SchoolEventsError> {
    let missing: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT name FROM UNNEST($1::text[]) AS name
        WHERE to_regclass('public.' || name) IS NULL
        "#
    )
    .bind(&REQUIRED_TABLES[..])
    .fetch_all(pool)
    .await?;

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SchoolEventsError::ServiceUnavailable(format!(
            "Database schema incomplete, missing tables: {}",
            missing.join(", ")
        )))
    }
}
