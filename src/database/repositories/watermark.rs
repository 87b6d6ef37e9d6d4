//! Scheduler watermark repository
//!
//! Remembers where each sweep last finished so a restarted worker widens its
//! lookback over the downtime instead of skipping it.

use sqlx::PgPool;
use chrono::{DateTime, Utc};
use crate::utils::errors::SchoolEventsError;

#[derive(Debug, Clone)]
pub struct WatermarkRepository {
    pool: PgPool,
}

impl WatermarkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn load(&self, job_name: &str) -> Result<Option<DateTime<Utc>>, SchoolEventsError> {
        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            "SELECT last_run_at FROM scheduler_watermarks WHERE job_name = $1"
        )
        .bind(job_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(at,)| at))
    }

    /// Store the watermark; never moves it backwards
    pub async fn save(&self, job_name: &str, at: DateTime<Utc>) -> Result<(), SchoolEventsError> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_watermarks (job_name, last_run_at)
            VALUES ($1, $2)
            ON CONFLICT (job_name)
            DO UPDATE SET last_run_at = GREATEST(scheduler_watermarks.last_run_at, EXCLUDED.last_run_at)
            "#
        )
        .bind(job_name)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
