//! Test database helper utilities
//!
//! Postgres tests run only when `TEST_DATABASE_URL` points at a disposable
//! database; otherwise they return early.

use sqlx::PgPool;
use SchoolEvents::{
    config::{DatabaseConfig, Settings},
    database::{create_pool, health_check, run_migrations, DatabaseService},
};

use super::test_context::init_tracing;

pub struct TestDatabase {
    pub pool: PgPool,
    pub service: DatabaseService,
}

impl TestDatabase {
    /// Connect, migrate and empty every table; `None` without `TEST_DATABASE_URL`
    pub async fn connect() -> Option<Self> {
        init_tracing();

        let url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("TEST_DATABASE_URL not set, skipping Postgres test");
                return None;
            }
        };

        let config = DatabaseConfig {
            url,
            max_connections: 20,
            ..Settings::default().database
        };
        let pool = create_pool(&config).await.expect("Failed to connect to test database");
        run_migrations(&pool).await.expect("Failed to run migrations");
        health_check(&pool).await.expect("Test database schema incomplete");

        let database = Self {
            service: DatabaseService::new(pool.clone()),
            pool,
        };
        database.cleanup().await.expect("Failed to clean test database");
        Some(database)
    }

    pub async fn cleanup(&self) -> Result<(), sqlx::Error> {
        sqlx::query("TRUNCATE registrations, events, users, scheduler_watermarks RESTART IDENTITY CASCADE")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_records(&self, table: &str) -> Result<i64, sqlx::Error> {
        let query = format!("SELECT COUNT(*) FROM {}", table);
        let (count,): (i64,) = sqlx::query_as(&query).fetch_one(&self.pool).await?;
        Ok(count)
    }
}
