//! User repository implementation
//!
//! Accounts are issued by the authentication collaborator; this repository only
//! reads them for ticket payloads and dispatch, and seeds them in tests.

use sqlx::PgPool;
use chrono::Utc;
use crate::models::user::{User, CreateUserRequest};
use crate::utils::errors::SchoolEventsError;

#[derive(Clone)]
#[derive(Debug)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new user
    pub async fn create(&self, request: CreateUserRequest) -> Result<User, SchoolEventsError> {
        let email = request.email.clone();
        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, name, email, role, created_at, updated_at
            "#
        )
        .bind(request.name)
        .bind(request.email)
        .bind(request.role)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db_error)) if db_error.is_unique_violation() => {
                Err(SchoolEventsError::InvalidInput(format!("Email {} is already in use", email)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find user by ID
    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, SchoolEventsError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, role, created_at, updated_at FROM users WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}
