use async_trait::async_trait;

use crate::{database::DatabasePool, error::ApiError, models::Session};

#[async_trait]
pub trait SessionRepository {
    async fn find_by_token(&self, token: &str) -> Result<Option<Session>, ApiError>;
}

pub struct SqlxSessionRepository {
    pool: DatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn find_by_token(&self, token: &str) -> Result<Option<Session>, ApiError> {
        let result = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, session_token, expires
            FROM sessions
            WHERE session_token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }
}
