// src/db/token_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    common::db_utils::is_foreign_key_violation,
    services::tokens::{StoreError, TokenRecord, TokenStore},
};

/// Controle de refresh tokens emitidos/revogados no Postgres.
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn classify(e: sqlx::Error) -> StoreError {
    if is_foreign_key_violation(&e) {
        StoreError::Integrity(e.to_string())
    } else {
        StoreError::Database(e)
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn record_outstanding(&self, record: &TokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO outstanding_tokens (jti, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(&record.jti)
        .bind(record.user_id)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn blacklist(&self, record: &TokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO blacklisted_tokens (jti, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(&record.jti)
        .bind(record.user_id)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM blacklisted_tokens WHERE jti = $1)")
                .bind(jti)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}
