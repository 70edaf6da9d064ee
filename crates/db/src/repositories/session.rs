use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::debug;

use lineup_core::domain::cart::Cart;
use lineup_core::domain::context::FlowContext;

use super::{RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn clear_cart(&self, session_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE flow_session SET cart_json = NULL WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn encode_context(context: &FlowContext) -> Result<String, RepositoryError> {
    serde_json::to_string(context).map_err(|e| RepositoryError::Encode(e.to_string()))
}

fn decode_context(raw: &str) -> Result<FlowContext, RepositoryError> {
    serde_json::from_str(raw).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn encode_cart(cart: &Cart) -> Result<String, RepositoryError> {
    serde_json::to_string(cart).map_err(|e| RepositoryError::Encode(e.to_string()))
}

fn decode_cart(raw: &str) -> Result<Cart, RepositoryError> {
    serde_json::from_str(raw).map_err(|e| RepositoryError::Decode(e.to_string()))
}

#[async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn load_context(
        &self,
        session_id: &str,
    ) -> Result<Option<FlowContext>, RepositoryError> {
        let row = sqlx::query("SELECT context_json FROM flow_session WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String =
                    row.try_get("context_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok(Some(decode_context(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn save_context(&self, context: &FlowContext) -> Result<(), RepositoryError> {
        let context_json = encode_context(context)?;
        let updated_at = context.last_updated.to_rfc3339();

        sqlx::query(
            "INSERT INTO flow_session (session_id, context_json, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
                 context_json = excluded.context_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&context.session_id)
        .bind(&context_json)
        .bind(&updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_cart(&self, session_id: &str) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query("SELECT cart_json FROM flow_session WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: Option<String> =
            row.try_get("cart_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let cart = decode_cart(&raw)?;
        if cart.is_expired(Utc::now()) {
            debug!(session_id, "cart expired on read, deleting");
            self.clear_cart(session_id).await?;
            return Ok(None);
        }
        Ok(Some(cart))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), RepositoryError> {
        let cart_json = encode_cart(cart)?;
        let result = sqlx::query(
            "UPDATE flow_session SET cart_json = ?, updated_at = ? WHERE session_id = ?",
        )
        .bind(&cart_json)
        .bind(Utc::now().to_rfc3339())
        .bind(&cart.session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::SessionNotFound(cart.session_id.clone()));
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM flow_session WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn last_active_session(&self) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT session_id FROM last_active_session WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let session_id: String =
                    row.try_get("session_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok(Some(session_id))
            }
            None => Ok(None),
        }
    }

    async fn set_last_active_session(&self, session_id: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO last_active_session (id, session_id, updated_at)
             VALUES (1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 session_id = excluded.session_id,
                 updated_at = excluded.updated_at",
        )
        .bind(session_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sweep_expired_carts(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let rows = sqlx::query(
            "SELECT session_id, cart_json FROM flow_session WHERE cart_json IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut swept = 0u64;
        for row in rows {
            let session_id: String =
                row.try_get("session_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let raw: String =
                row.try_get("cart_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let expired = match decode_cart(&raw) {
                Ok(cart) => cart.is_expired(now),
                // An undecodable cart is unusable; reclaim it too.
                Err(_) => true,
            };
            if expired {
                self.clear_cart(&session_id).await?;
                swept += 1;
            }
        }

        // Reclaim the last-active pointer if its session row is gone.
        if let Some(last_active) = self.last_active_session().await? {
            if self.load_context(&last_active).await?.is_none() {
                sqlx::query("DELETE FROM last_active_session WHERE id = 1")
                    .execute(&self.pool)
                    .await?;
            }
        }

        Ok(swept)
    }
}
