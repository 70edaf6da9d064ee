use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use lineup_core::domain::cart::Cart;
use lineup_core::domain::context::FlowContext;

use super::{RepositoryError, SessionRepository};

#[derive(Default)]
struct StoredSession {
    context: Option<FlowContext>,
    cart: Option<Cart>,
}

/// Non-durable store with the same semantics as the SQL repository,
/// including lazy cart expiry. Used by tests and the smoke flow.
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, StoredSession>>,
    last_active: RwLock<Option<String>>,
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn load_context(
        &self,
        session_id: &str,
    ) -> Result<Option<FlowContext>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).and_then(|stored| stored.context.clone()))
    }

    async fn save_context(&self, context: &FlowContext) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.entry(context.session_id.clone()).or_default().context = Some(context.clone());
        Ok(())
    }

    async fn load_cart(&self, session_id: &str) -> Result<Option<Cart>, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let Some(stored) = sessions.get_mut(session_id) else {
            return Ok(None);
        };
        if let Some(cart) = &stored.cart {
            if cart.is_expired(Utc::now()) {
                stored.cart = None;
                return Ok(None);
            }
        }
        Ok(stored.cart.clone())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&cart.session_id) {
            Some(stored) if stored.context.is_some() => {
                stored.cart = Some(cart.clone());
                Ok(())
            }
            _ => Err(RepositoryError::SessionNotFound(cart.session_id.clone())),
        }
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }

    async fn last_active_session(&self) -> Result<Option<String>, RepositoryError> {
        Ok(self.last_active.read().await.clone())
    }

    async fn set_last_active_session(&self, session_id: &str) -> Result<(), RepositoryError> {
        *self.last_active.write().await = Some(session_id.to_string());
        Ok(())
    }

    async fn sweep_expired_carts(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let mut swept = 0u64;
        for stored in sessions.values_mut() {
            if stored.cart.as_ref().is_some_and(|cart| cart.is_expired(now)) {
                stored.cart = None;
                swept += 1;
            }
        }

        let mut last_active = self.last_active.write().await;
        if let Some(session_id) = last_active.as_deref() {
            let alive = sessions.get(session_id).is_some_and(|stored| stored.context.is_some());
            if !alive {
                *last_active = None;
            }
        }

        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use lineup_core::domain::cart::Cart;
    use lineup_core::domain::context::FlowContext;

    use crate::repositories::{InMemorySessionRepository, RepositoryError, SessionRepository};

    #[tokio::test]
    async fn behaves_like_the_sql_store_for_the_basics() {
        let repo = InMemorySessionRepository::default();
        let context = FlowContext::new("s-1");
        repo.save_context(&context).await.expect("save");

        assert_eq!(repo.load_context("s-1").await.expect("load"), Some(context));

        repo.save_cart(&Cart::new("s-1")).await.expect("save cart");
        assert!(repo.load_cart("s-1").await.expect("load").is_some());

        repo.delete_session("s-1").await.expect("delete");
        assert!(repo.load_context("s-1").await.expect("load").is_none());
    }

    #[tokio::test]
    async fn cart_without_context_is_rejected() {
        let repo = InMemorySessionRepository::default();
        let error = repo.save_cart(&Cart::new("s-1")).await.expect_err("no context");
        assert!(matches!(error, RepositoryError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn expired_cart_disappears_on_read() {
        let repo = InMemorySessionRepository::default();
        repo.save_context(&FlowContext::new("s-1")).await.expect("save context");

        let mut cart = Cart::new("s-1");
        cart.expires_at = Utc::now() - Duration::seconds(1);
        repo.save_cart(&cart).await.expect("save cart");

        assert!(repo.load_cart("s-1").await.expect("load").is_none());
    }

    #[tokio::test]
    async fn sweep_reclaims_the_dangling_pointer() {
        let repo = InMemorySessionRepository::default();
        repo.set_last_active_session("s-gone").await.expect("set");
        repo.sweep_expired_carts(Utc::now()).await.expect("sweep");
        assert!(repo.last_active_session().await.expect("read").is_none());
    }
}
