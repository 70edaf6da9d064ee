use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use lineup_core::domain::cart::Cart;
use lineup_core::domain::context::FlowContext;

pub mod memory;
pub mod session;

pub use memory::InMemorySessionRepository;
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("no session exists for `{0}`")]
    SessionNotFound(String),
}

/// Durable keyed store for per-session flow context and cart.
///
/// Carts expire lazily: a load after `expires_at` deletes the cart and
/// returns `None`. `sweep_expired_carts` is the optional periodic
/// counterpart; it also reclaims the last-active-session pointer when the
/// session it references no longer exists.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn load_context(&self, session_id: &str)
        -> Result<Option<FlowContext>, RepositoryError>;
    async fn save_context(&self, context: &FlowContext) -> Result<(), RepositoryError>;
    async fn load_cart(&self, session_id: &str) -> Result<Option<Cart>, RepositoryError>;
    async fn save_cart(&self, cart: &Cart) -> Result<(), RepositoryError>;
    async fn delete_session(&self, session_id: &str) -> Result<(), RepositoryError>;
    async fn last_active_session(&self) -> Result<Option<String>, RepositoryError>;
    async fn set_last_active_session(&self, session_id: &str) -> Result<(), RepositoryError>;
    async fn sweep_expired_carts(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}
