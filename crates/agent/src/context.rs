use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use lineup_core::domain::cart::Cart;
use lineup_core::domain::context::{
    ContextUpdate, ConversationEntry, CurrentQuestion, FlowContext,
};
use lineup_core::errors::ContextError;
use lineup_db::{RepositoryError, SessionRepository};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Single authoritative mutator for per-session flow state.
///
/// Every read-then-write against one session's context and cart runs under
/// that session's exclusive async lock, so concurrent tool calls in the
/// same conversation cannot lose updates. Cross-session work shares
/// nothing and needs no coordination.
pub struct FlowContextManager<R> {
    repository: Arc<R>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<R> FlowContextManager<R>
where
    R: SessionRepository,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository, locks: Mutex::new(HashMap::new()) }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(session_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Run one locked mutation over the session's context and cart, then
    /// persist both. This is the funnel every mutator goes through.
    pub async fn with_session<F, T>(&self, session_id: &str, mutate: F) -> Result<T, ManagerError>
    where
        F: FnOnce(&mut FlowContext, &mut Cart) -> Result<T, ContextError>,
    {
        if session_id.trim().is_empty() {
            return Err(ContextError::missing_session_id().into());
        }

        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut context = match self.repository.load_context(session_id).await? {
            Some(context) => context,
            None => {
                debug!(session_id, "creating flow context");
                FlowContext::new(session_id)
            }
        };
        let mut cart = match self.repository.load_cart(session_id).await? {
            Some(cart) => cart,
            None => Cart::new(session_id),
        };

        let value = mutate(&mut context, &mut cart)?;

        self.repository.save_context(&context).await?;
        self.repository.save_cart(&cart).await?;
        self.repository.set_last_active_session(session_id).await?;
        Ok(value)
    }

    /// Total: returns the existing context or creates a blank one.
    pub async fn get_or_create(&self, session_id: &str) -> Result<FlowContext, ManagerError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        if let Some(context) = self.repository.load_context(session_id).await? {
            return Ok(context);
        }
        let context = FlowContext::new(session_id);
        self.repository.save_context(&context).await?;
        self.repository.set_last_active_session(session_id).await?;
        Ok(context)
    }

    /// Merge a partial update. A line-count change also re-aligns the cart
    /// so it never carries lines the context no longer has.
    pub async fn update(
        &self,
        session_id: &str,
        update: ContextUpdate,
    ) -> Result<FlowContext, ManagerError> {
        self.with_session(session_id, |context, cart| {
            let line_count_changed = update.line_count.is_some_and(|c| c != context.line_count);
            context.apply_update(update);
            if line_count_changed {
                cart.align_to_line_count(context.line_count);
            }
            Ok(context.clone())
        })
        .await
    }

    pub async fn set_resume_step(
        &self,
        session_id: &str,
        step: impl Into<String>,
    ) -> Result<(), ManagerError> {
        let step = step.into();
        self.with_session(session_id, |context, _cart| {
            context.resume_step = Some(step);
            context.refresh_derived_flags();
            Ok(())
        })
        .await
    }

    pub async fn clear_resume_step(&self, session_id: &str) -> Result<(), ManagerError> {
        self.with_session(session_id, |context, _cart| {
            context.clear_resume_step();
            Ok(())
        })
        .await
    }

    pub async fn clear_current_question(&self, session_id: &str) -> Result<(), ManagerError> {
        self.with_session(session_id, |context, _cart| {
            context.clear_current_question();
            Ok(())
        })
        .await
    }

    pub async fn set_current_question(
        &self,
        session_id: &str,
        question: CurrentQuestion,
    ) -> Result<(), ManagerError> {
        self.with_session(session_id, |context, _cart| {
            context.current_question = Some(question);
            context.refresh_derived_flags();
            Ok(())
        })
        .await
    }

    pub async fn update_last_intent(
        &self,
        session_id: &str,
        intent: impl Into<String>,
    ) -> Result<(), ManagerError> {
        let intent = intent.into();
        self.with_session(session_id, |context, _cart| {
            context.last_intent = Some(intent);
            context.refresh_derived_flags();
            Ok(())
        })
        .await
    }

    pub async fn add_conversation_history(
        &self,
        session_id: &str,
        intent: impl Into<String>,
        action: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<(), ManagerError> {
        let entry = ConversationEntry {
            intent: intent.into(),
            action: action.into(),
            timestamp: Utc::now(),
            data,
        };
        self.with_session(session_id, |context, _cart| {
            context.record_history(entry);
            Ok(())
        })
        .await
    }

    /// Deletes the session outright. Explicit "start over", distinct from
    /// cart expiry.
    pub async fn reset(&self, session_id: &str) -> Result<(), ManagerError> {
        if session_id.trim().is_empty() {
            return Err(ContextError::missing_session_id().into());
        }

        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;
        self.repository.delete_session(session_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lineup_core::domain::context::ContextUpdate;
    use lineup_core::errors::ContextError;
    use lineup_db::{InMemorySessionRepository, SessionRepository};

    use super::{FlowContextManager, ManagerError};

    fn manager() -> FlowContextManager<InMemorySessionRepository> {
        FlowContextManager::new(Arc::new(InMemorySessionRepository::default()))
    }

    #[tokio::test]
    async fn get_or_create_is_total_and_persists() {
        let manager = manager();
        let created = manager.get_or_create("s-1").await.expect("create");
        assert_eq!(created.line_count, 0);

        let reloaded = manager.get_or_create("s-1").await.expect("reload");
        assert_eq!(reloaded, created);
        assert_eq!(
            manager.repository().last_active_session().await.expect("pointer").as_deref(),
            Some("s-1")
        );
    }

    #[tokio::test]
    async fn update_without_a_session_id_is_invalid() {
        let manager = manager();
        let error = manager
            .update("  ", ContextUpdate::default())
            .await
            .expect_err("blank session id");
        assert!(matches!(error, ManagerError::Context(ContextError::InvalidArgument(_))));

        let error = manager.reset("").await.expect_err("blank session id");
        assert!(matches!(error, ManagerError::Context(ContextError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn line_count_update_realigns_the_cart() {
        let manager = manager();
        manager
            .update("s-1", ContextUpdate { line_count: Some(3), ..ContextUpdate::default() })
            .await
            .expect("grow");

        manager
            .with_session("s-1", |context, cart| {
                context.assign_plan(3, "plan-basic")?;
                cart.set_plan(
                    3,
                    lineup_core::domain::cart::CartItem {
                        id: "plan-basic".to_string(),
                        name: "Essentials".to_string(),
                        price: rust_decimal::Decimal::new(4_000, 2),
                    },
                );
                Ok(())
            })
            .await
            .expect("assign");

        let updated = manager
            .update("s-1", ContextUpdate { line_count: Some(1), ..ContextUpdate::default() })
            .await
            .expect("shrink");
        assert_eq!(updated.line_count, 1);

        let cart = manager.repository().load_cart("s-1").await.expect("load").expect("cart");
        assert!(cart.lines.is_empty(), "cart line 3 dropped with the shrink");
        assert_eq!(cart.total, rust_decimal::Decimal::ZERO);
    }

    #[tokio::test]
    async fn bookkeeping_mutators_funnel_through_the_locked_path() {
        let manager = manager();
        manager.set_resume_step("s-1", "choose_plan").await.expect("resume step");
        manager.update_last_intent("s-1", "add_plan").await.expect("intent");
        manager
            .set_current_question(
                "s-1",
                lineup_core::domain::context::CurrentQuestion {
                    question_type: "plan_choice".to_string(),
                    text: "Which plan for line 1?".to_string(),
                    expected_entities: vec!["plan_id".to_string()],
                    asked_at: chrono::Utc::now(),
                },
            )
            .await
            .expect("question");
        manager
            .add_conversation_history("s-1", "add_plan", "assigned", serde_json::json!({"line": 1}))
            .await
            .expect("history");

        let context = manager.get_or_create("s-1").await.expect("load");
        assert_eq!(context.resume_step.as_deref(), Some("choose_plan"));
        assert_eq!(context.last_intent.as_deref(), Some("add_plan"));
        assert_eq!(
            context.current_question.as_ref().map(|q| q.question_type.as_str()),
            Some("plan_choice")
        );
        assert_eq!(context.conversation_history.len(), 1);

        manager.clear_resume_step("s-1").await.expect("clear step");
        manager.clear_current_question("s-1").await.expect("clear question");
        let context = manager.get_or_create("s-1").await.expect("reload");
        assert!(context.resume_step.is_none());
        assert!(context.current_question.is_none());
    }

    #[tokio::test]
    async fn reset_deletes_the_session_entirely() {
        let manager = manager();
        manager
            .update("s-1", ContextUpdate { line_count: Some(2), ..ContextUpdate::default() })
            .await
            .expect("configure");

        manager.reset("s-1").await.expect("reset");

        let fresh = manager.get_or_create("s-1").await.expect("recreate");
        assert_eq!(fresh.line_count, 0, "reset does not leak old configuration");
    }

    #[tokio::test]
    async fn concurrent_mutations_on_one_session_do_not_lose_updates() {
        let manager = Arc::new(manager());
        manager
            .update("s-1", ContextUpdate { line_count: Some(1), ..ContextUpdate::default() })
            .await
            .expect("init");

        let tasks = (0..20)
            .map(|index| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .add_conversation_history(
                            "s-1",
                            format!("intent-{index}"),
                            "noop",
                            serde_json::Value::Null,
                        )
                        .await
                })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.expect("join").expect("history write");
        }

        let context = manager.get_or_create("s-1").await.expect("load");
        // 20 writes against a 10-entry bound: the bound holds and the last
        // writes were not lost to races.
        assert_eq!(context.conversation_history.len(), 10);
    }
}
