use std::collections::HashMap;

use async_trait::async_trait;

/// Read-only plan lookup. The purchase payload must carry the carrier
/// catalog's exact display name for each plan, so the orchestrator asks
/// this trait rather than trusting whatever label the conversation used.
#[async_trait]
pub trait PlanCatalog: Send + Sync {
    async fn plan_display_name(&self, plan_id: &str) -> Option<String>;
}

#[derive(Default)]
pub struct StaticPlanCatalog {
    names: HashMap<String, String>,
}

impl StaticPlanCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(mut self, plan_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(plan_id.into(), name.into());
        self
    }
}

#[async_trait]
impl PlanCatalog for StaticPlanCatalog {
    async fn plan_display_name(&self, plan_id: &str) -> Option<String> {
        self.names.get(plan_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::{PlanCatalog, StaticPlanCatalog};

    #[tokio::test]
    async fn known_plans_resolve_and_unknown_do_not() {
        let catalog = StaticPlanCatalog::new().with_plan("plan-unlimited", "Unlimited Plus (50GB)");

        assert_eq!(
            catalog.plan_display_name("plan-unlimited").await.as_deref(),
            Some("Unlimited Plus (50GB)")
        );
        assert!(catalog.plan_display_name("plan-mystery").await.is_none());
    }
}
