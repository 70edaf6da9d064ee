pub mod context;
pub mod intent;
pub mod router;
pub mod tools;

pub use context::{FlowContextManager, ManagerError};
pub use intent::{ClassifiedIntent, Intent, IntentClassifier, KeywordClassifier};
pub use router::{Redirect, RoutedAction, Router};
pub use tools::{
    AssignItemOutcome, AssignItemRequest, FlowProgress, FlowToolService, ItemCatalog,
    LineProgress, StaticItemCatalog, ToolError,
};
