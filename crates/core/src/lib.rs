pub mod assignment;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gate;
pub mod normalize;

pub use assignment::{resolve_line_assignment, ItemKind, LineAssignment, NO_DEVICE_FOR_PROTECTION};
pub use domain::cart::{Cart, CartItem, CartLine, CartSim};
pub use domain::context::{
    ContextUpdate, ConversationEntry, CurrentQuestion, FlowContext, Line, SimType,
};
pub use domain::purchase::{
    CheckoutPayload, PurchaseResult, PurchaseState, PurchaseTransaction, QuoteSummary,
    ShippingAddress,
};
pub use errors::ContextError;
pub use gate::{check_prerequisites, FlowAction, GateCode, GateDecision};
