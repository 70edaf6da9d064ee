pub mod auth;
pub mod catalog;
pub mod client;
pub mod errors;
pub mod orchestrator;
pub mod types;

pub use auth::{
    AccessToken, CachedTokenProvider, HttpTokenFetcher, StaticTokenProvider, TokenFetcher,
    TokenProvider,
};
pub use catalog::{PlanCatalog, StaticPlanCatalog};
pub use client::{CarrierApi, HttpCarrierClient};
pub use errors::{AuthError, CheckoutError, FieldViolation, FlowError};
pub use orchestrator::{CheckoutOptions, PurchaseOrchestrator};
pub use types::{
    AddressPayload, LineItemPayload, PurchaseResponse, QuoteResponse, StatusResponse,
    TransactionRequest,
};
