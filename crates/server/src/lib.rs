//! HTTP API server for Shipwright.
//!
//! This crate provides the HTTP control plane:
//! - Application lifecycle and install state
//! - Midstream and downstream version sequencing
//! - Deploy bookkeeping and apply agent reports
//! - GitOps providers and destinations
//! - Registry credentials with encrypt-at-rest migration
//! - Background task heartbeats

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod registry;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use registry::{RegistryDetails, RegistryError, RegistryService};
pub use routes::create_router;
pub use state::AppState;
