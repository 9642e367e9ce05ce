//! Core domain types and shared logic for Shipwright.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Application install state machine
//! - Downstream deployment status and its effective-status projection
//! - Background task ids and heartbeat staleness
//! - GitOps providers, destinations and clone URLs
//! - Application slugs
//! - Release documents attached to midstream versions

pub mod config;
pub mod document;
pub mod error;
pub mod gitops;
pub mod install;
pub mod slug;
pub mod status;
pub mod task;

pub use document::ReleaseDocument;
pub use error::{Error, Result};
pub use gitops::{GitOpsDestination, GitOpsInfo, GitOpsProvider, ProviderType};
pub use install::{InstallEvent, InstallMode, InstallState};
pub use status::{DownstreamStatus, effective_status};
pub use task::{TaskId, TaskStatus};
