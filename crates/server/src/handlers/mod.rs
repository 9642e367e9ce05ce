//! HTTP request handlers.

pub mod apps;
pub mod common;
pub mod gitops;
pub mod registry;
pub mod tasks;
pub mod versions;

pub use apps::*;
pub use common::*;
pub use gitops::*;
pub use registry::*;
pub use tasks::*;
pub use versions::*;
