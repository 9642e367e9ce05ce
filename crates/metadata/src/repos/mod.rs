//! Repository traits for metadata operations.

pub mod apps;
pub mod downstreams;
pub mod outputs;
pub mod registry;
pub mod tasks;
pub mod versions;

pub use apps::AppRepo;
pub use downstreams::DownstreamRepo;
pub use outputs::OutputRepo;
pub use registry::RegistryRepo;
pub use tasks::TaskStatusRepo;
pub use versions::{MAX_SEQUENCE_ATTEMPTS, VersionRepo};
