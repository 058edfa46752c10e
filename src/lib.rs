// Library exports for hosts and tests
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod resolvers;
pub mod source;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use engine::ReconciliationEngine;
pub use error::{ActivityError, ErrorCategory};
pub use types::{Activity, SyncSummary};
