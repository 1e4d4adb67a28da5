//! Application layer: per-group command execution and settle-up queries.
//!
//! `GroupService` is the single writer for every group ledger it owns. Commands
//! run `handle` then `apply` under the group's write lock; queries read a
//! consistent snapshot under the read lock.

pub mod config;
pub mod error;
pub mod scenario;
pub mod service;

pub use config::{ConfigError, EngineConfig};
pub use error::EngineError;
pub use scenario::{Report, Scenario};
pub use service::GroupService;
