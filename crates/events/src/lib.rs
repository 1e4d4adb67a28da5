//! Event-sourcing plumbing shared by the ledger crates.
//!
//! Group ledgers are rebuilt from their event stream; read models (balance views)
//! are projections over the same stream.

pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod projection;
pub mod runner;

pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::{execute, replay};
pub use projection::Projection;
pub use runner::{ProjectionCursor, ProjectionError, ProjectionRunner};
