//! Ctxsync: Execution-Context Synchronization
//!
//! Keeps a stable program identity for host-scripted programs whose modules the host
//! destroys and recreates between init cycles. Tracks every module context of a program in
//! a chain, resolves why a module is initializing, attaches libraries to their owning
//! program and finds the chart a program is bound to.

pub mod api;
pub mod chain;
pub mod chart;
pub mod compat;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod limbo;
pub mod logging;
pub mod registry;
pub mod resolver;
pub mod sync;
pub mod threads;
pub mod types;

pub use api::ContextApi;
pub use context::{ExecutionContext, SharedContext};
pub use error::SyncError;
pub use registry::ContextRegistry;
pub use sync::ContextSync;
