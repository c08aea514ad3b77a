//! Application layer module
//!
//! This module orchestrates the domain logic: the sync use case itself
//! and the queue-or-inline dispatch in front of it.

pub mod dispatch;
pub mod sync_service;

pub use dispatch::{DispatchOutcome, build_sync_service, run_sync_now};
pub use sync_service::SyncService;
