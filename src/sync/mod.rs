pub mod sync_service;
pub mod write_locks;

pub use sync_service::{ReplayOutcome, SyncService};
pub use write_locks::WriteLocks;
