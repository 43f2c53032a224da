pub mod offline_queue;
pub mod queue_model;

pub use offline_queue::OfflineQueue;
pub use queue_model::{
    paths, ActionTarget, AddIncomePayload, OfflineAction, OfflineActionKind,
};
