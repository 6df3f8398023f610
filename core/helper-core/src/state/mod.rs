//! Session state: record types, the store, transitions and liveness.
//!
//! Hooks write session records through a [`StateStore`]; the daemon reads
//! them back through the same trait. The filesystem layout is described in
//! [`crate::storage`].

mod fs_store;
pub mod liveness;
mod store;
pub mod transition;
pub mod types;


pub use fs_store::FsStateStore;
pub use liveness::{LivenessProbe, ProcessProbe};
pub use store::{MemoryStateStore, ScannedSession, StateStore, UpdateOutcome};
pub use transition::{SessionEvent, Transition};
pub use types::{
    PendingItem, PendingRequest, PermissionChoice, Question, ResponseRecord, SessionRecord,
};
