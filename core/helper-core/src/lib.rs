//! # helper-core
//!
//! Core library for Claude Helper: the session state store shared by the
//! hook binary (many short-lived writers) and the daemon (one long-lived
//! reader that relays human decisions back).
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. Hooks run for milliseconds; the only
//!   long wait is a bounded polling loop.
//! - **Filesystem as the channel**: Processes never talk directly. Every
//!   record is replaced atomically; guarded transitions are compare-and-set.
//! - **Benign races are not errors**: A session that vanished mid-flight is
//!   an `Ok` no-op outcome.
//! - **Injectable seams**: [`StateStore`], [`LivenessProbe`] and [`Clock`]
//!   have in-memory or closure-based doubles for tests.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use helper_core::{Aggregator, FsStateStore, ProcessProbe, StorageConfig};
//!
//! let store = FsStateStore::new(StorageConfig::from_env()?);
//! let snapshot = Aggregator::new(&store, &ProcessProbe).poll()?;
//! println!("{}", snapshot.state);
//! ```

mod atomic;

pub mod aggregate;
pub mod config;
pub mod describe;
pub mod error;
pub mod handlers;
pub mod request;
pub mod respond;
pub mod state;
pub mod storage;
pub mod types;

pub use aggregate::{AggregateState, Aggregator, SessionView, Snapshot};
pub use config::{ElicitationMode, HelperConfig};
pub use error::{HelperError, Result};
pub use handlers::{SessionOrigin, apply_event, cleanup_questions, end_session, start_session};
pub use request::{BlockingRequest, CancelFlag, Clock, RequestResult, SystemClock, WaitPolicy};
pub use respond::{answer_question, respond_permission};
pub use state::{
    FsStateStore, LivenessProbe, MemoryStateStore, PendingItem, PendingRequest, PermissionChoice,
    ProcessProbe, Question, ResponseRecord, ScannedSession, SessionEvent, SessionRecord,
    StateStore, UpdateOutcome,
};
pub use storage::StorageConfig;
pub use types::*;
