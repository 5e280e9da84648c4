//! # Policy Acknowledgments
//!
//! Tracks how far each employee got with each company policy.
//!
//! ## Model
//!
//! - One record per (policy, user) pair, created lazily on the first tracked event
//! - Two monotonic flags: **viewed** and **downloaded**
//! - Percentage is derived from the flags only
//!
//! | viewed | downloaded | percentage |
//! |--------|------------|------------|
//! | no     | no         | 0          |
//! | yes    | no         | 50         |
//! | no     | yes        | 50         |
//! | yes    | yes        | 100        |
//!
//! Downloading without viewing first still credits the view, so in practice a
//! download always lands on 100.
//!
//!
//!
//! ## Layout
//!
//! - [`record`]: the persisted record and what callers get back
//! - [`transitions`]: pure view/download transitions, no I/O
//! - [`stats`]: aggregation over a set of records
//! - [`store`]: storage trait plus an in-memory store
//! - [`database`]: Redis store and policy directory
//! - [`policy`]: policy existence checks and denormalized counters
//!
//!
//!
//! ## Consistency
//!
//! Each tracked event is one read-modify-write on one record. Concurrent events on the
//! same pair may lose an update (e.g. a counter increment). That is accepted: the next
//! event for the pair writes the full record again and percentage only ever moves up.
pub mod database;
pub mod error;
pub mod policy;
pub mod record;
pub mod stats;
pub mod store;
pub mod transitions;
pub mod utils;

pub use error::{StoreError, StoreResult};
pub use record::{AcknowledgmentRecord, AcknowledgmentState, ClientInfo, RecordKey, TrackingOutcome};
pub use stats::{PolicyAcknowledgmentStats, PolicyMetricsAggregator};
pub use store::{AcknowledgmentStore, MemoryStore};
