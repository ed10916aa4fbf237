//! pan-memory: In-memory drive backend for pan-core
//!
//! [`MemoryStore`] implements both collaborator traits of pan-core over
//! per-space trees held in memory. It is used to exercise the engine end to
//! end without a network, and exposes call counters and failure injection
//! for tests.

pub mod store;
pub mod transport;

pub use store::{MemoryStore, StoreStats};
