//! Domain model of the course progression engine: roadmap indexing, unlock
//! bookkeeping, navigation gating and the quiz attempt state machine.
//!
//! Everything here is synchronous and free of I/O.

#![forbid(unsafe_code)]

pub mod error;
pub mod gating;
pub mod index;
pub mod model;
pub mod progress;
pub mod quiz;
pub mod time;

pub use error::Error;
pub use index::GlobalIndex;
pub use progress::{ProgressSnapshot, ProgressState};
pub use time::Clock;
