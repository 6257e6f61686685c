//! Transfer-side building blocks shared by the sender and receiver engines.
//!
//! - [`ProgressCounter`] / [`ProgressTracker`]: shared byte counter and the
//!   periodic reporter that samples it.
//! - [`ZeroSource`] / [`DiscardSink`]: synthetic endpoints for load tests.
//! - [`CountingWriter`]: feeds every successful write into a counter.
//! - [`ReceiverStats`]: cumulative totals for a receiving server.

mod adapters;
mod counting;
mod format;
mod progress;
mod stats;
mod validation;

pub use adapters::{DiscardSink, ZeroSource};
pub use counting::CountingWriter;
pub use format::{format_with_commas, mib_per_sec};
pub use progress::{
    DEFAULT_INTERVAL, ProgressCallback, ProgressCounter, ProgressSnapshot, ProgressTracker,
};
pub use stats::ReceiverStats;
pub use validation::{InvalidName, validate_received_name};
