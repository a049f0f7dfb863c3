//! Metrics module — per-namespace metric collection, sliding-window summaries, and user tracking.

pub mod collection;
pub mod extract;
pub mod summary;
pub mod users;
pub mod version;

pub use collection::Collection;
pub use summary::{SummaryMetric, SummaryVec};
pub use users::{user_identity, UserTracker, PRUNE_INTERVAL};
pub use version::{version_registry, VERSION};
