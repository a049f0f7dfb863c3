//! Service module — per-source pipelines and the namespace runner that fans them in.

pub mod filter;
pub mod namespace;
pub mod pipeline;

pub use filter::filter_fields;
pub use namespace::{NamespaceError, NamespaceRunner};
pub use pipeline::{Pipeline, PipelineError};
