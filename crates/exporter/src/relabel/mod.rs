//! Relabel module — field-to-label transformation rules and the per-source label vector.

pub mod labels;
pub mod rule;

pub use labels::{LabelVector, MAX_LABELS};
pub use rule::{default_relabelings, RelabelError, Relabeling, RuleSet};
