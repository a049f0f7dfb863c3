use tracing::debug;

use super::rule::{RelabelError, RuleSet};
use crate::parser::LogFields;

/// Upper bound on static plus relabeled labels for one source.
pub const MAX_LABELS: usize = 128;

/// Label values for one source pipeline, updated in place per line.
///
/// The first segment holds the namespace's static label values and is
/// never written after construction. The second has one slot per
/// relabeling rule, in rule order.
#[derive(Debug, Clone)]
pub struct LabelVector {
    values: Vec<String>,
    offset: usize,
    counter_only: Vec<bool>,
    has_counter_only: bool,
}

impl LabelVector {
    pub fn new(static_values: &[String], rules: &RuleSet) -> Result<Self, RelabelError> {
        let count = static_values.len() + rules.len();
        if count > MAX_LABELS {
            return Err(RelabelError::TooManyLabels {
                count,
                max: MAX_LABELS,
            });
        }

        let mut values = Vec::with_capacity(count);
        values.extend_from_slice(static_values);
        values.resize(count, String::new());

        Ok(Self {
            values,
            offset: static_values.len(),
            counter_only: rules.rules().iter().map(|r| r.only_counter).collect(),
            has_counter_only: rules.has_counter_only(),
        })
    }

    /// Run every rule against the line's fields.
    ///
    /// A slot whose source field is missing, or whose transform fails,
    /// keeps the value from the previous line.
    pub fn apply(&mut self, fields: &LogFields, rules: &RuleSet) {
        for (i, rule) in rules.rules().iter().enumerate() {
            let Some(raw) = fields.get(&rule.source_value) else {
                continue;
            };
            match rule.map(raw) {
                Ok(mapped) => self.values[self.offset + i] = mapped,
                Err(e) => debug!(label = %rule.target_label, "relabeling skipped: {}", e),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values for the request counter.
    pub fn all(&self) -> Vec<&str> {
        self.values.iter().map(String::as_str).collect()
    }

    /// Values for every other labeled metric: the `only_counter` slots are
    /// dropped when the namespace has any.
    pub fn counter_excluded(&self) -> Vec<&str> {
        if !self.has_counter_only {
            return self.all();
        }
        self.values
            .iter()
            .enumerate()
            .filter(|(i, _)| *i < self.offset || !self.counter_only[*i - self.offset])
            .map(|(_, v)| v.as_str())
            .collect()
    }
}
