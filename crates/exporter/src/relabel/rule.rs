use std::collections::HashSet;

use regex::Regex;
use thiserror::Error;

use crate::conf::RelabelConfig;

#[derive(Debug, Error)]
pub enum RelabelError {
    #[error("invalid regexp '{pattern}' for label '{label}': {source}")]
    InvalidRegex {
        label: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("value has {parts} parts, cannot take part {index}")]
    SplitOutOfRange { index: usize, parts: usize },

    #[error("configured label count {count} exceeds the maximum of {max}")]
    TooManyLabels { count: usize, max: usize },
}

/// A compiled rule mapping one parsed field into one label value.
#[derive(Debug, Clone)]
pub struct Relabeling {
    pub target_label: String,
    pub source_value: String,
    pub only_counter: bool,
    pub exclude: bool,
    whitelist: HashSet<String>,
    matches: Vec<(Regex, String)>,
    split: usize,
    separator: String,
}

impl Relabeling {
    pub fn from_config(cfg: &RelabelConfig) -> Result<Self, RelabelError> {
        let matches = cfg
            .matches
            .iter()
            .map(|m| {
                Regex::new(&m.regexp)
                    .map(|re| (re, m.replacement.clone()))
                    .map_err(|source| RelabelError::InvalidRegex {
                        label: cfg.target_label.clone(),
                        pattern: m.regexp.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let separator = if cfg.separator.is_empty() {
            " ".to_string()
        } else {
            cfg.separator.clone()
        };

        Ok(Self {
            target_label: cfg.target_label.clone(),
            source_value: cfg.from.clone(),
            only_counter: cfg.only_counter,
            exclude: cfg.exclude,
            whitelist: cfg.whitelist.iter().cloned().collect(),
            matches,
            split: cfg.split,
            separator,
        })
    }

    fn passthrough(target: &str, from: &str) -> Self {
        Self {
            target_label: target.to_string(),
            source_value: from.to_string(),
            only_counter: false,
            exclude: false,
            whitelist: HashSet::new(),
            matches: Vec::new(),
            split: 0,
            separator: " ".to_string(),
        }
    }

    /// Transform a raw field value into a label value.
    pub fn map(&self, value: &str) -> Result<String, RelabelError> {
        let mut value = value;

        // Too few parts is a failed transform, so the label keeps its
        // previous value rather than turning empty.
        if self.split > 0 {
            let parts: Vec<&str> = value.split(self.separator.as_str()).collect();
            value = parts
                .get(self.split - 1)
                .copied()
                .ok_or(RelabelError::SplitOutOfRange {
                    index: self.split,
                    parts: parts.len(),
                })?;
        }

        if !self.whitelist.is_empty() {
            if self.whitelist.contains(value) {
                return Ok(value.to_string());
            }
            return Ok("other".to_string());
        }

        if !self.matches.is_empty() {
            for (re, replacement) in &self.matches {
                if re.is_match(value) {
                    return Ok(re.replace_all(value, replacement.as_str()).into_owned());
                }
            }
            return Ok(String::new());
        }

        Ok(value.to_string())
    }
}

/// Rules every namespace gets after its custom ones.
pub fn default_relabelings() -> Vec<Relabeling> {
    let mut method = Relabeling::passthrough("method", "request");
    method.split = 1;
    vec![method, Relabeling::passthrough("status", "status")]
}

/// Keep the first rule for each target label.
pub fn unique(rules: Vec<Relabeling>) -> Vec<Relabeling> {
    let mut seen = HashSet::new();
    rules
        .into_iter()
        .filter(|r| seen.insert(r.target_label.clone()))
        .collect()
}

pub fn strip_excluded(rules: Vec<Relabeling>) -> Vec<Relabeling> {
    rules.into_iter().filter(|r| !r.exclude).collect()
}

/// The merged, deduplicated, exclusion-stripped rule list of a namespace.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Relabeling>,
    has_counter_only: bool,
}

impl RuleSet {
    pub fn compile(configs: &[RelabelConfig]) -> Result<Self, RelabelError> {
        let mut rules = configs
            .iter()
            .map(Relabeling::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        rules.extend(default_relabelings());

        let rules = strip_excluded(unique(rules));
        let has_counter_only = rules.iter().any(|r| r.only_counter);
        Ok(Self {
            rules,
            has_counter_only,
        })
    }

    pub fn rules(&self) -> &[Relabeling] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn has_counter_only(&self) -> bool {
        self.has_counter_only
    }

    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.target_label.as_str())
    }

    /// Label names for every metric except the request counter.
    pub fn counter_excluded_names(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(|r| !r.only_counter)
            .map(|r| r.target_label.as_str())
    }
}
