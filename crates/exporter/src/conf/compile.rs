//! Compile — one-time derivation of the read-only namespace state.

use std::collections::BTreeMap;

use tracing::{info, warn};

use super::load::ConfigError;
use super::model::{Config, NamespaceConfig};
use crate::relabel::RuleSet;

impl Config {
    pub fn compile(&mut self) -> Result<(), ConfigError> {
        for ns in &mut self.namespaces {
            ns.compile()?;
        }
        Ok(())
    }
}

impl NamespaceConfig {
    /// Derive ordered labels, namespace labels, the metric prefix and the
    /// relabeling rule set. Runs once before any pipeline starts.
    pub fn compile(&mut self) -> Result<(), ConfigError> {
        self.resolve_deprecations();
        self.resolve_globs()?;

        self.relabelings =
            RuleSet::compile(&self.relabel_configs).map_err(|source| ConfigError::Relabel {
                namespace: self.name.clone(),
                source,
            })?;

        self.namespace_labels = match &self.namespace_label {
            Some(label) if !label.is_empty() => {
                BTreeMap::from([(label.clone(), self.name.clone())])
            }
            _ => BTreeMap::new(),
        };

        self.order_labels();

        self.namespace_prefix = match &self.metrics_override {
            Some(over) => over.prefix.clone(),
            None => self.name.clone(),
        };
        Ok(())
    }

    /// Fold the deprecated `source_files` list into `source.files`.
    pub fn resolve_deprecations(&mut self) {
        if !self.source_files.is_empty() {
            warn!(
                namespace = %self.name,
                "you are using the 'source_files' configuration parameter; use 'source.files' instead"
            );
            self.source.files = std::mem::take(&mut self.source_files);
        }
    }

    /// Expand `*` patterns in file sources; plain paths are kept as-is.
    pub fn resolve_globs(&mut self) -> Result<(), ConfigError> {
        let mut resolved = Vec::with_capacity(self.source.files.len());

        for file in &self.source.files {
            if !file.contains('*') {
                resolved.push(file.clone());
                continue;
            }

            let paths = glob::glob(file).map_err(|source| ConfigError::Glob {
                pattern: file.clone(),
                source,
            })?;
            let matches: Vec<String> = paths
                .filter_map(Result::ok)
                .map(|p| p.to_string_lossy().into_owned())
                .collect();

            info!(namespace = %self.name, "Resolved glob {} to {:?}", file, matches);
            resolved.extend(matches);
        }

        self.source.files = resolved;
        Ok(())
    }

    /// Static label names and values, sorted by name.
    pub fn order_labels(&mut self) {
        let mut pairs: Vec<(&String, &String)> = self.labels.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        self.ordered_label_names = pairs.iter().map(|(k, _)| (*k).clone()).collect();
        self.ordered_label_values = pairs.iter().map(|(_, v)| (*v).clone()).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::model::{MetricsOverride, RelabelConfig, RelabelMatch};
    use pretty_assertions::assert_eq;

    fn namespace() -> NamespaceConfig {
        NamespaceConfig {
            name: "nginx".to_string(),
            ..Default::default()
        }
    }

    // ── Label Ordering ───────────────────────────────────────────

    #[test]
    fn test_order_labels_sorted_by_name() {
        let mut ns = namespace();
        ns.labels.insert("zone".to_string(), "eu".to_string());
        ns.labels.insert("app".to_string(), "shop".to_string());
        ns.labels.insert("env".to_string(), "prod".to_string());
        ns.compile().unwrap();

        assert_eq!(ns.ordered_label_names, vec!["app", "env", "zone"]);
        assert_eq!(ns.ordered_label_values, vec!["shop", "prod", "eu"]);
    }

    #[test]
    fn test_compile_is_deterministic_across_insertion_order() {
        let mut first = namespace();
        for (k, v) in [("b", "2"), ("a", "1"), ("c", "3")] {
            first.labels.insert(k.to_string(), v.to_string());
        }
        let mut second = namespace();
        for (k, v) in [("c", "3"), ("b", "2"), ("a", "1")] {
            second.labels.insert(k.to_string(), v.to_string());
        }

        first.compile().unwrap();
        second.compile().unwrap();
        let names_once = first.ordered_label_names.clone();
        first.compile().unwrap();

        assert_eq!(first.ordered_label_names, second.ordered_label_names);
        assert_eq!(first.ordered_label_values, second.ordered_label_values);
        assert_eq!(first.ordered_label_names, names_once);
    }

    // ── Prefix & Namespace Label ─────────────────────────────────

    #[test]
    fn test_prefix_defaults_to_name() {
        let mut ns = namespace();
        ns.compile().unwrap();
        assert_eq!(ns.namespace_prefix, "nginx");
        assert!(ns.namespace_labels.is_empty());
    }

    #[test]
    fn test_prefix_override_may_be_empty() {
        let mut ns = namespace();
        ns.metrics_override = Some(MetricsOverride { prefix: String::new() });
        ns.compile().unwrap();
        assert_eq!(ns.namespace_prefix, "");
    }

    #[test]
    fn test_namespace_label() {
        let mut ns = namespace();
        ns.namespace_label = Some("vhost".to_string());
        ns.compile().unwrap();
        assert_eq!(ns.namespace_labels.get("vhost").map(String::as_str), Some("nginx"));
    }

    // ── Sources ──────────────────────────────────────────────────

    #[test]
    fn test_resolve_deprecated_source_files() {
        let mut ns = namespace();
        ns.source_files = vec!["/var/log/a.log".to_string()];
        ns.compile().unwrap();
        assert_eq!(ns.source.files, vec!["/var/log/a.log"]);
        assert!(ns.source_files.is_empty());
    }

    #[test]
    fn test_resolve_globs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.log", "b.log", "c.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let mut ns = namespace();
        ns.source.files = vec![
            format!("{}/*.log", dir.path().display()),
            "/var/log/plain.log".to_string(),
        ];
        ns.compile().unwrap();

        assert_eq!(ns.source.files.len(), 3);
        assert!(ns.source.files[0].ends_with("a.log"));
        assert!(ns.source.files[1].ends_with("b.log"));
        assert_eq!(ns.source.files[2], "/var/log/plain.log");
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let mut ns = namespace();
        ns.source.files = vec!["/var/log/***/x.log".to_string()];
        assert!(matches!(ns.compile(), Err(ConfigError::Glob { .. })));
    }

    // ── Relabelings ──────────────────────────────────────────────

    #[test]
    fn test_compile_builds_rule_set_with_defaults() {
        let mut ns = namespace();
        ns.relabel_configs.push(RelabelConfig {
            target_label: "vhost".to_string(),
            from: "server_name".to_string(),
            ..Default::default()
        });
        ns.compile().unwrap();

        let names: Vec<&str> = ns.relabelings.label_names().collect();
        assert_eq!(names, vec!["vhost", "method", "status"]);
    }

    #[test]
    fn test_bad_relabel_regex_rejected() {
        let mut ns = namespace();
        ns.relabel_configs.push(RelabelConfig {
            target_label: "path".to_string(),
            from: "request".to_string(),
            matches: vec![RelabelMatch {
                regexp: "(unclosed".to_string(),
                replacement: String::new(),
            }],
            ..Default::default()
        });
        let err = ns.compile().unwrap_err();
        assert!(matches!(err, ConfigError::Relabel { .. }));
        assert!(err.to_string().contains("nginx"));
    }
}
