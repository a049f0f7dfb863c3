use std::collections::BTreeMap;
use std::sync::Arc;

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder};

use crate::metrics::version_registry;

/// Everything the metrics endpoint exposes: the build-info registry plus one
/// registry per namespace.
pub struct ExporterState {
    registries: Vec<Registry>,
}

impl ExporterState {
    pub fn new(namespaces: impl IntoIterator<Item = Registry>) -> prometheus::Result<Self> {
        let mut registries = vec![version_registry()?];
        registries.extend(namespaces);
        Ok(Self { registries })
    }

    /// Gather every registry. Namespaces sharing a metric prefix produce
    /// families of the same name; those are merged into one family.
    pub fn gather(&self) -> Vec<MetricFamily> {
        let mut merged: BTreeMap<String, MetricFamily> = BTreeMap::new();

        for registry in &self.registries {
            for mut family in registry.gather() {
                match merged.get_mut(family.get_name()) {
                    Some(existing) => {
                        let metrics = family.take_metric();
                        existing.mut_metric().extend(metrics.into_iter());
                    }
                    None => {
                        merged.insert(family.get_name().to_string(), family);
                    }
                }
            }
        }
        merged.into_values().collect()
    }

    /// Render the text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedState = Arc<ExporterState>;
