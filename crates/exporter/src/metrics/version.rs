use prometheus::{IntGaugeVec, Opts, Registry};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Registry holding `prometheus_nginxlog_exporter_build_info{version}`,
/// served next to the namespace registries.
pub fn version_registry() -> prometheus::Result<Registry> {
    let registry = Registry::new();
    let build_info = IntGaugeVec::new(
        Opts::new(
            "prometheus_nginxlog_exporter_build_info",
            "A metric with a constant '1' value labeled by the exporter version",
        ),
        &["version"],
    )?;
    build_info.get_metric_with_label_values(&[VERSION])?.set(1);
    registry.register(Box::new(build_info))?;
    Ok(registry)
}
