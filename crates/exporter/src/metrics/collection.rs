use std::collections::HashMap;

use prometheus::{Counter, CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use tracing::{error, warn};

use super::extract::{byte_field, float_field, float_field_multi, ExtractError};
use super::summary::SummaryVec;
use crate::conf::NamespaceConfig;
use crate::parser::{KnownField, LogFields};
use crate::relabel::LabelVector;

/// The metrics of one namespace, registered in the namespace's own registry.
///
/// Shared by every pipeline of the namespace; all handles are internally
/// synchronized.
#[derive(Clone)]
pub struct Collection {
    registry: Registry,
    count_total_enabled: bool,

    pub parse_errors_total: Counter,
    pub count_total: CounterVec,
    pub response_bytes_total: CounterVec,
    pub request_bytes_total: CounterVec,
    pub upstream_seconds: SummaryVec,
    pub upstream_seconds_hist: HistogramVec,
    pub upstream_connect_seconds: SummaryVec,
    pub upstream_connect_seconds_hist: HistogramVec,
    pub response_seconds: SummaryVec,
    pub response_seconds_hist: HistogramVec,
    pub current_users: GaugeVec,
}

impl Collection {
    /// Build and register the metrics for a compiled namespace.
    pub fn new(ns: &NamespaceConfig) -> prometheus::Result<Self> {
        let registry = Registry::new();
        let prefix = ns.namespace_prefix.as_str();
        let const_labels: HashMap<String, String> = ns
            .namespace_labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let opts = |name: &str, help: &str| {
            Opts::new(name, help)
                .namespace(prefix)
                .const_labels(const_labels.clone())
        };
        let hist_opts = |name: &str, help: &str| {
            HistogramOpts::from(opts(name, help)).buckets(ns.histogram_buckets.clone())
        };

        let mut all_labels: Vec<&str> = ns.ordered_label_names.iter().map(String::as_str).collect();
        let mut labels = all_labels.clone();
        all_labels.extend(ns.relabelings.label_names());
        labels.extend(ns.relabelings.counter_excluded_names());

        let parse_errors_total = Counter::with_opts(opts(
            "parse_errors_total",
            "Total number of log file lines that could not be parsed",
        ))?;
        let count_total = CounterVec::new(
            opts("http_response_count_total", "Amount of processed HTTP requests"),
            &all_labels,
        )?;
        let response_bytes_total = CounterVec::new(
            opts("http_response_size_bytes", "Total amount of transferred bytes"),
            &labels,
        )?;
        let request_bytes_total = CounterVec::new(
            opts("http_request_size_bytes", "Total amount of received bytes"),
            &labels,
        )?;
        let upstream_seconds = SummaryVec::new(
            opts("http_upstream_time_seconds", "Time needed by upstream servers to handle requests"),
            &labels,
        )?;
        let upstream_seconds_hist = HistogramVec::new(
            hist_opts(
                "http_upstream_time_seconds_hist",
                "Time needed by upstream servers to handle requests",
            ),
            &labels,
        )?;
        let upstream_connect_seconds = SummaryVec::new(
            opts(
                "http_upstream_connect_time_seconds",
                "Time needed to connect to upstream servers",
            ),
            &labels,
        )?;
        let upstream_connect_seconds_hist = HistogramVec::new(
            hist_opts(
                "http_upstream_connect_time_seconds_hist",
                "Time needed to connect to upstream servers",
            ),
            &labels,
        )?;
        let response_seconds = SummaryVec::new(
            opts("http_response_time_seconds", "Time needed by NGINX to handle requests"),
            &labels,
        )?;
        let response_seconds_hist = HistogramVec::new(
            hist_opts(
                "http_response_time_seconds_hist",
                "Time needed by NGINX to handle requests",
            ),
            &labels,
        )?;
        let current_users = GaugeVec::new(
            opts("http_current_users", "Number of distinct users seen in the configured interval"),
            &labels,
        )?;

        registry.register(Box::new(parse_errors_total.clone()))?;
        registry.register(Box::new(count_total.clone()))?;
        registry.register(Box::new(response_bytes_total.clone()))?;
        registry.register(Box::new(request_bytes_total.clone()))?;
        registry.register(Box::new(upstream_seconds.clone()))?;
        registry.register(Box::new(upstream_seconds_hist.clone()))?;
        registry.register(Box::new(upstream_connect_seconds.clone()))?;
        registry.register(Box::new(upstream_connect_seconds_hist.clone()))?;
        registry.register(Box::new(response_seconds.clone()))?;
        registry.register(Box::new(response_seconds_hist.clone()))?;
        registry.register(Box::new(current_users.clone()))?;

        Ok(Self {
            registry,
            count_total_enabled: !ns.metrics.disable_count_total,
            parse_errors_total,
            count_total,
            response_bytes_total,
            request_bytes_total,
            upstream_seconds,
            upstream_seconds_hist,
            upstream_connect_seconds,
            upstream_connect_seconds_hist,
            response_seconds,
            response_seconds_hist,
            current_users,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn parse_error(&self) {
        self.parse_errors_total.inc();
    }

    /// Aggregate one parsed, filtered and relabeled line.
    ///
    /// A numeric field that fails to parse skips only its own metrics and
    /// counts as a parse error.
    pub fn record(&self, fields: &LogFields, labels: &LabelVector) {
        let all = labels.all();
        let scoped = labels.counter_excluded();

        if self.count_total_enabled {
            if let Some(counter) = handle(self.count_total.get_metric_with_label_values(&all)) {
                counter.inc();
            }
        }

        if let Some(v) = self.extract(fields, KnownField::BodyBytesSent, byte_field) {
            if let Some(counter) = handle(self.response_bytes_total.get_metric_with_label_values(&scoped)) {
                counter.inc_by(v);
            }
        }

        if let Some(v) = self.extract(fields, KnownField::RequestLength, byte_field) {
            if let Some(counter) = handle(self.request_bytes_total.get_metric_with_label_values(&scoped)) {
                counter.inc_by(v);
            }
        }

        if let Some(v) = self.extract(fields, KnownField::UpstreamResponseTime, float_field_multi) {
            self.observe(&self.upstream_seconds, &self.upstream_seconds_hist, &scoped, v);
        }

        if let Some(v) = self.extract(fields, KnownField::UpstreamConnectTime, float_field_multi) {
            self.observe(
                &self.upstream_connect_seconds,
                &self.upstream_connect_seconds_hist,
                &scoped,
                v,
            );
        }

        if let Some(v) = self.extract(fields, KnownField::RequestTime, float_field) {
            self.observe(&self.response_seconds, &self.response_seconds_hist, &scoped, v);
        }
    }

    pub fn set_current_users(&self, labels: &[&str], users: usize) {
        if let Some(gauge) = handle(self.current_users.get_metric_with_label_values(labels)) {
            gauge.set(users as f64);
        }
    }

    fn extract(
        &self,
        fields: &LogFields,
        field: KnownField,
        extractor: fn(&LogFields, KnownField) -> Result<Option<f64>, ExtractError>,
    ) -> Option<f64> {
        match extractor(fields, field) {
            Ok(value) => value,
            Err(e) => {
                error!("error while parsing ${}: {}", field.as_str(), e);
                self.parse_errors_total.inc();
                None
            }
        }
    }

    fn observe(&self, summary: &SummaryVec, hist: &HistogramVec, labels: &[&str], value: f64) {
        if let Some(s) = handle(summary.get_metric_with_label_values(labels)) {
            s.observe(value);
        }
        if let Some(h) = handle(hist.get_metric_with_label_values(labels)) {
            h.observe(value);
        }
    }
}

fn handle<T>(result: prometheus::Result<T>) -> Option<T> {
    match result {
        Ok(metric) => Some(metric),
        Err(e) => {
            warn!("skipping metric update: {}", e);
            None
        }
    }
}
