use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::filter::filter_fields;
use crate::conf::NamespaceConfig;
use crate::metrics::{user_identity, Collection, UserTracker, PRUNE_INTERVAL};
use crate::parser::LogParser;
use crate::relabel::{LabelVector, RelabelError};
use crate::source::{LineStream, SourceError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source {source_name}: {error}")]
    Labels {
        source_name: String,
        #[source]
        error: RelabelError,
    },

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Drives one source: parse, filter, relabel, aggregate.
///
/// Owns its label vector and user tracker; only the metric collection is
/// shared with the namespace's other pipelines.
pub struct Pipeline {
    source_name: String,
    namespace: Arc<NamespaceConfig>,
    parser: Arc<dyn LogParser>,
    metrics: Collection,
    labels: LabelVector,
    users: Option<UserTracker>,
}

impl Pipeline {
    pub fn new(
        source_name: impl Into<String>,
        namespace: Arc<NamespaceConfig>,
        parser: Arc<dyn LogParser>,
        metrics: Collection,
    ) -> Result<Self, PipelineError> {
        let source_name = source_name.into();
        let labels = LabelVector::new(&namespace.ordered_label_values, &namespace.relabelings)
            .map_err(|error| PipelineError::Labels {
                source_name: source_name.clone(),
                error,
            })?;

        let interval = namespace.metrics.current_user_interval;
        let users = (interval > 0).then(|| UserTracker::new(Duration::from_secs(interval)));

        Ok(Self {
            source_name,
            namespace,
            parser,
            metrics,
            labels,
            users,
        })
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Process one raw line. Parse failures are counted and skipped.
    pub fn process_line(&mut self, line: &str, now: Instant) {
        if self.namespace.print_log {
            println!("{}", line);
        }

        let mut fields = match self.parser.parse(line) {
            Ok(fields) => fields,
            Err(e) => {
                error!(namespace = %self.namespace.name, "error while parsing line '{}': {}", line, e);
                self.metrics.parse_error();
                return;
            }
        };

        filter_fields(&mut fields, &self.namespace.metrics);
        self.labels.apply(&fields, &self.namespace.relabelings);
        self.metrics.record(&fields, &self.labels);

        if let Some(tracker) = self.users.as_mut() {
            if let Some(identity) = user_identity(&fields) {
                let count = tracker.observe(identity, now);
                self.metrics
                    .set_current_users(&self.labels.counter_excluded(), count);
            }
        }
    }

    /// Evict stale users and republish the gauge with the current labels.
    pub fn prune_users(&mut self, now: Instant) {
        let Some(tracker) = self.users.as_mut() else {
            return;
        };
        let evicted = tracker.prune(now);
        if evicted > 0 {
            debug!(source = %self.source_name, evicted, "pruned current users");
        }
        self.metrics
            .set_current_users(&self.labels.counter_excluded(), tracker.len());
    }

    fn tracking_users(&self) -> bool {
        self.users.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Consume `lines` until the source ends, fails, or `cancel` fires.
    pub async fn run(
        mut self,
        mut lines: LineStream,
        cancel: CancellationToken,
    ) -> Result<(), PipelineError> {
        let mut prune: Option<Interval> = None;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(source = %self.source_name, "pipeline cancelled");
                    return Ok(());
                }
                _ = next_tick(&mut prune) => {
                    self.prune_users(Instant::now());
                }
                item = lines.next() => match item {
                    Some(Ok(line)) => {
                        self.process_line(&line, Instant::now());
                        if prune.is_none() && self.tracking_users() {
                            let mut interval = interval_at(Instant::now() + PRUNE_INTERVAL, PRUNE_INTERVAL);
                            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                            prune = Some(interval);
                        }
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        debug!(source = %self.source_name, "source ended");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::RelabelConfig;
    use crate::parser::formats::TextParser;
    use crate::parser::{LogFields, ParseError};
    use crate::source::Source;
    use std::collections::BTreeMap;

    const FORMAT: &str = r#"$remote_addr "$request" $status $body_bytes_sent $request_time "$http_user_agent""#;

    fn namespace(configure: impl FnOnce(&mut NamespaceConfig)) -> Arc<NamespaceConfig> {
        let mut ns = NamespaceConfig {
            name: "nginx".to_string(),
            format: FORMAT.to_string(),
            ..Default::default()
        };
        configure(&mut ns);
        ns.compile().unwrap();
        Arc::new(ns)
    }

    fn pipeline(ns: &Arc<NamespaceConfig>) -> (Pipeline, Collection) {
        let parser: Arc<dyn LogParser> = Arc::new(TextParser::new(&ns.format).unwrap());
        let metrics = Collection::new(ns).unwrap();
        let pipeline = Pipeline::new("test.log", ns.clone(), parser, metrics.clone()).unwrap();
        (pipeline, metrics)
    }

    fn access_line(addr: &str, request: &str, status: u16, agent: &str) -> String {
        format!(r#"{} "{}" {} 512 0.045 "{}""#, addr, request, status, agent)
    }

    fn lines(items: Vec<Result<String, SourceError>>) -> LineStream {
        Source::new("test", tokio_stream::iter(items)).lines
    }

    // ── Per-line Processing ──────────────────────────────────────

    #[test]
    fn test_parse_error_counted_and_skipped() {
        let ns = namespace(|_| {});
        let (mut pipeline, metrics) = pipeline(&ns);

        pipeline.process_line("not an access log line", Instant::now());

        assert_eq!(metrics.parse_errors_total.get(), 1.0);
        let families = metrics.registry().gather();
        assert_eq!(families.len(), 1);
    }

    #[test]
    fn test_disabled_field_invisible_to_relabeling() {
        let ns = namespace(|ns| {
            ns.metrics.disable_response_seconds = true;
            ns.relabel_configs.push(RelabelConfig {
                target_label: "timing".to_string(),
                from: "request_time".to_string(),
                ..Default::default()
            });
        });
        let (mut pipeline, metrics) = pipeline(&ns);

        pipeline.process_line(&access_line("10.0.0.1", "GET / HTTP/1.1", 200, "curl"), Instant::now());

        assert_eq!(metrics.count_total.with_label_values(&["", "GET", "200"]).get(), 1.0);
        let summary = metrics
            .response_seconds
            .get_metric_with_label_values(&["", "GET", "200"])
            .unwrap();
        assert_eq!(summary.sample_count(), 0);
    }

    /// `key=value` pairs, so a line can omit any field.
    struct KeyValueParser;

    impl LogParser for KeyValueParser {
        fn parse(&self, line: &str) -> Result<LogFields, ParseError> {
            Ok(line
                .split_whitespace()
                .filter_map(|kv| kv.split_once('='))
                .collect())
        }
    }

    #[test]
    fn test_label_carry_forward_across_lines() {
        let ns = namespace(|ns| {
            ns.relabel_configs.push(RelabelConfig {
                target_label: "vhost".to_string(),
                from: "server_name".to_string(),
                ..Default::default()
            });
        });
        let metrics = Collection::new(&ns).unwrap();
        let mut pipeline =
            Pipeline::new("test.log", ns.clone(), Arc::new(KeyValueParser), metrics.clone()).unwrap();

        pipeline.process_line("server_name=a.example status=200", Instant::now());
        pipeline.process_line("status=404", Instant::now());

        assert_eq!(pipeline.labels.all(), vec!["a.example", "", "404"]);
        assert_eq!(metrics.count_total.with_label_values(&["a.example", "", "404"]).get(), 1.0);
    }

    #[test]
    fn test_too_many_labels_is_fatal_for_source() {
        let ns = namespace(|ns| {
            ns.labels = (0..127).map(|i| (format!("l{:03}", i), "v".to_string())).collect::<BTreeMap<_, _>>();
        });
        let parser: Arc<dyn LogParser> = Arc::new(TextParser::new(&ns.format).unwrap());
        let metrics = Collection::new(&ns).unwrap();

        let err = Pipeline::new("big.log", ns.clone(), parser, metrics.clone()).err().unwrap();
        assert!(matches!(
            err,
            PipelineError::Labels { error: RelabelError::TooManyLabels { count: 129, .. }, .. }
        ));
        assert!(err.to_string().contains("big.log"));

        let names: Vec<String> = metrics.registry().gather().iter().map(|f| f.get_name().to_string()).collect();
        assert_eq!(names, vec!["nginx_parse_errors_total"]);
    }

    // ── Current Users ────────────────────────────────────────────

    #[test]
    fn test_current_users_gauge_and_pruning() {
        let ns = namespace(|ns| ns.metrics.current_user_interval = 60);
        let (mut pipeline, metrics) = pipeline(&ns);
        let start = Instant::now();

        pipeline.process_line(&access_line("10.0.0.1", "GET / HTTP/1.1", 200, "curl"), start);
        pipeline.process_line(&access_line("10.0.0.2", "GET / HTTP/1.1", 200, "curl"), start);
        pipeline.process_line(&access_line("10.0.0.1", "GET / HTTP/1.1", 200, "curl"), start);

        let gauge = metrics.current_users.with_label_values(&["GET", "200"]);
        assert_eq!(gauge.get(), 2.0);

        pipeline.prune_users(start + Duration::from_secs(30));
        assert_eq!(gauge.get(), 2.0);

        pipeline.prune_users(start + Duration::from_secs(61));
        assert_eq!(gauge.get(), 0.0);
    }

    #[test]
    fn test_prune_republishes_with_current_labels() {
        let ns = namespace(|ns| ns.metrics.current_user_interval = 60);
        let (mut pipeline, metrics) = pipeline(&ns);
        let start = Instant::now();

        pipeline.process_line(&access_line("10.0.0.1", "GET / HTTP/1.1", 200, "curl"), start);
        pipeline.process_line(&access_line("10.0.0.1", "POST / HTTP/1.1", 201, "curl"), start);
        pipeline.prune_users(start + Duration::from_secs(120));

        assert_eq!(metrics.current_users.with_label_values(&["POST", "201"]).get(), 0.0);
        assert_eq!(metrics.current_users.with_label_values(&["GET", "200"]).get(), 1.0);
    }

    #[test]
    fn test_users_not_tracked_when_interval_zero() {
        let ns = namespace(|_| {});
        let (mut pipeline, _) = pipeline(&ns);
        pipeline.process_line(&access_line("10.0.0.1", "GET / HTTP/1.1", 200, "curl"), Instant::now());
        assert!(!pipeline.tracking_users());
    }

    // ── Driving Loop ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_run_end_to_end() {
        let ns = namespace(|_| {});
        let (pipeline, metrics) = pipeline(&ns);

        let input = lines(vec![Ok(access_line("10.0.0.1", "GET /api HTTP/1.1", 200, "curl"))]);
        pipeline.run(input, CancellationToken::new()).await.unwrap();

        assert_eq!(metrics.count_total.with_label_values(&["GET", "200"]).get(), 1.0);
        assert_eq!(metrics.response_bytes_total.with_label_values(&["GET", "200"]).get(), 512.0);

        let summary = metrics.response_seconds.get_metric_with_label_values(&["GET", "200"]).unwrap();
        assert!((summary.sample_sum() - 0.045).abs() < 1e-9);
        let hist = metrics.response_seconds_hist.with_label_values(&["GET", "200"]);
        assert_eq!(hist.get_sample_count(), 1);
    }

    #[tokio::test]
    async fn test_run_returns_source_error() {
        let ns = namespace(|_| {});
        let (pipeline, _) = pipeline(&ns);

        let input = lines(vec![Err(SourceError::Read {
            path: "test.log".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        })]);
        let err = pipeline.run(input, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Source(SourceError::Read { .. })));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let ns = namespace(|_| {});
        let (pipeline, _) = pipeline(&ns);
        let cancel = CancellationToken::new();

        let pending: LineStream = Box::pin(tokio_stream::pending());
        let handle = tokio::spawn(pipeline.run(pending, cancel.clone()));
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
