use std::sync::Arc;

use prometheus::Registry;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::pipeline::{Pipeline, PipelineError};
use crate::conf::NamespaceConfig;
use crate::metrics::Collection;
use crate::parser::{self, LogParser, ParseError};
use crate::runtime::lifecycle::Lifecycle;
use crate::source::{self, Source, SourceError, SyslogServer};

#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("namespace {namespace}: invalid log format: {source}")]
    Parser {
        namespace: String,
        #[source]
        source: ParseError,
    },

    #[error("namespace {namespace}: cannot register metrics: {source}")]
    Metrics {
        namespace: String,
        #[source]
        source: prometheus::Error,
    },

    #[error("namespace {namespace}: {source}")]
    Source {
        namespace: String,
        #[source]
        source: SourceError,
    },

    #[error("namespace {namespace}: {source}")]
    Pipeline {
        namespace: String,
        #[source]
        source: PipelineError,
    },

    #[error("namespace {namespace}: pipeline task failed: {source}")]
    Task {
        namespace: String,
        #[source]
        source: JoinError,
    },
}

impl NamespaceError {
    /// Errors that stop the whole exporter rather than one namespace.
    pub fn is_process_fatal(&self) -> bool {
        match self {
            NamespaceError::Parser { .. } | NamespaceError::Metrics { .. } => true,
            NamespaceError::Source { source, .. } => source.is_acquisition(),
            NamespaceError::Pipeline { .. } | NamespaceError::Task { .. } => false,
        }
    }
}

/// One namespace: its parser and metric collection, and the pipelines
/// reading its sources.
pub struct NamespaceRunner {
    config: Arc<NamespaceConfig>,
    parser: Arc<dyn LogParser>,
    metrics: Collection,
}

impl NamespaceRunner {
    /// Build the parser and register the metrics of a compiled namespace.
    pub fn new(config: NamespaceConfig) -> Result<Self, NamespaceError> {
        let parser = parser::for_namespace(&config).map_err(|source| NamespaceError::Parser {
            namespace: config.name.clone(),
            source,
        })?;
        let metrics = Collection::new(&config).map_err(|source| NamespaceError::Metrics {
            namespace: config.name.clone(),
            source,
        })?;

        Ok(Self {
            config: Arc::new(config),
            parser,
            metrics,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn registry(&self) -> Registry {
        self.metrics.registry().clone()
    }

    pub fn metrics(&self) -> &Collection {
        &self.metrics
    }

    /// Open every file source and the syslog listener, if any.
    async fn acquire_sources(
        &self,
    ) -> Result<(Vec<Source>, Option<SyslogServer>), NamespaceError> {
        let source_err = |source| NamespaceError::Source {
            namespace: self.config.name.clone(),
            source,
        };

        let mut sources = Vec::new();
        for path in &self.config.source.files {
            sources.push(source::follow(path).await.map_err(source_err)?);
        }

        let mut server = None;
        if let Some(syslog) = &self.config.source.syslog {
            let (listener, tags) = SyslogServer::listen(syslog).await.map_err(source_err)?;
            sources.extend(tags);
            server = Some(listener);
        }
        Ok((sources, server))
    }

    /// Run one pipeline per source until all have ended.
    ///
    /// The first pipeline error cancels the others and becomes the result;
    /// later errors are logged. Process shutdown cancels every pipeline.
    /// The syslog listener, if any, is closed before this returns.
    pub async fn run(&self, lifecycle: &Lifecycle) -> Result<(), NamespaceError> {
        let (sources, server) = self.acquire_sources().await?;

        let Some(server) = server else {
            return self.run_sources(sources, lifecycle.token()).await;
        };

        // Shutdown waits until the listener is closed, whichever path closes it.
        let closed = CancellationToken::new();
        let closed_guard = closed.clone().drop_guard();
        lifecycle.register(format!("syslog {}", self.config.name), move || async move {
            closed.cancelled().await
        });

        let result = self.run_sources(sources, lifecycle.token()).await;
        server.close().await;
        drop(closed_guard);
        result
    }

    /// Drive `sources` to completion under a child of `stop`.
    pub async fn run_sources(
        &self,
        sources: Vec<Source>,
        stop: CancellationToken,
    ) -> Result<(), NamespaceError> {
        let mut errors = self.fan_in(sources, stop).await?.into_iter();
        let Some(first) = errors.next() else {
            return Ok(());
        };
        for err in errors {
            error!(namespace = %self.config.name, "additional pipeline failure: {}", err);
        }
        Err(first)
    }

    /// Spawn the pipelines and collect every failure in arrival order. The
    /// first failure cancels the remaining pipelines.
    async fn fan_in(
        &self,
        sources: Vec<Source>,
        stop: CancellationToken,
    ) -> Result<Vec<NamespaceError>, NamespaceError> {
        let namespace = self.config.name.clone();
        let pipeline_err = |source| NamespaceError::Pipeline {
            namespace: namespace.clone(),
            source,
        };

        let mut pipelines = Vec::with_capacity(sources.len());
        for source in sources {
            let pipeline = Pipeline::new(
                source.name.clone(),
                self.config.clone(),
                self.parser.clone(),
                self.metrics.clone(),
            )
            .map_err(pipeline_err)?;
            pipelines.push((pipeline, source));
        }

        let cancel = stop.child_token();
        let mut tasks = JoinSet::new();
        for (pipeline, source) in pipelines {
            info!(namespace = %namespace, source = %source.name, "Starting pipeline");
            tasks.spawn(pipeline.run(source.lines, cancel.clone()));
        }

        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => pipeline_err(e),
                Err(e) => NamespaceError::Task {
                    namespace: namespace.clone(),
                    source: e,
                },
            };
            cancel.cancel();
            errors.push(err);
        }
        Ok(errors)
    }
}
