//! Source module — line sources feeding the pipelines: followed files and syslog tags.

pub mod file;
pub mod syslog;

use std::pin::Pin;

use thiserror::Error;
use tokio_stream::Stream;

pub use file::follow;
pub use syslog::SyslogServer;

/// Ordered raw lines of one source. The stream ends when the source is
/// closed; an `Err` item is terminal.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, SourceError>> + Send>>;

/// One file or one syslog tag of a namespace.
pub struct Source {
    pub name: String,
    pub lines: LineStream,
}

impl Source {
    pub fn new(
        name: impl Into<String>,
        lines: impl Stream<Item = Result<String, SourceError>> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            lines: Box::pin(lines),
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source").field("name", &self.name).finish()
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot bind syslog listener on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid syslog listen address '{0}', expected udp://host:port or tcp://host:port")]
    InvalidAddress(String),

    #[error("unknown syslog format '{0}', expected rfc3164, rfc5424 or automatic")]
    UnknownFormat(String),

    #[error("error reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    /// Failures raised while acquiring the source, before any line is read.
    pub fn is_acquisition(&self) -> bool {
        !matches!(self, SourceError::Read { .. })
    }
}
