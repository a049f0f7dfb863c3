//! Conf module — configuration model, command-line flags, loading, and compilation.

pub mod compile;
pub mod flags;
pub mod load;
pub mod model;

pub use flags::{LogFormat, LogLevel, StartupFlags};
pub use load::ConfigError;
pub use model::{
    Config, ListenConfig, MetricsConfig, MetricsOverride, NamespaceConfig, ParserKind,
    RelabelConfig, RelabelMatch, SourceData, SyslogSource,
};
