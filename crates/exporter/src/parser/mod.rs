/// Access-log line parsing.
///
/// Converts one raw line into a [`LogFields`] mapping according to the
/// namespace's configured parser kind and format string.
///
/// # Architecture
///
/// - `traits.rs`: the `LogParser` contract consumed by source pipelines
/// - `model.rs`: `LogFields` (fixed slots for well-known fields + overflow) and `ParseError`
/// - `formats/`: the `text` (nginx `log_format` placeholders) and `json` parsers

pub mod traits;
pub mod model;
pub mod formats;

use std::sync::Arc;

use crate::conf::{NamespaceConfig, ParserKind};

pub use traits::LogParser;
pub use model::{KnownField, LogFields, ParseError};
pub use formats::{JsonParser, TextParser};

/// Build the parser a namespace's pipelines share.
pub fn for_namespace(ns: &NamespaceConfig) -> Result<Arc<dyn LogParser>, ParseError> {
    match ns.parser {
        ParserKind::Text => Ok(Arc::new(TextParser::new(&ns.format)?)),
        ParserKind::Json => Ok(Arc::new(JsonParser::new())),
    }
}
