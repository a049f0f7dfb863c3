pub use super::model::{KnownField, LogFields, ParseError};

pub trait LogParser: Send + Sync {
    /// parse a raw access-log line into its named fields
    fn parse(&self, line: &str) -> Result<LogFields, ParseError>;
}
