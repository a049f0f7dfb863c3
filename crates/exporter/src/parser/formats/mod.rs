/// Individual line format parsers

pub mod json;
pub mod text;

pub use json::JsonParser;
pub use text::TextParser;
