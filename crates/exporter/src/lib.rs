// Domain-driven module structure for the nginx log exporter.

// Core infrastructure
pub mod conf;
pub mod state;

// Log processing
pub mod parser;
pub mod relabel;
pub mod metrics;
pub mod source;

// Orchestration
pub mod service;
pub mod runtime;
