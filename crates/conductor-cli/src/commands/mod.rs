//! CLI command implementations.

pub mod config;
pub mod registry;
pub mod run;

/// Render a library error with its recovery hint.
pub fn report(error: impl Into<conductor_core::Error>) -> anyhow::Error {
    anyhow::anyhow!(conductor_core::error::format_error_with_suggestion(&error.into()))
}
