//! Blockweave CLI Library
//!
//! Command implementations for the blockweave site generator CLI, plus the
//! HTTP content gateway the commands run against.
//!
//! # Modules
//!
//! - [`cmd`] - Command implementations (generate, regenerate, regenerate-block, check)
//! - [`openai`] - OpenAI-compatible content gateway
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use blockweave::cmd;
//!
//! // Validate configuration and the block catalog
//! cmd::check::run(Path::new("blockweave.toml"), false).unwrap();
//! ```

pub mod cmd;
pub mod openai;

// Re-export core types for convenience
pub use blockweave_core::{Config, SiteRecord};
pub use blockweave_generator::{GenerationOutput, Pipeline};

/// Initialize tracing with the specified verbosity level.
///
/// # Arguments
///
/// * `verbose` - Verbosity level (0 = WARN, 1 = INFO, 2 = DEBUG, 3+ = TRACE)
///
/// # Example
///
/// ```no_run
/// blockweave::init_tracing(2); // Enable DEBUG level logging
/// ```
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}
