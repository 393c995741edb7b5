//! Translation engine seam
//!
//! The document-translation algorithm itself is opaque to this crate. The task
//! runner hands each admitted task to a [`TranslationEngine`], which reports
//! progress through an [`EngineContext`] and returns the files it produced.
//!
//! ## Implementations
//!
//! - [`CliEngine`]: runs an external translator binary per task
//! - [`NoOpEngine`]: fails every task with `NotSupported`, used when no translator is available
//!
//! ## Usage
//!
//! ```no_run
//! use doctrans::config::EngineConfig;
//! use doctrans::engine::{CliEngine, NoOpEngine, TranslationEngine};
//! use std::sync::Arc;
//!
//! let engine: Arc<dyn TranslationEngine> = match CliEngine::from_config(&EngineConfig::default()) {
//!     Some(cli) => Arc::new(cli),
//!     None => Arc::new(NoOpEngine),
//! };
//! println!("using engine {}", engine.name());
//! ```

mod cli;
mod noop;
mod parser;
mod traits;

pub use cli::CliEngine;
pub use noop::NoOpEngine;
pub use parser::{StatusLine, parse_status_line};
pub use traits::{EngineContext, EngineProgress, TranslationEngine, TranslationJob};

use crate::config::EngineConfig;
use std::sync::Arc;

/// Pick the engine described by `config`, falling back to [`NoOpEngine`]
pub fn engine_from_config(config: &EngineConfig) -> Arc<dyn TranslationEngine> {
    match CliEngine::from_config(config) {
        Some(engine) => {
            tracing::info!(binary = %engine.binary_path().display(), "using external translator");
            Arc::new(engine)
        }
        None => {
            tracing::warn!(
                binary = %config.binary_name,
                "translator binary not found, tasks will fail until one is configured"
            );
            Arc::new(NoOpEngine)
        }
    }
}
