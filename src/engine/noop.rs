//! No-op engine used when no translator is available

use super::traits::{EngineContext, TranslationEngine, TranslationJob};
use async_trait::async_trait;
use std::path::PathBuf;

/// Engine that refuses every job
///
/// Used when no translator binary is configured or found on PATH, so the service
/// still starts (uploads, cache management and task bookkeeping keep working) and
/// every submitted task fails with `Error::NotSupported`.
pub struct NoOpEngine;

#[async_trait]
impl TranslationEngine for NoOpEngine {
    async fn translate(
        &self,
        _job: TranslationJob,
        _ctx: EngineContext,
    ) -> crate::Result<Vec<PathBuf>> {
        Err(crate::Error::NotSupported(
            "translation requires an external translator binary. \
             Configure the engine command or ensure it is in PATH."
                .into(),
        ))
    }

    fn name(&self) -> &'static str {
        "noop"
    }

    fn is_available(&self) -> bool {
        false
    }
}
