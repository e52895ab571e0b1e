//! The engine set shared by every task an orchestrator runs.

use std::sync::Arc;

use crate::config::Settings;
use crate::stages::{
    aligner_from_settings, Aligner, CommandSeparator, Composer, FfmpegComposer, SeparationEngine,
    SeparatorPool,
};
use crate::tools::{AudioTranscoder, FfmpegTranscoder};

/// Stage engines behind their traits.
///
/// Separation engines are pooled; the other engines are stateless and are
/// called from several tasks at once.
#[derive(Clone)]
pub struct StageEngines {
    pub separators: Arc<SeparatorPool>,
    pub aligner: Arc<dyn Aligner>,
    pub composer: Arc<dyn Composer>,
    pub transcoder: Arc<dyn AudioTranscoder>,
}

impl StageEngines {
    pub fn new(
        separators: SeparatorPool,
        aligner: Arc<dyn Aligner>,
        composer: Arc<dyn Composer>,
        transcoder: Arc<dyn AudioTranscoder>,
    ) -> Self {
        Self {
            separators: Arc::new(separators),
            aligner,
            composer,
            transcoder,
        }
    }

    /// Command-line engines configured from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let separation = settings.separation.clone();
        let separators = SeparatorPool::with_instances(separation.max_instances, move || {
            Box::new(CommandSeparator::from_settings(&separation)) as Box<dyn SeparationEngine>
        });

        Self {
            separators: Arc::new(separators),
            aligner: Arc::from(aligner_from_settings(&settings.alignment)),
            composer: Arc::new(FfmpegComposer::from_settings(&settings.composition)),
            transcoder: Arc::new(FfmpegTranscoder::new(&settings.composition.ffmpeg_path)),
        }
    }
}

impl std::fmt::Debug for StageEngines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageEngines")
            .field("separators", &self.separators)
            .field("aligner", &self.aligner.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_sized_from_settings() {
        let mut settings = Settings::default();
        settings.separation.max_instances = 3;

        let engines = StageEngines::from_settings(&settings);
        assert_eq!(engines.separators.size(), 3);
        assert_eq!(engines.separators.idle_count(), 3);
        assert_eq!(engines.aligner.name(), "forced");
    }
}
