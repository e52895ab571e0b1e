//! Forced alignment of a known lyrics text against the vocal stem.

use std::fs;

use crate::config::AlignmentSettings;
use crate::stages::errors::{StageEnv, StageError, StageResult};
use crate::subtitles::read_srt_file;
use crate::tools::ToolCommand;

use super::language::{resolve_language, rewrite_task_language};
use super::{AlignRequest, Aligner, AlignmentOutcome};

/// Runs `{command} AUDIO TEXT CONFIG OUTPUT` (aeneas `execute_task`).
#[derive(Debug, Clone)]
pub struct ForcedAligner {
    command: Vec<String>,
    config_string: String,
    default_language: String,
    allowed_languages: Vec<String>,
}

impl ForcedAligner {
    pub fn from_settings(settings: &AlignmentSettings) -> Self {
        Self {
            command: settings.forced_command.clone(),
            config_string: settings.config_string.clone(),
            default_language: settings.default_language.clone(),
            allowed_languages: settings.allowed_languages.clone(),
        }
    }
}

impl Aligner for ForcedAligner {
    fn name(&self) -> &str {
        "forced"
    }

    fn needs_lyrics(&self) -> bool {
        true
    }

    fn align(&self, request: &AlignRequest, env: &StageEnv) -> StageResult<AlignmentOutcome> {
        let lyrics = request
            .lyrics
            .as_deref()
            .ok_or_else(|| StageError::alignment("forced alignment needs a lyrics file"))?;

        let text = fs::read_to_string(lyrics)
            .map_err(|e| StageError::from_io("reading lyrics", e, StageError::Alignment))?;
        if text.trim().is_empty() {
            return Err(StageError::alignment("lyrics file is empty"));
        }

        let language = resolve_language(
            request.language_hint.as_deref(),
            &text,
            &self.default_language,
            &self.allowed_languages,
        )?;
        env.logger.info(&format!("Lyrics language: {}", language));
        let config = rewrite_task_language(&self.config_string, &language);

        fs::create_dir_all(&request.work_dir)
            .map_err(|e| StageError::from_io("creating work directory", e, StageError::Alignment))?;
        let output = request.work_dir.join("sync_map.srt");

        let command = ToolCommand::from_argv(&self.command)
            .ok_or_else(|| StageError::alignment("no forced aligner command configured"))?
            .arg(&request.vocal)
            .arg(lyrics)
            .arg(&config)
            .arg(&output);
        env.runner()
            .run(&command)
            .map_err(|e| StageError::from_tool(e, StageError::Alignment))?;

        let events = read_srt_file(&output)
            .map_err(|e| StageError::alignment(format!("unreadable sync map: {}", e)))?;
        if events.is_empty() {
            return Err(StageError::alignment("aligner produced no subtitle events"));
        }

        Ok(AlignmentOutcome {
            events,
            language: Some(language),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::logging::{LogConfig, TaskLogger};
    use std::path::Path;
    use tempfile::tempdir;

    fn logger() -> TaskLogger {
        TaskLogger::detached(
            "forced-test",
            LogConfig {
                mirror_to_tracing: false,
                ..LogConfig::default()
            },
        )
    }

    /// Aligner whose "engine" is a shell script writing a fixed sync map.
    fn scripted(dir: &Path, srt: &str) -> ForcedAligner {
        let script = dir.join("fake_aeneas.sh");
        fs::write(
            &script,
            format!("#!/bin/sh\nprintf '%s' '{}' > \"$4\"\necho \"$3\"\n", srt),
        )
        .unwrap();
        let settings = AlignmentSettings {
            forced_command: vec!["sh".to_string(), script.to_string_lossy().to_string()],
            ..AlignmentSettings::default()
        };
        ForcedAligner::from_settings(&settings)
    }

    fn request(dir: &Path, lyrics: &str) -> AlignRequest {
        let lyrics_path = dir.join("lyrics.txt");
        fs::write(&lyrics_path, lyrics).unwrap();
        AlignRequest {
            vocal: dir.join("vocal.wav"),
            lyrics: Some(lyrics_path),
            language_hint: None,
            work_dir: dir.join("work"),
        }
    }

    #[test]
    fn parses_engine_sync_map() {
        let dir = tempdir().unwrap();
        let aligner = scripted(
            dir.path(),
            "1\n00:00:01,000 --> 00:00:02,000\nfirst line\n\n2\n00:00:02,000 --> 00:00:03,500\nsecond line\n",
        );
        let logger = logger();
        let cancel = CancelToken::new();
        let env = StageEnv::new(&logger, &cancel, None);

        let mut req = request(dir.path(), "first line\nsecond line");
        req.language_hint = Some("en".to_string());
        let outcome = aligner.align(&req, &env).unwrap();

        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.events[1].end_ms, 3500);
        assert_eq!(outcome.language.as_deref(), Some("eng"));
        // The engine received the config string as its third argument
        assert!(logger.get_tail().iter().any(|l| l.starts_with("task_language=eng")));
    }

    #[test]
    fn empty_sync_map_is_alignment_error() {
        let dir = tempdir().unwrap();
        let aligner = scripted(dir.path(), "");
        let logger = logger();
        let cancel = CancelToken::new();
        let env = StageEnv::new(&logger, &cancel, None);

        let mut req = request(dir.path(), "some words to align here");
        req.language_hint = Some("eng".to_string());
        let err = aligner.align(&req, &env).unwrap_err();
        assert!(matches!(err, StageError::Alignment(_)));
    }

    #[test]
    fn unsupported_language_never_runs_engine() {
        let dir = tempdir().unwrap();
        let settings = AlignmentSettings {
            forced_command: vec!["/nonexistent/aeneas".to_string()],
            ..AlignmentSettings::default()
        };
        let aligner = ForcedAligner::from_settings(&settings);
        let logger = logger();
        let cancel = CancelToken::new();
        let env = StageEnv::new(&logger, &cancel, None);

        let mut req = request(dir.path(), "quelques mots");
        req.language_hint = Some("fra".to_string());
        let err = aligner.align(&req, &env).unwrap_err();
        assert!(matches!(err, StageError::UnsupportedLanguage { .. }));
    }

    #[test]
    fn missing_lyrics_is_alignment_error() {
        let dir = tempdir().unwrap();
        let aligner = ForcedAligner::from_settings(&AlignmentSettings::default());
        let logger = logger();
        let cancel = CancelToken::new();
        let env = StageEnv::new(&logger, &cancel, None);

        let mut req = request(dir.path(), "x");
        req.lyrics = None;
        assert!(matches!(
            aligner.align(&req, &env).unwrap_err(),
            StageError::Alignment(_)
        ));
    }
}
