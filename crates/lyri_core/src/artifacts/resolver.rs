//! Deterministic artifact paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::{ArtifactKind, Stage};

use super::fingerprint::BaseName;

/// Maps `(base, stage, kind)` to a path under the output cache.
///
/// The mapping is pure: it never touches the filesystem, and the same
/// inputs give the same path across restarts.
#[derive(Debug, Clone)]
pub struct ArtifactPathResolver {
    output_root: PathBuf,
    delivery_format: String,
}

impl ArtifactPathResolver {
    pub fn new(output_root: impl Into<PathBuf>, delivery_format: impl Into<String>) -> Self {
        let delivery_format = delivery_format
            .into()
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();
        Self {
            output_root: output_root.into(),
            delivery_format: if delivery_format.is_empty() {
                "mp3".to_string()
            } else {
                delivery_format
            },
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn delivery_format(&self) -> &str {
        &self.delivery_format
    }

    /// `{output_root}/{base}/{stage}/{kind}.{ext}`
    pub fn resolve(&self, base: &BaseName, stage: Stage, kind: ArtifactKind) -> PathBuf {
        self.stage_dir(base, stage)
            .join(format!("{}.{}", kind.as_str(), self.extension(stage, kind)))
    }

    /// Directory holding one stage's artifacts for a base.
    pub fn stage_dir(&self, base: &BaseName, stage: Stage) -> PathBuf {
        self.output_root.join(base.as_str()).join(stage.as_str())
    }

    /// Private working directory for one engine invocation.
    pub fn scratch_dir(&self, base: &BaseName, stage: Stage, token: &str) -> PathBuf {
        self.stage_dir(base, stage).join(format!(".scratch-{}", token))
    }

    /// File extension for a stage output.
    pub fn extension(&self, stage: Stage, kind: ArtifactKind) -> &str {
        match (stage, kind) {
            (Stage::Deliver, ArtifactKind::Audio)
            | (Stage::Deliver, ArtifactKind::Vocal)
            | (Stage::Deliver, ArtifactKind::Instrumental) => &self.delivery_format,
            (_, ArtifactKind::Subtitle) => "srt",
            (_, ArtifactKind::Video) => "mp4",
            (_, ArtifactKind::SilentBackground) => "mkv",
            _ => "wav",
        }
    }

    /// Existence-based cache check. A present, non-empty file is trusted.
    pub fn is_cached(path: &Path) -> bool {
        fs::metadata(path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }
}

/// Marker carried by every in-flight file name.
const PARTIAL_MARKER: &str = ".partial-";

/// Fresh sibling path a stage writes to before renaming into place.
///
/// Every call returns a new name, so two tasks producing the same
/// artifact never write into each other's file. The original extension
/// is kept last so tools that pick a muxer from the file name still
/// work: `video.mp4` becomes `video.partial-<token>.mp4`.
pub fn partial_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let token = uuid::Uuid::new_v4().simple().to_string();
    let name = match path.extension() {
        Some(ext) => format!("{}{}{}.{}", stem, PARTIAL_MARKER, token, ext.to_string_lossy()),
        None => format!("{}{}{}", stem, PARTIAL_MARKER, token),
    };
    path.with_file_name(name)
}

/// Whether a file name belongs to an unfinished write.
pub fn is_partial(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().contains(PARTIAL_MARKER))
        .unwrap_or(false)
}

/// Unfinished writes left directly inside `dir`.
#[cfg(test)]
pub(crate) fn partials_in(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| is_partial(p))
                .collect()
        })
        .unwrap_or_default()
}

/// Create the parent directory of `path`.
pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Move `partial` onto `target`, removing `partial` if the rename fails.
pub fn commit(partial: &Path, target: &Path) -> io::Result<()> {
    ensure_parent(target)?;
    if let Err(e) = fs::rename(partial, target) {
        let _ = fs::remove_file(partial);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn base() -> BaseName {
        BaseName::new("song", "00112233aabbccdd")
    }

    #[test]
    fn resolve_is_stable() {
        let resolver = ArtifactPathResolver::new("/cache", "mp3");
        let a = resolver.resolve(&base(), Stage::Separate, ArtifactKind::Vocal);
        let b = resolver.resolve(&base(), Stage::Separate, ArtifactKind::Vocal);
        assert_eq!(a, b);
        assert_eq!(
            a,
            PathBuf::from("/cache/song-00112233aabbccdd/separate/vocal.wav")
        );
    }

    #[test]
    fn extensions_follow_stage_and_kind() {
        let resolver = ArtifactPathResolver::new("/cache", ".MP3");
        let b = base();
        assert!(resolver
            .resolve(&b, Stage::Deliver, ArtifactKind::Vocal)
            .ends_with("deliver/vocal.mp3"));
        assert!(resolver
            .resolve(&b, Stage::Align, ArtifactKind::Subtitle)
            .ends_with("align/subtitle.srt"));
        assert!(resolver
            .resolve(&b, Stage::Compose, ArtifactKind::Video)
            .ends_with("compose/video.mp4"));
        assert!(resolver
            .resolve(&b, Stage::Prepare, ArtifactKind::PreparedAudio)
            .ends_with("prepare/prepared_audio.wav"));
    }

    #[test]
    fn distinct_kinds_never_collide() {
        let resolver = ArtifactPathResolver::new("/cache", "wav");
        let b = base();
        let vocal = resolver.resolve(&b, Stage::Deliver, ArtifactKind::Vocal);
        let instrumental = resolver.resolve(&b, Stage::Deliver, ArtifactKind::Instrumental);
        let audio = resolver.resolve(&b, Stage::Deliver, ArtifactKind::Audio);
        assert_ne!(vocal, instrumental);
        assert_ne!(vocal, audio);
    }

    #[test]
    fn partial_path_keeps_extension() {
        let partial = partial_path(Path::new("/x/video.mp4"));
        assert_eq!(partial.parent(), Some(Path::new("/x")));
        assert_eq!(partial.extension().and_then(|e| e.to_str()), Some("mp4"));
        assert!(is_partial(&partial));
        assert!(!is_partial(Path::new("/x/video.mp4")));
    }

    #[test]
    fn partial_paths_are_unique_per_call() {
        let target = Path::new("/x/align/subtitle.srt");
        assert_ne!(partial_path(target), partial_path(target));
    }

    #[test]
    fn cache_check_ignores_empty_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vocal.wav");
        assert!(!ArtifactPathResolver::is_cached(&path));
        fs::write(&path, b"").unwrap();
        assert!(!ArtifactPathResolver::is_cached(&path));
        fs::write(&path, b"RIFF").unwrap();
        assert!(ArtifactPathResolver::is_cached(&path));
    }

    #[test]
    fn commit_moves_into_place() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("align").join("subtitle.srt");
        let partial = dir.path().join("tmp.srt");
        fs::write(&partial, b"1\n").unwrap();

        commit(&partial, &target).unwrap();
        assert!(target.exists());
        assert!(!partial.exists());
    }
}
