//! Content fingerprints for cache keys.
//!
//! A fingerprint is a SHA-256 over labelled fields (input file bytes and
//! configuration strings). Two runs with identical inputs get the same
//! fingerprint; any change to a field changes it.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
const DIGEST_CHARS: usize = 16;

/// Longest sanitized stem kept in a base name.
const MAX_STEM_CHARS: usize = 64;

/// Incremental fingerprint builder.
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Add a string field.
    pub fn field(mut self, label: &str, value: &str) -> Self {
        self.push(label, value.as_bytes());
        self
    }

    /// Add an optional string field. `None` hashes differently from `""`.
    pub fn optional(self, label: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.field(label, v),
            None => self.field(label, "\u{0}none"),
        }
    }

    /// Add the full contents of a file.
    pub fn file(mut self, label: &str, path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();

        self.hasher.update(label.as_bytes());
        self.hasher.update([0u8]);
        self.hasher.update(len.to_le_bytes());

        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.hasher.update(&buf[..n]);
        }
        Ok(self)
    }

    /// Add an optional file. `None` hashes as an absent marker.
    pub fn optional_file(self, label: &str, path: Option<&Path>) -> io::Result<Self> {
        match path {
            Some(p) => self.file(label, p),
            None => Ok(self.field(label, "\u{0}absent")),
        }
    }

    /// Finish and return the truncated hex digest.
    pub fn finish(self) -> String {
        let full = format!("{:x}", self.hasher.finalize());
        full[..DIGEST_CHARS].to_string()
    }

    fn push(&mut self, label: &str, bytes: &[u8]) {
        self.hasher.update(label.as_bytes());
        self.hasher.update([0u8]);
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory name identifying one set of inputs: `{stem}-{digest}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseName(String);

impl BaseName {
    /// Build a base name from a human-readable stem and a digest.
    pub fn new(stem: &str, digest: &str) -> Self {
        Self(format!("{}-{}", sanitize_stem(stem), digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_CHARS)
        .collect();

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "audio".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn same_fields_same_digest() {
        let a = Fingerprint::new().field("model", "kim").finish();
        let b = Fingerprint::new().field("model", "kim").finish();
        assert_eq!(a, b);
        assert_eq!(a.len(), DIGEST_CHARS);
    }

    #[test]
    fn field_boundaries_matter() {
        let a = Fingerprint::new().field("a", "bc").field("d", "").finish();
        let b = Fingerprint::new().field("a", "b").field("d", "c").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn none_differs_from_empty() {
        let a = Fingerprint::new().optional("overlay", None).finish();
        let b = Fingerprint::new().optional("overlay", Some("")).finish();
        assert_ne!(a, b);
    }

    #[test]
    fn file_contents_change_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("song.wav");

        fs::write(&path, b"first").unwrap();
        let a = Fingerprint::new().file("audio", &path).unwrap().finish();
        fs::write(&path, b"second").unwrap();
        let b = Fingerprint::new().file("audio", &path).unwrap().finish();

        assert_ne!(a, b);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(Fingerprint::new()
            .file("audio", &dir.path().join("absent.wav"))
            .is_err());
    }

    #[test]
    fn base_name_sanitizes_stem() {
        let base = BaseName::new("Nine Thou (Remix)", "0123456789abcdef");
        assert_eq!(base.as_str(), "Nine_Thou__Remix-0123456789abcdef");
        assert_eq!(BaseName::new("../..", "ff").as_str(), "audio-ff");
    }
}
