//! Artifact naming and caching.
//!
//! Every stage output lives at a path derived from a content fingerprint
//! of its inputs. A file at that path is a finished artifact: stages write
//! to a partial path first and rename on success.

mod fingerprint;
mod resolver;

pub use fingerprint::{BaseName, Fingerprint};
pub use resolver::{commit, ensure_parent, is_partial, partial_path, ArtifactPathResolver};

#[cfg(test)]
pub(crate) use resolver::partials_in;
