//! On-disk layout of the object directory.
//!
//! The object for identity `h` (64 hex chars) lives at
//! `Objects/h[0:2]/h[2:4]/h` under the archive root. The two-level fan-out
//! keeps individual directories small on large vaults.

use crate::identity::Identity;
use std::path::{Path, PathBuf};

pub(crate) const OBJECTS_DIR: &str = "Objects";
pub(crate) const TMP_DIR: &str = ".tmp";

/// Source of uniqueness for temp file names.
///
/// Injected rather than hard-wired to a global RNG so tests can make
/// temp-name collisions and races deterministic.
pub trait NameGen: Send + Sync {
    fn next(&self) -> u64;
}

/// Default [`NameGen`] backed by the thread-local RNG.
#[derive(Debug, Default)]
pub struct RandomNames;
impl NameGen for RandomNames {
    fn next(&self) -> u64 {
        rand::random()
    }
}

pub(crate) fn objects_root(archive_root: &Path) -> PathBuf {
    archive_root.join(OBJECTS_DIR)
}

pub(crate) fn object_path(objects: &Path, identity: &Identity) -> PathBuf {
    let hex = identity.to_string();
    objects.join(&hex[0..2]).join(&hex[2..4]).join(&hex)
}
