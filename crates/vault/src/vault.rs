//! The vault proper: a local folder paired with an archive.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use stowage_index::models::BlobStatus;
use stowage_index::{Database, Repository};
use stowage_store::ContentStore;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Filename of the metadata index inside the archive root.
pub const INDEX_FILENAME: &str = "content.db";

/// Summary of a [`Vault::push`] run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PushReport {
    /// Files indexed during the walk.
    pub files: usize,
    /// Objects actually written to the archive (the rest were deduplicated).
    pub stored: usize,
}

/// Summary of a [`Vault::pop`] run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PopReport {
    /// Files materialized into the local folder.
    pub files: usize,
    /// Files skipped because their blob never finished archiving.
    pub skipped: usize,
}

/// A local folder paired with the archive it snapshots into.
///
/// The archive root holds the object directory and the metadata index; the
/// local root is the working tree being snapshotted or restored. Neither
/// side contains the other's bookkeeping, so the same archive can back any
/// number of local folders over time.
#[derive(Debug, Clone)]
pub struct Vault {
    store: ContentStore,
    db: Database,
    repo: Repository,
}

impl Vault {
    /// Open a vault, creating the archive root and index database if needed.
    pub async fn open(
        local_root: impl Into<PathBuf>,
        archive_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let archive_root = archive_root.into();
        fs::create_dir_all(&archive_root).await.map_err(ErrorKind::Io)?;
        let store = ContentStore::new(&archive_root);
        let db = Database::connect(archive_root.join(INDEX_FILENAME))
            .await
            .or_raise(|| ErrorKind::Index)?;
        let repo = Repository::new(&db, local_root.into());
        Ok(Self { store, db, repo })
    }

    /// The local folder this vault snapshots.
    pub fn local_root(&self) -> &Path {
        self.repo.root()
    }

    /// Flush and close the index database.
    pub async fn close(&self) {
        self.db.close().await;
    }

    /// Snapshot the local folder into the archive.
    ///
    /// Walks every regular file under the local root, indexes it, and
    /// archives its content unless an identical blob is already `Ready`.
    /// Empty directories leave no trace: folders only exist in the index as
    /// ancestors of files.
    #[instrument(skip(self), fields(root = %self.repo.root().display()))]
    pub async fn push(&self) -> Result<PushReport> {
        let mut report = PushReport::default();
        let mut pending = vec![self.repo.root().to_path_buf()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(ErrorKind::Io)?;
            while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
                let path = entry.path();
                let kind = entry.file_type().await.map_err(ErrorKind::Io)?;
                if kind.is_dir() {
                    pending.push(path);
                } else if kind.is_file() {
                    self.push_file(&path, &mut report).await?;
                } else {
                    debug!(path = %path.display(), "skipping non-regular file");
                }
            }
        }
        info!(files = report.files, stored = report.stored, "snapshot complete");
        Ok(report)
    }

    async fn push_file(&self, path: &Path, report: &mut PushReport) -> Result<()> {
        let identity = self.store.identify(path).await.or_raise(|| ErrorKind::Archive)?;
        let blob = self.repo.import(path, identity).await.or_raise(|| ErrorKind::Index)?;
        report.files += 1;
        if blob.status == BlobStatus::Pending {
            // Index first, archive second: a crash between the two leaves a
            // pending blob that the next push finishes, never a dangling
            // object the index doesn't know about.
            self.store.store(path).await.or_raise(|| ErrorKind::Archive)?;
            self.repo
                .update_blob_status(&blob, BlobStatus::Ready)
                .await
                .or_raise(|| ErrorKind::Index)?;
            report.stored += 1;
            debug!(path = %path.display(), %identity, "archived");
        } else {
            debug!(path = %path.display(), %identity, "already archived");
        }
        Ok(())
    }

    /// Restore the latest snapshot into the local folder.
    ///
    /// Materializes the index's folder tree and every `Ready` file under the
    /// local root. Files whose blob is still `Pending` (an interrupted push)
    /// are skipped with a warning rather than failing the whole restore.
    /// Existing files at restored paths are overwritten; files the snapshot
    /// doesn't know about are left alone.
    #[instrument(skip(self), fields(root = %self.repo.root().display()))]
    pub async fn pop(&self) -> Result<PopReport> {
        let mut report = PopReport::default();
        let Some(root) = self.repo.root_folder().await.or_raise(|| ErrorKind::Index)? else {
            info!("index holds no snapshot to restore");
            return Ok(report);
        };
        let base = self.repo.root().to_path_buf();
        fs::create_dir_all(&base).await.map_err(ErrorKind::Io)?;

        let mut pending = vec![(root, base)];
        while let Some((folder, dir)) = pending.pop() {
            for child in self.repo.folders(Some(&folder)).await.or_raise(|| ErrorKind::Index)? {
                let path = dir.join(&child.name);
                fs::create_dir_all(&path).await.map_err(ErrorKind::Io)?;
                pending.push((child, path));
            }
            let files =
                self.repo.files_with_blobs(&folder).await.or_raise(|| ErrorKind::Index)?;
            for (file, blob) in files {
                if blob.status != BlobStatus::Ready {
                    warn!(file = %file.name, identity = %blob.identity, "blob never finished archiving, skipping");
                    report.skipped += 1;
                    continue;
                }
                self.store
                    .retrieve(blob.identity, dir.join(&file.name))
                    .await
                    .or_raise(|| ErrorKind::Archive)?;
                report.files += 1;
            }
        }
        info!(files = report.files, skipped = report.skipped, "restore complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Fixture {
        local: tempfile::TempDir,
        archive: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self { local: tempfile::tempdir().unwrap(), archive: tempfile::tempdir().unwrap() }
        }

        async fn vault(&self) -> Vault {
            Vault::open(self.local.path(), self.archive.path()).await.unwrap()
        }

        fn write(&self, relative: &str, contents: &str) -> PathBuf {
            let path = self.local.path().join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, contents).unwrap();
            path
        }

        fn wipe_local(&self) {
            std::fs::remove_dir_all(self.local.path()).unwrap();
            std::fs::create_dir_all(self.local.path()).unwrap();
        }

        /// Objects installed in the archive, ignoring temp scratch space.
        fn object_count(&self) -> usize {
            fn walk(dir: &Path, count: &mut usize) {
                for entry in std::fs::read_dir(dir).into_iter().flatten().flatten() {
                    let path = entry.path();
                    if path.file_name().is_some_and(|name| name == ".tmp") {
                        continue;
                    }
                    if path.is_dir() {
                        walk(&path, count);
                    } else {
                        *count += 1;
                    }
                }
            }
            let mut count = 0;
            walk(&self.archive.path().join("Objects"), &mut count);
            count
        }
    }

    #[tokio::test]
    async fn push_deduplicates_and_pop_restores_byte_for_byte() {
        let fx = Fixture::new();
        fx.write("a.txt", "hello");
        fx.write("b/c.txt", "hello");
        fx.write("b/d.txt", "world");
        let vault = fx.vault().await;

        let report = vault.push().await.unwrap();
        assert_eq!(report, PushReport { files: 3, stored: 2 });
        assert_eq!(fx.object_count(), 2, "identical contents share one object");

        fx.wipe_local();
        let report = vault.pop().await.unwrap();
        assert_eq!(report, PopReport { files: 3, skipped: 0 });

        let read = |rel: &str| std::fs::read_to_string(fx.local.path().join(rel)).unwrap();
        assert_eq!(read("a.txt"), "hello");
        assert_eq!(read("b/c.txt"), "hello");
        assert_eq!(read("b/d.txt"), "world");
        vault.close().await;
    }

    #[tokio::test]
    async fn second_push_stores_nothing_new() {
        let fx = Fixture::new();
        fx.write("a.txt", "same old");
        let vault = fx.vault().await;

        assert_eq!(vault.push().await.unwrap(), PushReport { files: 1, stored: 1 });
        assert_eq!(vault.push().await.unwrap(), PushReport { files: 1, stored: 0 });
        vault.close().await;
    }

    #[tokio::test]
    async fn changed_file_is_rearchived_under_new_identity() {
        let fx = Fixture::new();
        fx.write("a.txt", "version one");
        let vault = fx.vault().await;
        vault.push().await.unwrap();

        fx.write("a.txt", "version two");
        let report = vault.push().await.unwrap();
        assert_eq!(report, PushReport { files: 1, stored: 1 });

        fx.wipe_local();
        vault.pop().await.unwrap();
        let restored = std::fs::read_to_string(fx.local.path().join("a.txt")).unwrap();
        assert_eq!(restored, "version two");
        vault.close().await;
    }

    #[tokio::test]
    async fn pop_of_empty_vault_is_a_noop() {
        let fx = Fixture::new();
        let vault = fx.vault().await;
        assert_eq!(vault.pop().await.unwrap(), PopReport::default());
        vault.close().await;
    }

    #[tokio::test]
    async fn empty_directories_leave_no_trace() {
        let fx = Fixture::new();
        fx.write("kept/file.txt", "content");
        std::fs::create_dir_all(fx.local.path().join("empty")).unwrap();
        let vault = fx.vault().await;
        vault.push().await.unwrap();

        fx.wipe_local();
        vault.pop().await.unwrap();
        assert!(fx.local.path().join("kept").is_dir());
        assert!(!fx.local.path().join("empty").exists());
        vault.close().await;
    }

    #[tokio::test]
    async fn pop_skips_blobs_that_never_finished_archiving() {
        let fx = Fixture::new();
        fx.write("good.txt", "archived fine");
        let vault = fx.vault().await;
        vault.push().await.unwrap();

        // Simulate an interrupted push: indexed, but the object never landed.
        let db = Database::connect(fx.archive.path().join(INDEX_FILENAME)).await.unwrap();
        let repo = Repository::new(&db, fx.local.path());
        let orphan = fx.write("orphan.txt", "never archived");
        let identity = stowage_store::Identity::from_bytes([0x42; 32]);
        repo.import(&orphan, identity).await.unwrap();
        db.close().await;

        fx.wipe_local();
        let report = vault.pop().await.unwrap();
        assert_eq!(report, PopReport { files: 1, skipped: 1 });
        assert!(fx.local.path().join("good.txt").is_file());
        assert!(!fx.local.path().join("orphan.txt").exists());
        vault.close().await;
    }
}
