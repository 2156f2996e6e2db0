//! Repository for blob, folder and file entries in the vault index.
//!
//! They're tightly coupled: a file row is meaningless without the blob it
//! references, and a blob with no referencing files has no reason to exist
//! (the schema's triggers delete it on the spot).

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{Blob, BlobRow, BlobStatus, File, FileBlobRow, FileRow, Folder, FolderRow};
use exn::{OptionExt, ResultExt};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::{Path, PathBuf};
use stowage_store::Identity;
use tracing::debug;

/// Name of the synthetic folder every imported path is anchored under.
///
/// Keeping an explicit root row (rather than treating NULL-parent rows as
/// "the" root) means the restore walk and the import walk agree on where a
/// vault's tree starts.
pub const ROOT_FOLDER: &str = "ROOT";

/// Repository for the vault index.
///
/// All lookups and mutations go through here. The repository knows the local
/// root it indexes against, so callers hand it absolute paths and it derives
/// the folder chain itself.
///
/// # Relationships
///
/// - Many files can reference the same blob (duplicate content at different paths)
/// - Deleting a folder cascades to its subfolders and files
/// - Deleting or retargeting the last file referencing a blob deletes the blob
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    root: PathBuf,
}

impl Repository {
    /// Create a repository indexing paths under `root`.
    pub fn new(db: &Database, root: impl Into<PathBuf>) -> Self {
        Self { pool: db.pool().clone(), root: root.into() }
    }

    /// The local root this repository indexes against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // =========================================================================
    // Import
    // =========================================================================

    /// Record a file at `path` with the given content identity.
    ///
    /// Finds-or-creates the blob row, the folder chain from [`ROOT_FOLDER`]
    /// down to the file's parent, and upserts the file row, all in one
    /// transaction. Re-importing a path with different content retargets the
    /// file; the trigger collects the old blob if that was its last reference.
    ///
    /// Returns the blob as it was found or created, so the caller can tell
    /// whether the content still needs archiving ([`BlobStatus::Pending`]) or
    /// is already stored ([`BlobStatus::Ready`]).
    pub async fn import(&self, path: impl AsRef<Path>, identity: Identity) -> Result<Blob> {
        let path = path.as_ref();
        let relative = self.relative_to_root(path).await?;
        let name = relative
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_raise(|| ErrorKind::NoFileName(path.to_path_buf()))?;
        let chain: Vec<String> = relative
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .map(|part| part.as_os_str().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();

        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let blob = Self::find_or_create_blob(&mut tx, identity).await?;
        let mut folder = Self::find_or_create_folder(&mut tx, None, ROOT_FOLDER).await?;
        for part in &chain {
            folder = Self::find_or_create_folder(&mut tx, Some(folder.id), part).await?;
        }
        sqlx::query(include_str!("../queries/upsert_file.sql"))
            .bind(folder.id)
            .bind(&name)
            .bind(blob.id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        debug!(path = %relative.display(), blob = blob.id, status = ?blob.status, "imported file");
        Ok(blob)
    }

    /// Resolve `path` relative to the local root, rejecting anything that
    /// doesn't live under it. Both sides are canonicalized first so symlinked
    /// roots (looking at you, macOS temp dirs) compare consistently.
    async fn relative_to_root(&self, path: &Path) -> Result<PathBuf> {
        let root = tokio::fs::canonicalize(&self.root).await.map_err(ErrorKind::Io)?;
        let path = tokio::fs::canonicalize(path).await.map_err(ErrorKind::Io)?;
        let relative =
            path.strip_prefix(&root).map_err(|_| ErrorKind::OutsideRoot(path.clone()))?;
        Ok(relative.to_path_buf())
    }

    async fn find_or_create_blob(
        tx: &mut Transaction<'_, Sqlite>,
        identity: Identity,
    ) -> Result<Blob> {
        sqlx::query(include_str!("../queries/insert_blob.sql"))
            .bind(identity.as_bytes().to_vec())
            .bind(BlobStatus::Pending.as_i64())
            .execute(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let row: BlobRow = sqlx::query_as(include_str!("../queries/get_blob_by_hash.sql"))
            .bind(identity.as_bytes().to_vec())
            .fetch_one(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.try_into()
    }

    async fn find_or_create_folder(
        tx: &mut Transaction<'_, Sqlite>,
        parent_id: Option<i64>,
        name: &str,
    ) -> Result<Folder> {
        sqlx::query(include_str!("../queries/insert_folder.sql"))
            .bind(parent_id)
            .bind(name)
            .execute(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        // NOCASE collation on the name column makes this select match the
        // existing row even when only the casing differs.
        let row: FolderRow = sqlx::query_as(include_str!("../queries/get_folder.sql"))
            .bind(parent_id)
            .bind(name)
            .fetch_one(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(row.into())
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Advance a blob's status, returning the blob as now recorded.
    ///
    /// The transition is monotonic: asking to move a `Ready` blob back to
    /// `Pending` is a no-op and the returned blob stays `Ready`.
    pub async fn update_blob_status(&self, blob: &Blob, status: BlobStatus) -> Result<Blob> {
        sqlx::query(include_str!("../queries/update_blob_status.sql"))
            .bind(blob.id)
            .bind(status.as_i64())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let row: Option<BlobRow> = sqlx::query_as(include_str!("../queries/get_blob_by_id.sql"))
            .bind(blob.id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.ok_or_raise(|| ErrorKind::BlobNotFound)?.try_into()
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// Look up a blob by its content identity.
    pub async fn blob(&self, identity: Identity) -> Result<Option<Blob>> {
        let row: Option<BlobRow> = sqlx::query_as(include_str!("../queries/get_blob_by_hash.sql"))
            .bind(identity.as_bytes().to_vec())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Blob::try_from).transpose()
    }

    /// The vault's top-level [`ROOT_FOLDER`], if anything has been imported.
    pub async fn root_folder(&self) -> Result<Option<Folder>> {
        let row: Option<FolderRow> = sqlx::query_as(include_str!("../queries/get_folder.sql"))
            .bind(Option::<i64>::None)
            .bind(ROOT_FOLDER)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(row.map(Folder::from))
    }

    /// List the child folders of `parent`, or the top-level folders when
    /// `parent` is `None`.
    pub async fn folders(&self, parent: Option<&Folder>) -> Result<Vec<Folder>> {
        let rows: Vec<FolderRow> = sqlx::query_as(include_str!("../queries/list_folders.sql"))
            .bind(parent.map(|folder| folder.id))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().map(Folder::from).collect())
    }

    /// List the files directly inside `folder`.
    pub async fn files(&self, folder: &Folder) -> Result<Vec<File>> {
        let rows: Vec<FileRow> = sqlx::query_as(include_str!("../queries/list_files.sql"))
            .bind(folder.id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().map(File::from).collect())
    }

    /// List the files directly inside `folder`, joined with their blobs.
    ///
    /// This is what a restore walks: it needs both the name to write and the
    /// identity (plus status) of the content to materialize.
    pub async fn files_with_blobs(&self, folder: &Folder) -> Result<Vec<(File, Blob)>> {
        let rows: Vec<FileBlobRow> =
            sqlx::query_as(include_str!("../queries/list_files_with_blobs.sql"))
                .bind(folder.id)
                .fetch_all(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(<(File, Blob)>::try_from).collect()
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove a file row. If it held the last reference to its blob, the
    /// trigger collects the blob in the same statement.
    pub async fn remove_file(&self, file: &File) -> Result<()> {
        sqlx::query(include_str!("../queries/delete_file.sql"))
            .bind(file.id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    async fn setup() -> (Database, Repository, tempfile::TempDir) {
        let db = Database::connect_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(&db, dir.path());
        (db, repo, dir)
    }

    fn touch(root: &Path, relative: &str) -> PathBuf {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, relative.as_bytes()).unwrap();
        path
    }

    fn identity_of(byte: u8) -> Identity {
        Identity::from_bytes([byte; 32])
    }

    #[tokio::test]
    async fn import_creates_folder_chain_and_pending_blob() {
        let (_db, repo, dir) = setup().await;
        let path = touch(dir.path(), "b/c.txt");

        let blob = repo.import(&path, identity_of(1)).await.unwrap();
        assert_eq!(blob.status, BlobStatus::Pending);
        assert_eq!(blob.identity, identity_of(1));

        let roots = repo.folders(None).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].name, ROOT_FOLDER);

        let children = repo.folders(Some(&roots[0])).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "b");

        let files = repo.files(&children[0]).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "c.txt");
        assert_eq!(files[0].blob_id, blob.id);
    }

    #[tokio::test]
    async fn import_deduplicates_identical_content() {
        let (db, repo, dir) = setup().await;
        let first = touch(dir.path(), "a.txt");
        let second = touch(dir.path(), "b/c.txt");

        let blob_a = repo.import(&first, identity_of(2)).await.unwrap();
        let blob_b = repo.import(&second, identity_of(2)).await.unwrap();
        assert_eq!(blob_a.id, blob_b.id);

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM blobs").fetch_one(db.pool()).await.unwrap();
        assert_eq!(count, 1);
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM files").fetch_one(db.pool()).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn reimport_returns_existing_status() {
        let (_db, repo, dir) = setup().await;
        let path = touch(dir.path(), "a.txt");

        let blob = repo.import(&path, identity_of(3)).await.unwrap();
        let blob = repo.update_blob_status(&blob, BlobStatus::Ready).await.unwrap();
        assert_eq!(blob.status, BlobStatus::Ready);

        let again = repo.import(&path, identity_of(3)).await.unwrap();
        assert_eq!(again.id, blob.id);
        assert_eq!(again.status, BlobStatus::Ready);
    }

    #[tokio::test]
    async fn status_never_regresses() {
        let (_db, repo, dir) = setup().await;
        let path = touch(dir.path(), "a.txt");

        let blob = repo.import(&path, identity_of(4)).await.unwrap();
        let blob = repo.update_blob_status(&blob, BlobStatus::Ready).await.unwrap();
        let blob = repo.update_blob_status(&blob, BlobStatus::Pending).await.unwrap();
        assert_eq!(blob.status, BlobStatus::Ready);
    }

    #[tokio::test]
    async fn retargeting_collects_orphaned_blob() {
        let (_db, repo, dir) = setup().await;
        let path = touch(dir.path(), "a.txt");

        repo.import(&path, identity_of(5)).await.unwrap();
        repo.import(&path, identity_of(6)).await.unwrap();

        assert!(repo.blob(identity_of(5)).await.unwrap().is_none());
        assert!(repo.blob(identity_of(6)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn removing_last_reference_collects_blob() {
        let (_db, repo, dir) = setup().await;
        let shared_a = touch(dir.path(), "a.txt");
        let shared_b = touch(dir.path(), "b.txt");

        repo.import(&shared_a, identity_of(7)).await.unwrap();
        repo.import(&shared_b, identity_of(7)).await.unwrap();

        let root = repo.root_folder().await.unwrap().unwrap();
        let files = repo.files(&root).await.unwrap();
        assert_eq!(files.len(), 2);

        // One reference left, blob survives.
        repo.remove_file(&files[0]).await.unwrap();
        assert!(repo.blob(identity_of(7)).await.unwrap().is_some());

        // Last reference gone, trigger collects the blob.
        repo.remove_file(&files[1]).await.unwrap();
        assert!(repo.blob(identity_of(7)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn import_rejects_path_outside_root() {
        let (_db, repo, _dir) = setup().await;
        let elsewhere = tempfile::tempdir().unwrap();
        let path = touch(elsewhere.path(), "a.txt");

        let err = repo.import(&path, identity_of(8)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::OutsideRoot(_)));
        // Nothing was written before the rejection.
        assert!(repo.blob(identity_of(8)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn import_rejects_root_itself() {
        let (_db, repo, dir) = setup().await;
        let err = repo.import(dir.path(), identity_of(9)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NoFileName(_)));
    }

    #[tokio::test]
    async fn sibling_folder_names_are_case_insensitive() {
        let (_db, repo, dir) = setup().await;
        let first = touch(dir.path(), "Docs/a.txt");
        let second = touch(dir.path(), "docs/b.txt");

        repo.import(&first, identity_of(10)).await.unwrap();
        repo.import(&second, identity_of(11)).await.unwrap();

        let root = repo.root_folder().await.unwrap().unwrap();
        let children = repo.folders(Some(&root)).await.unwrap();
        assert_eq!(children.len(), 1, "Docs and docs should collapse into one folder");
        assert_eq!(repo.files(&children[0]).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn root_folder_is_not_duplicated_across_imports() {
        let (_db, repo, dir) = setup().await;
        let first = touch(dir.path(), "a.txt");
        let second = touch(dir.path(), "b.txt");

        repo.import(&first, identity_of(12)).await.unwrap();
        repo.import(&second, identity_of(13)).await.unwrap();

        assert_eq!(repo.folders(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn files_with_blobs_joins_correctly() {
        let (_db, repo, dir) = setup().await;
        let path = touch(dir.path(), "a.txt");

        let blob = repo.import(&path, identity_of(14)).await.unwrap();
        let root = repo.root_folder().await.unwrap().unwrap();
        let pairs = repo.files_with_blobs(&root).await.unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.name, "a.txt");
        assert_eq!(pairs[0].1, blob);
    }

    #[tokio::test]
    async fn update_status_of_missing_blob_errors() {
        let (_db, repo, _dir) = setup().await;
        let ghost = Blob { id: 999, identity: identity_of(15), status: BlobStatus::Pending };
        let err = repo.update_blob_status(&ghost, BlobStatus::Ready).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BlobNotFound));
    }
}
