//! Domain models for the vault index, plus their raw database row
//! counterparts.
//!
//! Row structs mirror the table columns exactly and derive [`sqlx::FromRow`];
//! conversion into the domain model is where untrusted column values (hash
//! length, status range) get validated.

use crate::error::{ErrorKind, Result};
use stowage_store::Identity;

/// Surrogate row identifier. Identity of folders and files is their row id,
/// not their name: a rename produces a different logical object.
pub type Id = i64;

/// Lifecycle status of a blob's archive object.
///
/// A blob starts `Pending` (indexed, object not yet guaranteed on disk) and
/// moves to `Ready` once the object is installed. The transition is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BlobStatus {
    Pending = 0,
    Ready = 1,
}

impl BlobStatus {
    pub(crate) fn as_i64(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for BlobStatus {
    type Error = crate::error::Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Ready),
            _ => Err(ErrorKind::InvalidData("blob status").into()),
        }
    }
}

/// A unit of deduplicated content, referenced by zero-or-more files.
///
/// Blobs with zero references don't survive: the schema's triggers collect
/// them as soon as the last referencing file is deleted or retargeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub id: Id,
    pub identity: Identity,
    pub status: BlobStatus,
}

/// A directory node. `parent_id` is `None` only for top-level folders
/// (in practice, the single `ROOT` folder per vault).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: Id,
    pub parent_id: Option<Id>,
    pub name: String,
}

/// A named reference to a blob within a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub id: Id,
    pub parent_id: Id,
    pub name: String,
    pub blob_id: Id,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BlobRow {
    pub id: i64,
    pub hash: Vec<u8>,
    pub status: i64,
}

impl TryFrom<BlobRow> for Blob {
    type Error = crate::error::Error;

    fn try_from(row: BlobRow) -> Result<Self> {
        let identity = Identity::try_from(row.hash.as_slice())
            .map_err(|_| ErrorKind::InvalidData("blob hash"))?;
        Ok(Self { id: row.id, identity, status: BlobStatus::try_from(row.status)? })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FolderRow {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
}

impl From<FolderRow> for Folder {
    fn from(row: FolderRow) -> Self {
        Self { id: row.id, parent_id: row.parent_id, name: row.name }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FileRow {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub blob_id: i64,
}

impl From<FileRow> for File {
    fn from(row: FileRow) -> Self {
        Self { id: row.id, parent_id: row.parent_id, name: row.name, blob_id: row.blob_id }
    }
}

/// Joined row for the file-plus-blob listing used by restore.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FileBlobRow {
    pub file_id: i64,
    pub parent_id: i64,
    pub name: String,
    pub blob_id: i64,
    pub hash: Vec<u8>,
    pub status: i64,
}

impl TryFrom<FileBlobRow> for (File, Blob) {
    type Error = crate::error::Error;

    fn try_from(row: FileBlobRow) -> Result<Self> {
        let identity = Identity::try_from(row.hash.as_slice())
            .map_err(|_| ErrorKind::InvalidData("blob hash"))?;
        let file = File {
            id: row.file_id,
            parent_id: row.parent_id,
            name: row.name,
            blob_id: row.blob_id,
        };
        let blob =
            Blob { id: row.blob_id, identity, status: BlobStatus::try_from(row.status)? };
        Ok((file, blob))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ordering_matches_lifecycle() {
        assert!(BlobStatus::Pending < BlobStatus::Ready);
    }

    #[test]
    fn status_rejects_out_of_range() {
        assert!(BlobStatus::try_from(2).is_err());
        assert!(BlobStatus::try_from(-1).is_err());
    }

    #[test]
    fn blob_row_rejects_short_hash() {
        let row = BlobRow { id: 1, hash: vec![0xab; 16], status: 0 };
        let err = Blob::try_from(row).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("blob hash")));
    }

    #[test]
    fn blob_row_converts() {
        let row = BlobRow { id: 7, hash: vec![0xab; 32], status: 1 };
        let blob = Blob::try_from(row).unwrap();
        assert_eq!(blob.id, 7);
        assert_eq!(blob.status, BlobStatus::Ready);
        assert_eq!(blob.identity.as_bytes(), &[0xab; 32]);
    }
}
