//! The content store proper: hash, compress, and atomically install blobs.

use crate::error::{ErrorKind, Result};
use crate::identity::Identity;
use crate::layout::{self, NameGen, RandomNames};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::instrument;

/// Input chunk size for hashing and compression.
const IN_CHUNK: usize = 1 << 20; // 1 MiB
/// Zstd compression level. Favours throughput over ratio; vault objects are
/// written far more often than they are shipped anywhere.
const ZSTD_LEVEL: i32 = 3;

/// Durable, deduplicated, compressed storage of byte blobs addressed by
/// their [`Identity`].
///
/// All operations are safe under concurrent access from multiple threads or
/// cooperating processes without external locking:
///
/// - [`store`](Self::store) for the same content from N callers is
///   idempotent: the destination path is content-addressed, so exactly one
///   installation survives and the rest silently discard their temp output.
/// - [`retrieve`](Self::retrieve) to the same destination from N callers is
///   last-writer-wins. All writers decode the same object, so the final
///   content is always correct; only completion order is unspecified.
/// - [`delete`](Self::delete) racing a retrieval either lets it complete or
///   makes it fail cleanly with `NotFound`, never with partial output.
///
/// Nothing here retries internally; content addressing makes whole-call
/// retries naturally idempotent, so that's left to the caller.
#[derive(Clone)]
pub struct ContentStore {
    root: PathBuf,
    names: Arc<dyn NameGen>,
}

// Manual impl: `Arc<dyn NameGen>` has no `Debug`, and the name source is
// noise in a debug rendering anyway.
impl fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStore").field("root", &self.root).finish_non_exhaustive()
    }
}

impl ContentStore {
    /// Open a store rooted at `archive_root`. Objects live under
    /// `<archive_root>/Objects`; nothing is created until the first write.
    pub fn new(archive_root: impl Into<PathBuf>) -> Self {
        Self::with_names(archive_root, Arc::new(RandomNames))
    }

    /// Open a store with an injected temp-name source (for tests that need
    /// deterministic temp names).
    pub fn with_names(archive_root: impl Into<PathBuf>, names: Arc<dyn NameGen>) -> Self {
        Self { root: archive_root.into(), names }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute the identity of a file without storing anything.
    ///
    /// Streams the file once through the hash; deterministic across
    /// callers, timing, and platforms.
    pub async fn identify(&self, source: impl AsRef<Path>) -> Result<Identity> {
        let source = source.as_ref().to_path_buf();
        run_blocking(move || identify_sync(&source)).await
    }

    /// Hash, compress, and atomically install a file's bytes, returning its
    /// identity.
    ///
    /// If an object for the same identity already exists (a prior or
    /// concurrent store won the race) the freshly compressed temp file is
    /// discarded; that is the dedup fast path, not an error.
    #[instrument(skip_all, fields(source = %source.as_ref().display()))]
    pub async fn store(&self, source: impl AsRef<Path>) -> Result<Identity> {
        let source = source.as_ref().to_path_buf();
        let root = self.root.clone();
        let names = Arc::clone(&self.names);
        run_blocking(move || store_sync(&root, &source, names.as_ref())).await
    }

    /// Decompress the object for `identity` into `destination`.
    ///
    /// Fails with `NotFound` if no such object exists and with `Corrupt` if
    /// the compressed stream ends mid-frame or fails validation; partial
    /// or garbage output is never installed at the destination.
    #[instrument(skip_all, fields(identity = %identity, destination = %destination.as_ref().display()))]
    pub async fn retrieve(&self, identity: Identity, destination: impl AsRef<Path>) -> Result<()> {
        let destination = destination.as_ref().to_path_buf();
        let root = self.root.clone();
        let names = Arc::clone(&self.names);
        run_blocking(move || retrieve_sync(&root, identity, &destination, names.as_ref())).await
    }

    /// Remove the object for `identity`, pruning now-empty shard
    /// directories up to (but excluding) the objects root.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn delete(&self, identity: Identity) -> Result<()> {
        let root = self.root.clone();
        run_blocking(move || delete_sync(&root, identity)).await
    }
}

/// Compute a file's identity without opening a store.
///
/// Same hash as [`ContentStore::identify`]; handy when there's no archive
/// root in play at all.
pub async fn identify_file(source: impl AsRef<Path>) -> Result<Identity> {
    let source = source.as_ref().to_path_buf();
    run_blocking(move || identify_sync(&source)).await
}

async fn run_blocking<T, F>(func: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(func).await.map_err(|_| ErrorKind::Task)?
}

/// `Read` adapter that feeds every byte it passes through into a BLAKE3
/// hasher, so one pass over the source drives hash and compressor together.
struct HashingReader<R> {
    inner: R,
    hasher: blake3::Hasher,
}
impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, hasher: blake3::Hasher::new() }
    }

    fn finalize(self) -> Identity {
        Identity::from(self.hasher.finalize())
    }
}
impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Wraps a file handle and raises a shared flag when the handle itself
/// fails, so a decode failure can be attributed to the file (plain I/O) or
/// to the decoder (corruption).
struct Tracked<T> {
    inner: T,
    failed: Arc<AtomicBool>,
}
impl<T> Tracked<T> {
    fn new(inner: T, failed: Arc<AtomicBool>) -> Self {
        Self { inner, failed }
    }
}
impl<R: Read> Read for Tracked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|_| self.failed.store(true, Ordering::Relaxed))
    }
}
impl<W: Write> Write for Tracked<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf).inspect_err(|_| self.failed.store(true, Ordering::Relaxed))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().inspect_err(|_| self.failed.store(true, Ordering::Relaxed))
    }
}

fn identify_sync(source: &Path) -> Result<Identity> {
    let file = File::open(source).map_err(ErrorKind::Io)?;
    let mut reader = HashingReader::new(BufReader::with_capacity(IN_CHUNK, file));
    io::copy(&mut reader, &mut io::sink()).map_err(ErrorKind::Io)?;
    Ok(reader.finalize())
}

fn store_sync(archive_root: &Path, source: &Path, names: &dyn NameGen) -> Result<Identity> {
    let objects = layout::objects_root(archive_root);
    let tmp_dir = objects.join(layout::TMP_DIR);
    fs::create_dir_all(&tmp_dir).map_err(ErrorKind::Io)?;
    let tmp_path = tmp_dir.join(format!("tmp-{}.zst", names.next()));

    let source_len = fs::metadata(source).map_err(ErrorKind::Io)?.len();
    let file = File::open(source).map_err(ErrorKind::Io)?;
    let mut reader = HashingReader::new(BufReader::with_capacity(IN_CHUNK, file));

    // One pass: hash + compress into the temp file. The pledged source size
    // puts the uncompressed length into the frame header.
    let compressed = (|| -> io::Result<()> {
        let out = File::create(&tmp_path)?;
        let mut encoder = zstd::stream::write::Encoder::new(out, ZSTD_LEVEL)?;
        encoder.set_pledged_src_size(Some(source_len))?;
        encoder.include_contentsize(true)?;
        io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?;
        Ok(())
    })();
    if let Err(err) = compressed {
        let _ = fs::remove_file(&tmp_path);
        return Err(ErrorKind::Io(err).into());
    }

    let identity = reader.finalize();
    let object = layout::object_path(&objects, &identity);
    if let Some(parent) = object.parent() {
        fs::create_dir_all(parent).map_err(ErrorKind::Io)?;
    }

    // Atomic install: a failed rename with the destination present means a
    // concurrent (or prior) store of identical content won the race.
    if let Err(err) = fs::rename(&tmp_path, &object) {
        let _ = fs::remove_file(&tmp_path);
        if !object.exists() {
            return Err(ErrorKind::Io(err).into());
        }
        tracing::debug!(identity = %identity, "object already stored; discarding temp");
    }
    Ok(identity)
}

fn retrieve_sync(
    archive_root: &Path,
    identity: Identity,
    destination: &Path,
    names: &dyn NameGen,
) -> Result<()> {
    let object = layout::object_path(&layout::objects_root(archive_root), &identity);
    let file = match File::open(&object) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            exn::bail!(ErrorKind::NotFound(identity))
        },
        Err(err) => exn::bail!(ErrorKind::Io(err)),
    };

    let parent = destination.parent().filter(|p| !p.as_os_str().is_empty());
    let file_name = destination
        .file_name()
        .ok_or_else(|| ErrorKind::InvalidPath(destination.to_path_buf()))?;
    let tmp_dir = match parent {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(ErrorKind::Io)?;
            parent.join(layout::TMP_DIR)
        },
        None => PathBuf::from(layout::TMP_DIR),
    };
    fs::create_dir_all(&tmp_dir).map_err(ErrorKind::Io)?;
    let tmp_path = tmp_dir.join(format!(
        "{}-{}.part",
        file_name.to_string_lossy(),
        names.next()
    ));

    // Creating the temp file can't be the object's fault: surface that as
    // plain I/O before any decoding starts.
    let out = match File::create(&tmp_path) {
        Ok(out) => out,
        Err(err) => {
            let _ = fs::remove_file(&tmp_path);
            exn::bail!(ErrorKind::Io(err));
        },
    };

    let file_failed = Arc::new(AtomicBool::new(false));
    let decoded = (|| -> io::Result<()> {
        let reader = Tracked::new(file, Arc::clone(&file_failed));
        let mut decoder = zstd::stream::read::Decoder::new(reader)?.single_frame();
        let mut out = Tracked::new(out, Arc::clone(&file_failed));
        io::copy(&mut decoder, &mut out)?;
        out.flush()?;
        Ok(())
    })();
    if let Err(err) = decoded {
        let _ = fs::remove_file(&tmp_path);
        // Attribute the failure by source, not by error kind: if either
        // file handle raised it, that's plain I/O; anything the decoder
        // itself chokes on, including a frame that ends early, is
        // corruption.
        return if file_failed.load(Ordering::Relaxed) {
            Err(ErrorKind::Io(err).into())
        } else {
            Err(ErrorKind::Corrupt(identity).into())
        };
    }

    // Rename if we can; fall back to copy-then-remove when the temp dir and
    // destination sit on different devices. The fallback is not atomic and
    // is last-writer-wins under concurrent retrieval to the same path.
    if let Err(rename_err) = fs::rename(&tmp_path, destination) {
        let copied = fs::copy(&tmp_path, destination);
        let _ = fs::remove_file(&tmp_path);
        if copied.is_err() {
            exn::bail!(ErrorKind::Io(rename_err));
        }
    }
    Ok(())
}

fn delete_sync(archive_root: &Path, identity: Identity) -> Result<()> {
    let objects = layout::objects_root(archive_root);
    let object = layout::object_path(&objects, &identity);
    match fs::remove_file(&object) {
        Ok(()) => {},
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            exn::bail!(ErrorKind::NotFound(identity))
        },
        Err(err) => exn::bail!(ErrorKind::Io(err)),
    }

    // Walk upward removing now-empty shard directories, stopping at the
    // objects root. Another deleter may be racing us: an ancestor that is
    // already gone, or refuses removal, just ends the walk.
    let mut dir = object.parent();
    while let Some(current) = dir {
        if current == objects {
            break;
        }
        let empty = match fs::read_dir(current) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => break,
        };
        if !empty || fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
    Ok(())
}
