//! Random-access file I/O as the writer and reader need it.
//!
//! `rangestore::storage_context::Filesystem` is this crate's caller's
//! abstraction over the distributed filesystem a range's files really live
//! on; it can't be referenced directly here without an upward dependency on
//! `rangestore`. [`CellStoreFs`] is the narrow slice of that same seam a
//! writer/reader actually needs — random-access handles, atomic rename, and
//! a directory fsync. `rangestore::storage_context::Filesystem` carries the
//! same methods and `rangestore::storage_context::FsForCellStore` adapts any
//! `Filesystem` into a `CellStoreFs` by delegating to them, so a writer or
//! reader built through `_with_fs` always goes through the caller's
//! filesystem rather than reaching past it to `std::fs` directly.

use std::io;
use std::path::Path;

/// A random-access read handle: seek to any offset, then read from there.
/// Blanket-implemented for anything `Read + Seek + Send`, so a plain
/// `std::fs::File` already qualifies.
pub trait SeekRead: io::Read + io::Seek + Send {}
impl<T: io::Read + io::Seek + Send> SeekRead for T {}

/// A random-access write handle that can also fsync itself once a cell
/// store is ready to become durable.
pub trait SeekWrite: io::Write + io::Seek + Send {
    /// Flushes OS-buffered writes to stable storage.
    fn sync_all(&self) -> io::Result<()>;
}

impl SeekWrite for std::fs::File {
    fn sync_all(&self) -> io::Result<()> {
        std::fs::File::sync_all(self)
    }
}

/// What [`crate::writer::CellStoreWriter`]/[`crate::reader::CellStoreReader`]
/// need from the filesystem: seekable handles, an atomic rename, and a
/// directory fsync so the rename survives a crash.
pub trait CellStoreFs: Send + Sync {
    /// Opens `path` for random-access reading.
    fn open_read_seek(&self, path: &Path) -> io::Result<Box<dyn SeekRead>>;

    /// Creates (or truncates) `path` for random-access writing.
    fn create_write_seek(&self, path: &Path) -> io::Result<Box<dyn SeekWrite>>;

    /// Atomically replaces `to` with `from`, as `std::fs::rename` does on a
    /// single volume.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Fsyncs a directory's own metadata, e.g. after a rename into it.
    fn sync_dir(&self, dir: &Path) -> io::Result<()>;

    /// Removes a file. Best-effort: callers treat a missing file as success.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// The plain local-disk implementation, used directly by this crate's own
/// tests and by `CellStoreReader::open`/`CellStoreWriter::create`'s no-`Filesystem`
/// convenience constructors. `rangestore::storage_context::LocalFilesystem`
/// implements the same operations against `std::fs` independently, since it
/// also has to serve the non-seekable `open_read`/`create` methods `CellStoreFs`
/// doesn't need.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCellStoreFs;

impl CellStoreFs for LocalCellStoreFs {
    fn open_read_seek(&self, path: &Path) -> io::Result<Box<dyn SeekRead>> {
        Ok(Box::new(std::fs::File::open(path)?))
    }

    fn create_write_seek(&self, path: &Path) -> io::Result<Box<dyn SeekWrite>> {
        Ok(Box::new(
            std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(path)?,
        ))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn sync_dir(&self, dir: &Path) -> io::Result<()> {
        std::fs::File::open(dir)?.sync_all()
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
