//! Destination-file I/O: pre-sizing and concurrent positional writes.
//!
//! The orchestrator opens the output once; fetchers share a clone and use
//! pwrite-style offset writes, so no cursor is shared and the file is never
//! truncated on open (a resumed file keeps its existing bytes).

use anyhow::{Context, Result};
use std::fs::File;
#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The shared destination file. Cloning is cheap; every clone writes through
/// the same file description with independent offsets.
#[derive(Clone)]
pub struct OutputFile {
    file: Arc<File>,
    path: PathBuf,
}

impl OutputFile {
    /// Opens `path` read/write, creating it if absent. Never truncates.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open output file {}", path.display()))?;
        Ok(Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self
            .file
            .metadata()
            .context("failed to stat output file")?
            .len())
    }

    /// Makes the file exactly `size` bytes long.
    ///
    /// A brand-new file is preallocated with `posix_fallocate` where
    /// available (real block allocation, less fragmentation); otherwise the
    /// length is adjusted with `set_len`, which preserves existing bytes on
    /// a resumed file and shrinks leftovers from an incompatible earlier run.
    pub fn ensure_len(&self, size: u64) -> Result<()> {
        let current = self.len()?;
        if current == size {
            return Ok(());
        }
        #[cfg(unix)]
        if current == 0 && size > 0 {
            let r = unsafe { libc::posix_fallocate(self.file.as_raw_fd(), 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file
            .set_len(size)
            .with_context(|| format!("failed to size {} to {} bytes", self.path.display(), size))
    }

    /// Writes `data` at `offset` without touching any shared cursor.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    /// Non-Unix fallback: seek+write on a cloned handle.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = self.file.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
