//! Local stand-ins for remote files.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path as HostPath, PathBuf};

use tracing::warn;

use crate::core::{FsFile, OpenMode, Result};
use crate::vfs::temp::TempFile;

/// Pushes the content of the local proxy back to the original location.
pub type Writeback = Box<dyn FnMut(&HostPath) -> Result<()> + Send>;

/// A temp file standing in for a remote file.
///
/// Reads and writes go to the local copy. When the proxy has been modified,
/// flushing hands the local copy to the writeback callback (an upload, for
/// instance). Closing flushes, then removes the local copy.
pub struct ProxyFile {
    temp: TempFile,
    original: String,
    writeback: Option<Writeback>,
}

impl ProxyFile {
    /// Opens the staged copy at `proxy_path` for the remote `original`.
    ///
    /// # Arguments
    ///
    /// * `original` - Location of the remote file, used in messages.
    /// * `proxy_path` - Local file holding the staged content.
    /// * `mode` - Mode for the local file.
    /// * `writeback` - Callback run on flush when modified; `None` for
    ///   read-only proxies.
    pub fn open(
        original: impl Into<String>,
        proxy_path: PathBuf,
        mode: OpenMode,
        writeback: Option<Writeback>,
    ) -> Result<Self> {
        Ok(Self {
            temp: TempFile::open(proxy_path, mode)?,
            original: original.into(),
            writeback,
        })
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn proxy_path(&self) -> &HostPath {
        self.temp.path()
    }

    pub fn is_modified(&self) -> bool {
        self.temp.is_modified()
    }

    /// Forces a writeback on the next flush, even without writes. Used when
    /// opening alone changes the original (truncation, creation).
    pub fn mark_modified(&mut self) {
        self.temp.mark_modified();
    }

    fn write_back(&mut self) -> Result<()> {
        self.temp.flush()?;
        if !self.temp.is_modified() {
            return Ok(());
        }
        if let Some(writeback) = self.writeback.as_mut() {
            writeback(self.temp.path())?;
            self.temp.clear_modified();
        }
        Ok(())
    }

    /// Writes back pending changes and removes the local copy. The copy is
    /// removed even if the writeback fails.
    pub fn close(&mut self) -> Result<()> {
        if self.temp.is_closed() {
            return Ok(());
        }
        let written = self.write_back();
        let closed = self.temp.close();
        written.and(closed)
    }
}

impl fmt::Debug for ProxyFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyFile")
            .field("original", &self.original)
            .field("proxy", &self.temp.path())
            .field("writable", &self.writeback.is_some())
            .finish()
    }
}

impl Read for ProxyFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.temp.read(buf)
    }
}

impl Write for ProxyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_back().map_err(io::Error::from)
    }
}

impl Seek for ProxyFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.temp.seek(pos)
    }
}

impl FsFile for ProxyFile {
    fn close(mut self: Box<Self>) -> Result<()> {
        ProxyFile::close(&mut self)
    }
}

impl Drop for ProxyFile {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(original = %self.original, error = %err, "failed to close proxy file");
        }
    }
}
