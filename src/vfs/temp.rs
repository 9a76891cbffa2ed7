//! Local staging files.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path as HostPath, PathBuf};

use tracing::{debug, warn};

use crate::core::{FsFile, OpenMode, Result};

/// Creates an empty file in the system temp directory and returns its path.
/// The file is not removed automatically; [`TempFile`] takes care of that.
pub fn temp_file_path(name_hint: &str) -> Result<PathBuf> {
    let prefix: String = name_hint
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(32)
        .collect();
    let file = tempfile::Builder::new()
        .prefix(&format!("{prefix}_"))
        .tempfile()?;
    Ok(file.into_temp_path().keep().map_err(io::Error::from)?)
}

/// A local file that is deleted when closed.
///
/// Tracks whether it has been written to since the last flush. Closing
/// flushes and then always removes the file, even if the flush failed.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    file: Option<File>,
    modified: bool,
}

impl TempFile {
    /// Opens the file at `path` with `mode`; it will be removed on close.
    pub fn open(path: PathBuf, mode: OpenMode) -> Result<Self> {
        let file = mode.non_exclusive().to_open_options().open(&path)?;
        Ok(Self {
            path,
            file: Some(file),
            modified: false,
        })
    }

    /// Creates a fresh temp file opened for reading and writing.
    pub fn create(name_hint: &str) -> Result<Self> {
        Self::open(temp_file_path(name_hint)?, OpenMode::parse("w+b")?)
    }

    pub fn path(&self) -> &HostPath {
        &self.path
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn clear_modified(&mut self) {
        self.modified = false;
    }

    pub(crate) fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("temp file is closed"))
    }

    /// Flushes, releases the handle and removes the file. Closing twice is a
    /// no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        let flushed = file.flush();
        drop(file);
        let removed = std::fs::remove_file(&self.path);
        debug!(path = %self.path.display(), "temp file discarded");
        flushed?;
        match removed {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

impl Read for TempFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.file()?.write(buf)?;
        if written > 0 {
            self.modified = true;
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl Seek for TempFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

impl FsFile for TempFile {
    fn close(mut self: Box<Self>) -> Result<()> {
        TempFile::close(&mut self)
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = %self.path.display(), error = %err, "failed to discard temp file");
        }
    }
}
