//! Standard streams as a file system: `stdin`, `stdout` and `stderr`.
//!
//! Names are case-insensitive. There are no directories; only reading from
//! `stdin` and appending to `stdout`/`stderr` are supported.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::Path;
use crate::core::{
    BackendKind, ConnectionId, CwdStack, FileHandle, FsBackend, FsConnector, FsError, FsFile,
    OpenMode, Result,
};

const STREAMS: [&str; 3] = ["STDIN", "STDOUT", "STDERR"];

/// Connector for the standard streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StdioConnector;

impl StdioConnector {
    pub fn connection(&self) -> Arc<dyn FsBackend> {
        Arc::new(StdioConnection::default())
    }
}

impl FsConnector for StdioConnector {
    type Connection = StdioConnection;

    fn new_connection(&self) -> Result<StdioConnection> {
        Ok(StdioConnection::default())
    }
}

#[derive(Debug, Default)]
pub struct StdioConnection {
    cwd: CwdStack,
}

enum StdioFile {
    Stdin(io::Stdin),
    Stdout(io::Stdout),
    Stderr(io::Stderr),
}

fn wrong_direction() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "stream does not support this direction")
}

impl Read for StdioFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            StdioFile::Stdin(stdin) => stdin.read(buf),
            _ => Err(wrong_direction()),
        }
    }
}

impl Write for StdioFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            StdioFile::Stdout(stdout) => stdout.write(buf),
            StdioFile::Stderr(stderr) => stderr.write(buf),
            StdioFile::Stdin(_) => Err(wrong_direction()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            StdioFile::Stdout(stdout) => stdout.flush(),
            StdioFile::Stderr(stderr) => stderr.flush(),
            StdioFile::Stdin(_) => Ok(()),
        }
    }
}

impl FsFile for StdioFile {
    /// The process streams stay open; closing only flushes.
    fn close(mut self: Box<Self>) -> Result<()> {
        self.flush()?;
        Ok(())
    }
}

impl FsBackend for StdioConnection {
    fn id(&self) -> ConnectionId {
        ConnectionId::shared(BackendKind::Stdio)
    }

    fn cwd_stack(&self) -> &CwdStack {
        &self.cwd
    }

    fn abs_path(&self, path: &Path) -> Result<Path> {
        let location = self.check_path(path)?.to_uppercase();
        Ok(Path::new(location, path.connection().clone()))
    }

    fn is_dir(&self, path: &Path) -> Result<bool> {
        self.check_path(path)?;
        Ok(false)
    }

    fn is_file(&self, path: &Path) -> Result<bool> {
        let location = self.check_path(path)?.to_uppercase();
        Ok(STREAMS.contains(&location.as_str()))
    }

    fn open_file(&self, path: &Path, mode: OpenMode) -> Result<FileHandle> {
        self.verify_is_file(path)?;
        let location = self.check_path(path)?.to_uppercase();
        let unsupported = || FsError::UnsupportedMode(format!("{mode} on {location}"));
        let file = match location.as_str() {
            "STDIN" if !mode.is_writable() => StdioFile::Stdin(io::stdin()),
            "STDOUT" if mode.is_append() && !mode.is_readable() => StdioFile::Stdout(io::stdout()),
            "STDERR" if mode.is_append() && !mode.is_readable() => StdioFile::Stderr(io::stderr()),
            _ => return Err(unsupported()),
        };
        Ok(Box::new(file))
    }
}
