//! One path API over several file systems: the local disk, FTP servers,
//! HTTP(S) resources and the standard streams.
//!
//! ### Overview
//!
//! A [`Path`] is a location string bound to the connection that serves it.
//! Connections implement [`FsBackend`]; connectors ([`FsConnector`]) describe
//! where to connect and build them. The same code lists, reads, writes,
//! copies and moves files regardless of the backend underneath.
//!
//! **Key ideas**:
//! - **Connections own state**: working directory stack, open flag and (for
//!   FTP) the server session. Paths only hold a shared handle.
//! - **Check, then commit**: `make_dir`, `copy_to` and `move_to` validate the
//!   whole operation before changing anything (see [`CheckMode`]). The check
//!   is advisory; concurrent changes by others can still make the commit
//!   fail part way.
//! - **Containment ordering**: `a < b` means `a` is an ancestor of `b`.
//!   Unrelated paths are incomparable, so never sort paths with it.
//! - **Proxies for remote files**: FTP and HTTP files are staged in local
//!   temp files ([`ProxyFile`]) and written back on flush.
//! - **Explicit defaults**: an [`FsContext`] carries the default connection
//!   for bare location strings.
//!
//! ```no_run
//! use vfs_path_kit::{DirOptions, FsContext, SaveMode};
//!
//! # fn main() -> vfs_path_kit::Result<()> {
//! let context = FsContext::local();
//! let report = context.path("/tmp/report.txt")?;
//! report.save(["first line", "second line"], SaveMode::Overwrite)?;
//! report.copy_to(&context.path("/tmp/backup/report.txt")?, DirOptions::new())?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod context;
mod core;
mod path;
mod vfs;

pub use context::FsContext;
pub use crate::core::{
    Access, BackendKind, CheckMode, ConnectionId, CwdStack, DEFAULT_STABILITY_INTERVAL, Dialect,
    DirOptions, FORM_FEED, FileHandle, FsBackend, FsConnector, FsError, FsFile, Lines, OpenConnection,
    OpenMode, Records, Result, SaveMode, utils,
};
pub use path::{CwdGuard, Path, Walk, WalkEntry};
pub use vfs::{
    AnyConnector, Credential, FtpConnection, FtpConnector, HttpConnection, HttpConnector,
    LocalConnection, LocalConnector, ProxyFile, StdioConnection, StdioConnector, TempFile,
    Writeback, load_url, temp_file_path,
};
