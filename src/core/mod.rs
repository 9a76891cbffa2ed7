//! The connection contract every backend implements, and the pieces it is
//! built from.

use std::fmt;
use std::time::{Duration, SystemTime};

use crate::Path;

mod connection;
mod delimited;
mod error;
mod file;
pub(crate) mod ops;
mod options;
pub mod utils;

pub use connection::{BackendKind, ConnectionId, CwdStack, FsConnector, OpenConnection};
pub use delimited::{Dialect, Records};
pub use error::FsError;
pub use file::{FORM_FEED, FileHandle, FsFile, Lines};
pub use options::{Access, CheckMode, DirOptions, OpenMode, SaveMode};

pub type Result<T> = std::result::Result<T, FsError>;

/// Interval between the two size samples taken by `is_stable`.
pub const DEFAULT_STABILITY_INTERVAL: Duration = Duration::from_secs(1);

/// A connection to a file system.
///
/// Every method that takes a `&Path` operates on that path, which must belong
/// to this connection (see [`FsBackend::check_path`]). Backends implement the
/// primitives (`is_dir`, `list`, `open_file`, `remove`, `create_dir`, ...);
/// the recursive, checked operations (`make_dir`, `copy_to`, `move_to`, ...)
/// have generic default implementations built on those primitives, which a
/// backend may override with a native fast path.
///
/// Primitives a backend cannot support return
/// [`FsError::OperationNotSupported`].
pub trait FsBackend: Send + Sync + fmt::Debug {
    /// Identity used to decide which paths belong to this connection.
    fn id(&self) -> ConnectionId;

    fn kind(&self) -> BackendKind {
        self.id().kind()
    }

    /// Whether the connection can serve requests. Stateless backends are
    /// always open.
    fn is_open(&self) -> bool {
        true
    }

    /// Opens the connection.
    ///
    /// # Returns
    ///
    /// * `Err(FsError::ConnectionAlreadyOpen)` - if a session-bound
    ///   connection is already open.
    fn open(&self) -> Result<()> {
        Ok(())
    }

    /// Closes the connection.
    ///
    /// # Returns
    ///
    /// * `Err(FsError::ConnectionNotOpen)` - if a session-bound connection is
    ///   not open.
    fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Fails with `ConnectionNotOpen` unless the connection is open.
    fn verify_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(FsError::ConnectionNotOpen)
        }
    }

    /// The stack backing `cwd`, `set_cwd`, `push_cwd` and `pop_cwd`.
    fn cwd_stack(&self) -> &CwdStack;

    /// Called after the working directory changed; `None` when it was
    /// cleared. Backends with a server-side working directory apply it here.
    fn apply_cwd(&self, _location: Option<&str>) -> Result<()> {
        Ok(())
    }

    /// The current working directory, if one has been set.
    fn cwd(&self) -> Option<String> {
        self.cwd_stack().top()
    }

    /// Replaces the current working directory.
    fn set_cwd(&self, path: &Path) -> Result<()> {
        let location = self.check_path(path)?;
        self.apply_cwd(Some(&location))?;
        self.cwd_stack().set(location);
        Ok(())
    }

    /// Makes `path` the working directory, remembering the previous one.
    /// The stack is left as it was when the backend refuses the change.
    fn push_cwd(&self, path: &Path) -> Result<()> {
        let location = self.check_path(path)?;
        self.apply_cwd(Some(&location))?;
        self.cwd_stack().push(location);
        Ok(())
    }

    /// Returns to the previous working directory. The bottom entry is never
    /// removed.
    fn pop_cwd(&self) -> Result<Option<String>> {
        let popped = self.cwd_stack().pop();
        let current = self.cwd_stack().top();
        self.apply_cwd(current.as_deref())?;
        Ok(popped)
    }

    /// Forgets every working directory.
    fn reset_cwd(&self) -> Result<()> {
        self.cwd_stack().clear();
        self.apply_cwd(None)
    }

    /// Backend-specific rewriting of a location before use, such as home
    /// directory expansion.
    fn expand(&self, location: &str) -> String {
        location.to_string()
    }

    /// Verifies that `path` belongs to this connection and returns the
    /// location string the backend should operate on.
    fn check_path(&self, path: &Path) -> Result<String> {
        if path.connection().id() != self.id() {
            return Err(FsError::InvalidPath(format!(
                "{} belongs to the {} connection, not {}",
                path.location(),
                path.connection().id(),
                self.id()
            )));
        }
        Ok(self.expand(path.location()))
    }

    fn name(&self, path: &Path) -> String {
        utils::base_name(&self.expand(path.location())).to_string()
    }

    /// The parent of `path`, or `None` when stripping the last component
    /// leaves the location unchanged.
    fn dir(&self, path: &Path) -> Option<Path> {
        let location = self.expand(path.location());
        let parent = utils::dir_name(&location);
        if parent == location {
            None
        } else {
            Some(Path::new(parent, path.connection().clone()))
        }
    }

    fn bare_name(&self, path: &Path) -> String {
        utils::split_ext(&self.name(path)).0.to_string()
    }

    /// The extension including its leading dot, or an empty string.
    fn extension(&self, path: &Path) -> String {
        utils::split_ext(&self.name(path)).1.to_string()
    }

    fn join(&self, base: &Path, element: &str) -> Path {
        let location = utils::join(&self.expand(base.location()), element);
        Path::new(location, base.connection().clone())
    }

    fn abs_path(&self, path: &Path) -> Result<Path> {
        Ok(Path::new(self.check_path(path)?, path.connection().clone()))
    }

    fn is_local(&self) -> bool {
        false
    }

    fn is_dir(&self, _path: &Path) -> Result<bool> {
        Err(FsError::unsupported("is_dir", self.kind()))
    }

    fn is_file(&self, _path: &Path) -> Result<bool> {
        Err(FsError::unsupported("is_file", self.kind()))
    }

    fn is_link(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.is_dir(path)? || self.is_file(path)?)
    }

    fn verify_exists(&self, path: &Path) -> Result<()> {
        if self.exists(path)? {
            Ok(())
        } else {
            Err(FsError::NotFound(self.check_path(path)?))
        }
    }

    fn verify_not_exists(&self, path: &Path) -> Result<()> {
        if self.is_dir(path)? {
            Err(FsError::IsADirectory(self.check_path(path)?))
        } else if self.exists(path)? {
            Err(FsError::FileExists(self.check_path(path)?))
        } else {
            Ok(())
        }
    }

    fn verify_is_file(&self, path: &Path) -> Result<()> {
        if self.is_file(path)? {
            Ok(())
        } else {
            Err(FsError::NotFound(self.check_path(path)?))
        }
    }

    fn verify_is_dir(&self, path: &Path) -> Result<()> {
        if self.is_dir(path)? {
            Ok(())
        } else {
            Err(FsError::NotADirectory(self.check_path(path)?))
        }
    }

    fn verify_is_not_dir(&self, path: &Path) -> Result<()> {
        if self.is_dir(path)? {
            Err(FsError::IsADirectory(self.check_path(path)?))
        } else {
            Ok(())
        }
    }

    fn size(&self, _path: &Path) -> Result<u64> {
        Err(FsError::unsupported("size", self.kind()))
    }

    fn modified_time(&self, _path: &Path) -> Result<SystemTime> {
        Err(FsError::unsupported("modified_time", self.kind()))
    }

    fn accessed_time(&self, path: &Path) -> Result<SystemTime> {
        self.modified_time(path)
    }

    fn metadata_changed_time(&self, path: &Path) -> Result<SystemTime> {
        self.modified_time(path)
    }

    fn protection_mode(&self, _path: &Path) -> Result<u32> {
        Err(FsError::unsupported("protection_mode", self.kind()))
    }

    fn inode_number(&self, _path: &Path) -> Result<u64> {
        Err(FsError::unsupported("inode_number", self.kind()))
    }

    fn device(&self, _path: &Path) -> Result<u64> {
        Err(FsError::unsupported("device", self.kind()))
    }

    fn hard_link_count(&self, _path: &Path) -> Result<u64> {
        Err(FsError::unsupported("hard_link_count", self.kind()))
    }

    fn owner_user_id(&self, _path: &Path) -> Result<u32> {
        Err(FsError::unsupported("owner_user_id", self.kind()))
    }

    fn owner_group_id(&self, _path: &Path) -> Result<u32> {
        Err(FsError::unsupported("owner_group_id", self.kind()))
    }

    /// Looks the path up in the working directory (when `include_cwd`) and
    /// then in each directory of `PATH`.
    fn find(&self, _path: &Path, _include_cwd: bool) -> Result<Option<Path>> {
        Err(FsError::unsupported("find", self.kind()))
    }

    /// Names of the children of the directory at `path` matching `pattern`.
    fn list(&self, _path: &Path, _pattern: &str) -> Result<Vec<String>> {
        Err(FsError::unsupported("list", self.kind()))
    }

    /// Paths of the children of the directory at `path` matching `pattern`.
    fn glob(&self, path: &Path, pattern: &str) -> Result<Vec<Path>> {
        self.verify_is_dir(path)?;
        Ok(self
            .list(path, pattern)?
            .iter()
            .map(|name| self.join(path, name))
            .collect())
    }

    fn open_file(&self, _path: &Path, _mode: OpenMode) -> Result<FileHandle> {
        Err(FsError::unsupported("open_file", self.kind()))
    }

    /// Iterates over the lines of a file. See [`Lines`].
    fn read(&self, path: &Path) -> Result<Lines> {
        self.verify_is_file(path)?;
        Ok(Lines::new(self.open_file(path, OpenMode::read())?))
    }

    fn load(&self, path: &Path) -> Result<Vec<String>> {
        self.read(path)?.collect()
    }

    fn read_delimited(&self, path: &Path, dialect: Dialect) -> Result<Records> {
        self.verify_is_file(path)?;
        Ok(Records::new(self.open_file(path, OpenMode::read())?, dialect))
    }

    fn load_delimited(&self, path: &Path, dialect: Dialect) -> Result<Vec<Vec<String>>> {
        self.read_delimited(path, dialect)?.collect()
    }

    /// Writes each line followed by `\n`, returning the number written.
    fn save(
        &self,
        path: &Path,
        lines: &mut dyn Iterator<Item = String>,
        mode: SaveMode,
    ) -> Result<usize> {
        ops::save(self, path, lines, mode)
    }

    /// Writes each row as a delimited record, returning the number written.
    fn save_delimited(
        &self,
        path: &Path,
        rows: &mut dyn Iterator<Item = Vec<String>>,
        dialect: Dialect,
        mode: SaveMode,
    ) -> Result<usize> {
        ops::save_delimited(self, path, rows, dialect, mode)
    }

    /// Whether the file could be opened for `access` right now.
    fn is_available(&self, path: &Path, access: Access) -> Result<bool> {
        ops::is_available(self, path, access)
    }

    /// Whether the size stays the same over `interval`
    /// (default [`DEFAULT_STABILITY_INTERVAL`]).
    fn is_stable(&self, path: &Path, interval: Option<Duration>) -> bool {
        ops::is_stable(self, path, interval)
    }

    /// Removes a file, or a directory with all of its contents.
    fn remove(&self, _path: &Path) -> Result<()> {
        Err(FsError::unsupported("remove", self.kind()))
    }

    /// Removes the path if it exists.
    fn discard(&self, path: &Path) -> Result<()> {
        if self.exists(path)? {
            self.remove(path)?;
        }
        Ok(())
    }

    /// Creates a single directory without any checks.
    fn create_dir(&self, _path: &Path) -> Result<()> {
        Err(FsError::unsupported("create_dir", self.kind()))
    }

    /// Creates a directory according to `options`. See [`DirOptions`].
    fn make_dir(&self, path: &Path, options: DirOptions) -> Result<()> {
        ops::make_dir(self, path, options)
    }

    /// Copies the bytes of a file to `destination` without any checks.
    fn raw_copy(&self, path: &Path, destination: &Path) -> Result<()> {
        ops::raw_copy(self, path, destination)
    }

    /// Copies a file or directory tree to `destination`.
    fn copy_to(&self, path: &Path, destination: &Path, options: DirOptions) -> Result<()> {
        ops::copy_to(self, path, destination, options)
    }

    /// Copies into the `destination` directory under the same name.
    fn copy_into(&self, path: &Path, destination: &Path, options: DirOptions) -> Result<()> {
        self.copy_to(path, &destination.join(&self.name(path)), options)
    }

    /// Copies to `destination`, then removes the source.
    fn move_to(&self, path: &Path, destination: &Path, options: DirOptions) -> Result<()> {
        ops::move_to(self, path, destination, options)
    }

    fn move_into(&self, path: &Path, destination: &Path, options: DirOptions) -> Result<()> {
        self.move_to(path, &destination.join(&self.name(path)), options)
    }

    /// Renames within the same directory.
    fn rename(&self, path: &Path, new_name: &str) -> Result<()> {
        ops::rename(self, path, new_name)
    }

    /// Finds the single file matching `pattern` in the directory at `path`.
    fn find_unique_file(
        &self,
        path: &Path,
        pattern: &str,
        most_recent: bool,
    ) -> Result<Option<Path>> {
        ops::find_unique_file(self, path, pattern, most_recent)
    }
}
