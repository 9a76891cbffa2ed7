//! `Path`: a location bound to the connection that serves it.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{BitAnd, Div};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::warn;

use crate::core::{
    Access, Dialect, DirOptions, FileHandle, FsBackend, FsError, Lines, OpenMode, Records,
    Result, SaveMode,
};

/// A location on a particular connection.
///
/// Every operation delegates to the connection, so the same code works on
/// local, FTP, HTTP and stdio paths.
///
/// # Ordering
///
/// Paths are ordered by **containment**, not lexically: `a < b` means `a` is
/// a strict ancestor of `b`. Unrelated paths, and paths on different
/// connections, are incomparable (`partial_cmp` returns `None`), so this
/// ordering must not be used to sort paths.
///
/// # Equality
///
/// Two paths are equal when both the location strings and the connections
/// are equal. Hashing uses the location only.
#[derive(Clone)]
pub struct Path {
    location: String,
    connection: Arc<dyn FsBackend>,
}

impl Path {
    /// Creates a path. Trailing separators are stripped: a non-empty
    /// location with an empty name is replaced by its parent.
    pub fn new(location: impl Into<String>, connection: Arc<dyn FsBackend>) -> Self {
        let mut path = Self {
            location: location.into(),
            connection,
        };
        if !path.location.is_empty() && path.name().is_empty() {
            if let Some(parent) = path.dir() {
                path.location = parent.location;
            }
        }
        path
    }

    /// The location exactly as given (after trailing separator stripping).
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn connection(&self) -> &Arc<dyn FsBackend> {
        &self.connection
    }

    /// Whether both paths are served by the same connection.
    pub fn same_connection(&self, other: &Path) -> bool {
        self.connection.id() == other.connection.id()
    }

    // Path algebra

    pub fn name(&self) -> String {
        self.connection.name(self)
    }

    pub fn dir(&self) -> Option<Path> {
        self.connection.dir(self)
    }

    pub fn bare_name(&self) -> String {
        self.connection.bare_name(self)
    }

    pub fn extension(&self) -> String {
        self.connection.extension(self)
    }

    /// The child (or descendant) `element` of this path.
    pub fn join(&self, element: &str) -> Path {
        self.connection.join(self, element)
    }

    pub fn abs(&self) -> Result<Path> {
        self.connection.abs_path(self)
    }

    /// The element names from the outermost ancestor down to this path's
    /// name. An absolute path starts with its root location.
    pub fn split(&self) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current = Some(self.clone());
        while let Some(path) = current {
            if path.location.is_empty() {
                break;
            }
            match path.dir() {
                Some(parent) => {
                    pieces.push(path.name());
                    current = Some(parent);
                }
                None => {
                    pieces.push(path.location);
                    current = None;
                }
            }
        }
        pieces.reverse();
        pieces
    }

    /// Whether `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        if !self.same_connection(other) || self.location.len() >= other.location.len() {
            return false;
        }
        let mut current = other.dir();
        while let Some(candidate) = current {
            if candidate.location.len() < self.location.len() {
                return false;
            }
            if candidate.location == self.location {
                return true;
            }
            current = candidate.dir();
        }
        false
    }

    /// The deepest path that is an ancestor of (or equal to) both paths.
    pub fn common_ancestor(&self, other: &Path) -> Option<Path> {
        if !self.same_connection(other) {
            return None;
        }
        let mut mine = self.clone();
        let mut theirs = other.clone();
        while mine.location != theirs.location {
            match mine.location.len().cmp(&theirs.location.len()) {
                Ordering::Greater => mine = mine.dir()?,
                Ordering::Less => theirs = theirs.dir()?,
                Ordering::Equal => {
                    mine = mine.dir()?;
                    theirs = theirs.dir()?;
                }
            }
        }
        Some(mine)
    }

    /// This path expressed relative to `base`, using `..` to climb out of
    /// `base` where needed.
    ///
    /// # Returns
    ///
    /// * `Err(FsError::InvalidPath)` - if the paths have no common ancestor.
    pub fn relative_to(&self, base: &Path) -> Result<Path> {
        let mine = self.abs()?;
        let theirs = base.abs()?;
        let shared = mine.common_ancestor(&theirs).ok_or_else(|| {
            FsError::InvalidPath(format!("{mine} and {theirs} share no ancestor"))
        })?;
        let depth = shared.split().len();
        let mut pieces = vec!["..".to_string(); theirs.split().len() - depth];
        pieces.extend(mine.split().into_iter().skip(depth));
        let start = Path::new("", self.connection.clone());
        Ok(pieces.iter().fold(start, |path, piece| path.join(piece)))
    }

    // Listing

    pub fn list(&self, pattern: &str) -> Result<Vec<String>> {
        self.connection.list(self, pattern)
    }

    pub fn glob(&self, pattern: &str) -> Result<Vec<Path>> {
        self.connection.glob(self, pattern)
    }

    /// The children of a directory; empty for anything else.
    pub fn children(&self) -> Result<Vec<Path>> {
        if self.is_dir()? {
            self.glob("*")
        } else {
            Ok(Vec::new())
        }
    }

    /// Number of entries in the directory.
    pub fn entry_count(&self) -> Result<usize> {
        Ok(self.list("*")?.len())
    }

    /// Whether the directory has a child with exactly this name, or a child
    /// equal to the path `name` joins to.
    pub fn contains_name(&self, name: &str) -> Result<bool> {
        if self.list("*")?.iter().any(|child| child == name) {
            return Ok(true);
        }
        Ok(self.glob("*")?.contains(&self.join(name)))
    }

    /// Whether `child` is a direct child of this directory.
    pub fn contains_path(&self, child: &Path) -> Result<bool> {
        Ok(self.glob("*")?.contains(child))
    }

    /// Top-down traversal of the tree rooted at this directory. Symbolic
    /// links to directories are listed but not entered.
    pub fn walk(&self) -> Walk {
        Walk::new(self.clone(), false)
    }

    pub fn walk_following_links(&self) -> Walk {
        Walk::new(self.clone(), true)
    }

    /// Makes this path the connection's working directory until the
    /// returned guard is dropped.
    pub fn enter(&self) -> Result<CwdGuard> {
        CwdGuard::enter(self)
    }

    // Predicates and verifications

    pub fn is_dir(&self) -> Result<bool> {
        self.connection.is_dir(self)
    }

    pub fn is_file(&self) -> Result<bool> {
        self.connection.is_file(self)
    }

    pub fn is_link(&self) -> Result<bool> {
        self.connection.is_link(self)
    }

    pub fn exists(&self) -> Result<bool> {
        self.connection.exists(self)
    }

    pub fn is_local(&self) -> bool {
        self.connection.is_local()
    }

    pub fn verify_exists(&self) -> Result<()> {
        self.connection.verify_exists(self)
    }

    pub fn verify_not_exists(&self) -> Result<()> {
        self.connection.verify_not_exists(self)
    }

    pub fn verify_is_file(&self) -> Result<()> {
        self.connection.verify_is_file(self)
    }

    pub fn verify_is_dir(&self) -> Result<()> {
        self.connection.verify_is_dir(self)
    }

    pub fn verify_is_not_dir(&self) -> Result<()> {
        self.connection.verify_is_not_dir(self)
    }

    pub fn find(&self, include_cwd: bool) -> Result<Option<Path>> {
        self.connection.find(self, include_cwd)
    }

    // Metadata

    pub fn size(&self) -> Result<u64> {
        self.connection.size(self)
    }

    pub fn modified_time(&self) -> Result<SystemTime> {
        self.connection.modified_time(self)
    }

    pub fn accessed_time(&self) -> Result<SystemTime> {
        self.connection.accessed_time(self)
    }

    pub fn metadata_changed_time(&self) -> Result<SystemTime> {
        self.connection.metadata_changed_time(self)
    }

    pub fn protection_mode(&self) -> Result<u32> {
        self.connection.protection_mode(self)
    }

    pub fn inode_number(&self) -> Result<u64> {
        self.connection.inode_number(self)
    }

    pub fn device(&self) -> Result<u64> {
        self.connection.device(self)
    }

    pub fn hard_link_count(&self) -> Result<u64> {
        self.connection.hard_link_count(self)
    }

    pub fn owner_user_id(&self) -> Result<u32> {
        self.connection.owner_user_id(self)
    }

    pub fn owner_group_id(&self) -> Result<u32> {
        self.connection.owner_group_id(self)
    }

    // File I/O

    pub fn open(&self, mode: OpenMode) -> Result<FileHandle> {
        self.connection.open_file(self, mode)
    }

    pub fn read(&self) -> Result<Lines> {
        self.connection.read(self)
    }

    pub fn load(&self) -> Result<Vec<String>> {
        self.connection.load(self)
    }

    pub fn read_delimited(&self, dialect: Dialect) -> Result<Records> {
        self.connection.read_delimited(self, dialect)
    }

    pub fn load_delimited(&self, dialect: Dialect) -> Result<Vec<Vec<String>>> {
        self.connection.load_delimited(self, dialect)
    }

    /// Writes `lines`, one per line, and returns how many were written.
    pub fn save<I, S>(&self, lines: I, mode: SaveMode) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut lines = lines.into_iter().map(|line| line.as_ref().to_string());
        self.connection.save(self, &mut lines, mode)
    }

    /// Writes `rows` as delimited records and returns how many were written.
    pub fn save_delimited<I, R, S>(&self, rows: I, dialect: Dialect, mode: SaveMode) -> Result<usize>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rows = rows.into_iter().map(|row| {
            row.into_iter()
                .map(|field| field.as_ref().to_string())
                .collect::<Vec<_>>()
        });
        self.connection.save_delimited(self, &mut rows, dialect, mode)
    }

    pub fn is_available(&self, access: Access) -> Result<bool> {
        self.connection.is_available(self, access)
    }

    pub fn is_stable(&self, interval: Option<Duration>) -> bool {
        self.connection.is_stable(self, interval)
    }

    // Mutation

    pub fn remove(&self) -> Result<()> {
        self.connection.remove(self)
    }

    pub fn discard(&self) -> Result<()> {
        self.connection.discard(self)
    }

    pub fn make_dir(&self, options: DirOptions) -> Result<()> {
        self.connection.make_dir(self, options)
    }

    pub fn raw_copy(&self, destination: &Path) -> Result<()> {
        self.connection.raw_copy(self, destination)
    }

    pub fn copy_to(&self, destination: &Path, options: DirOptions) -> Result<()> {
        self.connection.copy_to(self, destination, options)
    }

    pub fn copy_into(&self, destination: &Path, options: DirOptions) -> Result<()> {
        self.connection.copy_into(self, destination, options)
    }

    pub fn move_to(&self, destination: &Path, options: DirOptions) -> Result<()> {
        self.connection.move_to(self, destination, options)
    }

    pub fn move_into(&self, destination: &Path, options: DirOptions) -> Result<()> {
        self.connection.move_into(self, destination, options)
    }

    pub fn rename(&self, new_name: &str) -> Result<()> {
        self.connection.rename(self, new_name)
    }

    /// The single file in this directory matching `pattern`.
    ///
    /// Only files are candidates: matching directories and names starting
    /// with `~$` are skipped. With several candidates, `most_recent` picks
    /// the newest by modification time; otherwise the result is
    /// `AmbiguousMatch`.
    pub fn find_unique_file(&self, pattern: &str, most_recent: bool) -> Result<Option<Path>> {
        self.connection.find_unique_file(self, pattern, most_recent)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Path")
            .field(&self.location)
            .field(&self.connection.id())
            .finish()
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location && self.same_connection(other)
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location.hash(state);
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if self.is_ancestor_of(other) {
            Some(Ordering::Less)
        } else if other.is_ancestor_of(self) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl Div<&str> for &Path {
    type Output = Path;

    fn div(self, element: &str) -> Path {
        self.join(element)
    }
}

impl Div<&str> for Path {
    type Output = Path;

    fn div(self, element: &str) -> Path {
        self.join(element)
    }
}

impl BitAnd for &Path {
    type Output = Option<Path>;

    fn bitand(self, other: &Path) -> Option<Path> {
        self.common_ancestor(other)
    }
}

/// Restores the connection's previous working directory when dropped.
pub struct CwdGuard {
    connection: Arc<dyn FsBackend>,
    was_empty: bool,
}

impl CwdGuard {
    fn enter(path: &Path) -> Result<Self> {
        let connection = path.connection().clone();
        let was_empty = connection.cwd().is_none();
        connection.push_cwd(path)?;
        Ok(Self {
            connection,
            was_empty,
        })
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let restored = if self.was_empty {
            self.connection.reset_cwd()
        } else {
            self.connection.pop_cwd().map(|_| ())
        };
        if let Err(err) = restored {
            warn!(connection = %self.connection.id(), error = %err, "failed to restore working directory");
        }
    }
}

/// One directory visited by [`Walk`].
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub dir: Path,
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

/// Top-down iterator over a directory tree.
///
/// Errors listing a directory are yielded as `Err` items and the walk
/// continues with the remaining directories.
pub struct Walk {
    pending: Vec<Path>,
    follow_links: bool,
}

impl Walk {
    fn new(root: Path, follow_links: bool) -> Self {
        Self {
            pending: vec![root],
            follow_links,
        }
    }

    fn visit(&self, dir: &Path) -> Result<(WalkEntry, Vec<Path>)> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let mut descend = Vec::new();
        for name in dir.list("*")? {
            let child = dir.join(&name);
            if child.is_dir()? {
                if self.follow_links || !child.is_link()? {
                    descend.push(child);
                }
                dirs.push(name);
            } else {
                files.push(name);
            }
        }
        let entry = WalkEntry {
            dir: dir.clone(),
            dirs,
            files,
        };
        Ok((entry, descend))
    }
}

impl Iterator for Walk {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let dir = self.pending.pop()?;
        Some(self.visit(&dir).map(|(entry, descend)| {
            self.pending.extend(descend.into_iter().rev());
            entry
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LocalConnector, SaveMode, StdioConnector};
    use std::collections::HashSet;
    use tempdir::TempDir;

    fn local(location: &str) -> Path {
        Path::new(location, LocalConnector::new().connection())
    }

    mod algebra {
        use super::*;

        #[test]
        fn test_trailing_separator_is_stripped() {
            assert_eq!(local("/tmp/data/").location(), "/tmp/data");
            assert_eq!(local("/").location(), "/");
            assert_eq!(local("").location(), "");
        }

        #[test]
        fn test_name_parts() {
            let path = local("/srv/archive.tar.gz");
            assert_eq!(path.name(), "archive.tar.gz");
            assert_eq!(path.bare_name(), "archive.tar");
            assert_eq!(path.extension(), ".gz");
            assert_eq!(path.dir().unwrap(), local("/srv"));
            assert!(local("/").dir().is_none());
        }

        #[test]
        fn test_split() {
            assert_eq!(local("/a/b").split(), vec!["/", "a", "b"]);
            assert_eq!(local("a/b").split(), vec!["a", "b"]);
            assert!(local("").split().is_empty());
        }

        #[test]
        fn test_join_and_div() {
            let base = local("/a");
            assert_eq!((&base / "b").location(), "/a/b");
            assert_eq!((base.clone() / "b" / "c").location(), "/a/b/c");
            assert_eq!(base.join("/abs").location(), "/abs");
        }

        #[test]
        fn test_common_ancestor() {
            let a = local("/a/b/c");
            let b = local("/a/d");
            assert_eq!(a.common_ancestor(&b), Some(local("/a")));
            assert_eq!(&a & &b, Some(local("/a")));
            assert_eq!(&a & &a, Some(a.clone()));

            let stream = Path::new("stdout", StdioConnector.connection());
            assert!(a.common_ancestor(&stream).is_none());
        }

        #[test]
        fn test_relative_to() -> Result<()> {
            let path = local("/a/b/c");
            assert_eq!(path.relative_to(&local("/a/d"))?.location(), "../b/c");
            assert_eq!(path.relative_to(&local("/a"))?.location(), "b/c");
            assert_eq!(local("/a").relative_to(&local("/a/b/c"))?.location(), "../..");
            Ok(())
        }
    }

    mod ordering {
        use super::*;

        #[test]
        fn test_containment() {
            let parent = local("/a");
            let child = local("/a/b/c");
            assert!(parent < child);
            assert!(parent <= child);
            assert!(child > parent);
            assert!(parent <= parent.clone());
            assert_eq!(parent.partial_cmp(&parent.clone()), Some(Ordering::Equal));
        }

        #[test]
        fn test_unrelated_paths_are_incomparable() {
            let a = local("/a");
            let ab = local("/ab");
            assert_eq!(a.partial_cmp(&ab), None);
            assert!(!(a < ab) && !(a > ab) && a != ab);

            let stream = Path::new("/a/b", StdioConnector.connection());
            assert_eq!(a.partial_cmp(&stream), None);
        }
    }

    mod identity {
        use super::*;

        #[test]
        fn test_equality_includes_the_connection() {
            assert_eq!(local("/x"), local("/x"));
            assert_ne!(local("/x"), Path::new("/x", StdioConnector.connection()));
        }

        #[test]
        fn test_hash_and_display() {
            let set: HashSet<Path> = [local("/x"), local("/x"), local("/y")].into_iter().collect();
            assert_eq!(set.len(), 2);
            assert_eq!(local("/x").to_string(), "/x");
            assert_eq!(format!("{:?}", local("/x")), "Path(\"/x\", ConnectionId { kind: Local, session: None })");
        }
    }

    mod walking {
        use super::*;

        #[test]
        fn test_walk_top_down() -> Result<()> {
            let tmp = TempDir::new("walk")?;
            let root = local(&tmp.path().to_string_lossy());
            root.join("a.txt").save(["a"], SaveMode::Create)?;
            root.join("sub/deeper").make_dir(DirOptions::new())?;
            root.join("sub/b.txt").save(["b"], SaveMode::Create)?;

            let entries = root.walk().collect::<Result<Vec<_>>>()?;
            assert_eq!(entries.len(), 3);
            assert_eq!(entries[0].dir, root);
            assert_eq!(entries[0].dirs, vec!["sub"]);
            assert_eq!(entries[0].files, vec!["a.txt"]);
            assert_eq!(entries[1].dir, root.join("sub"));
            assert_eq!(entries[1].dirs, vec!["deeper"]);
            assert_eq!(entries[1].files, vec!["b.txt"]);
            assert!(entries[2].files.is_empty());
            Ok(())
        }

        #[test]
        fn test_walk_reports_errors() {
            let mut walk = local("/definitely/not/here").walk();
            assert!(walk.next().unwrap().is_err());
            assert!(walk.next().is_none());
        }

        #[test]
        fn test_children_and_counts() -> Result<()> {
            let tmp = TempDir::new("children")?;
            let root = local(&tmp.path().to_string_lossy());
            root.join("one.txt").save(["1"], SaveMode::Create)?;
            root.join("two.txt").save(["2"], SaveMode::Create)?;

            assert_eq!(root.entry_count()?, 2);
            assert!(root.contains_name("one.txt")?);
            assert!(!root.contains_name("ONE.TXT")?);
            let two = root.join("two.txt");
            assert!(root.contains_name(two.location())?);
            assert!(!root.contains_name(root.join("sub/two.txt").location())?);
            assert!(root.contains_path(&root.join("two.txt"))?);
            assert!(root.join("one.txt").children()?.is_empty());
            assert_eq!(root.children()?.len(), 2);
            Ok(())
        }
    }
}
