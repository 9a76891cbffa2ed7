//! Local disk backend.
//!
//! Locations are host paths. `~` and environment variables are expanded, and
//! relative locations resolve against the connection's working directory
//! when one is set (the process working directory otherwise). The process
//! working directory itself is never changed.

use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::Path as HostPath;
use std::sync::Arc;
use std::time::SystemTime;

use filetime::FileTime;

use crate::Path;
use crate::core::utils::{self, GlobPattern};
use crate::core::{
    BackendKind, ConnectionId, CwdStack, FileHandle, FsBackend, FsConnector, FsError, OpenMode,
    Result, ops,
};

/// Connector for the local file system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalConnector {
    initial_cwd: Option<String>,
}

impl LocalConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_cwd(cwd: impl Into<String>) -> Self {
        Self {
            initial_cwd: Some(cwd.into()),
        }
    }

    /// A new connection as a trait object. Local connections are always open.
    pub fn connection(&self) -> Arc<dyn FsBackend> {
        let connection = LocalConnection::default();
        if let Some(cwd) = &self.initial_cwd {
            connection.cwd.set(connection.expand(cwd));
        }
        Arc::new(connection)
    }
}

impl FsConnector for LocalConnector {
    type Connection = LocalConnection;

    fn initial_cwd(&self) -> Option<&str> {
        self.initial_cwd.as_deref()
    }

    fn new_connection(&self) -> Result<LocalConnection> {
        Ok(LocalConnection::default())
    }
}

/// A connection to the local file system.
#[derive(Debug, Default)]
pub struct LocalConnection {
    cwd: CwdStack,
}

fn io_error(err: std::io::Error, location: &str) -> FsError {
    match err.kind() {
        ErrorKind::NotFound => FsError::NotFound(location.to_string()),
        ErrorKind::AlreadyExists => FsError::FileExists(location.to_string()),
        _ => FsError::Io(err),
    }
}

fn to_string(host: &HostPath) -> String {
    host.to_string_lossy().into_owned()
}

impl LocalConnection {
    fn metadata(&self, path: &Path) -> Result<std::fs::Metadata> {
        let location = self.check_path(path)?;
        std::fs::metadata(&location).map_err(|err| io_error(err, &location))
    }

    #[cfg(unix)]
    fn unix_metadata<T>(
        &self,
        path: &Path,
        field: impl FnOnce(&std::fs::Metadata) -> T,
    ) -> Result<T> {
        Ok(field(&self.metadata(path)?))
    }

    #[cfg(unix)]
    fn make_writable(host: &HostPath, metadata: &std::fs::Metadata) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = metadata.permissions();
        permissions.set_mode(permissions.mode() | 0o200);
        std::fs::set_permissions(host, permissions)?;
        Ok(())
    }

    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    fn make_writable(host: &HostPath, metadata: &std::fs::Metadata) -> Result<()> {
        let mut permissions = metadata.permissions();
        permissions.set_readonly(false);
        std::fs::set_permissions(host, permissions)?;
        Ok(())
    }
}

impl FsBackend for LocalConnection {
    fn id(&self) -> ConnectionId {
        ConnectionId::shared(BackendKind::Local)
    }

    fn cwd_stack(&self) -> &CwdStack {
        &self.cwd
    }

    fn expand(&self, location: &str) -> String {
        let expanded = shellexpand::full(location)
            .map(Cow::into_owned)
            .unwrap_or_else(|_| location.to_string());
        match self.cwd.top() {
            Some(cwd) if !expanded.is_empty() && HostPath::new(&expanded).is_relative() => {
                to_string(&HostPath::new(&cwd).join(&expanded))
            }
            _ => expanded,
        }
    }

    fn abs_path(&self, path: &Path) -> Result<Path> {
        let location = self.check_path(path)?;
        let absolute = std::path::absolute(&location).map_err(|err| io_error(err, &location))?;
        Ok(Path::new(
            to_string(&utils::normalize(absolute)),
            path.connection().clone(),
        ))
    }

    fn is_local(&self) -> bool {
        true
    }

    fn is_dir(&self, path: &Path) -> Result<bool> {
        Ok(HostPath::new(&self.check_path(path)?).is_dir())
    }

    fn is_file(&self, path: &Path) -> Result<bool> {
        Ok(HostPath::new(&self.check_path(path)?).is_file())
    }

    fn is_link(&self, path: &Path) -> Result<bool> {
        Ok(HostPath::new(&self.check_path(path)?).is_symlink())
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(HostPath::new(&self.check_path(path)?).exists())
    }

    fn size(&self, path: &Path) -> Result<u64> {
        Ok(self.metadata(path)?.len())
    }

    fn modified_time(&self, path: &Path) -> Result<SystemTime> {
        Ok(self.metadata(path)?.modified()?)
    }

    fn accessed_time(&self, path: &Path) -> Result<SystemTime> {
        Ok(self.metadata(path)?.accessed()?)
    }

    #[cfg(unix)]
    fn metadata_changed_time(&self, path: &Path) -> Result<SystemTime> {
        use std::os::unix::fs::MetadataExt;
        use std::time::Duration;

        let metadata = self.metadata(path)?;
        let since_epoch = Duration::new(
            metadata.ctime().max(0) as u64,
            metadata.ctime_nsec().clamp(0, 999_999_999) as u32,
        );
        Ok(SystemTime::UNIX_EPOCH + since_epoch)
    }

    #[cfg(not(unix))]
    fn metadata_changed_time(&self, path: &Path) -> Result<SystemTime> {
        Ok(self.metadata(path)?.created()?)
    }

    #[cfg(unix)]
    fn protection_mode(&self, path: &Path) -> Result<u32> {
        use std::os::unix::fs::MetadataExt;
        self.unix_metadata(path, |m| m.mode())
    }

    #[cfg(unix)]
    fn inode_number(&self, path: &Path) -> Result<u64> {
        use std::os::unix::fs::MetadataExt;
        self.unix_metadata(path, |m| m.ino())
    }

    #[cfg(unix)]
    fn device(&self, path: &Path) -> Result<u64> {
        use std::os::unix::fs::MetadataExt;
        self.unix_metadata(path, |m| m.dev())
    }

    #[cfg(unix)]
    fn hard_link_count(&self, path: &Path) -> Result<u64> {
        use std::os::unix::fs::MetadataExt;
        self.unix_metadata(path, |m| m.nlink())
    }

    #[cfg(unix)]
    fn owner_user_id(&self, path: &Path) -> Result<u32> {
        use std::os::unix::fs::MetadataExt;
        self.unix_metadata(path, |m| m.uid())
    }

    #[cfg(unix)]
    fn owner_group_id(&self, path: &Path) -> Result<u32> {
        use std::os::unix::fs::MetadataExt;
        self.unix_metadata(path, |m| m.gid())
    }

    fn find(&self, path: &Path, include_cwd: bool) -> Result<Option<Path>> {
        let location = self.check_path(path)?;
        if include_cwd && HostPath::new(&location).exists() {
            return self.abs_path(path).map(Some);
        }
        let Some(search) = std::env::var_os("PATH") else {
            return Ok(None);
        };
        Ok(std::env::split_paths(&search)
            .map(|dir| dir.join(&location))
            .find(|candidate| candidate.exists())
            .map(|found| Path::new(to_string(&found), path.connection().clone())))
    }

    fn list(&self, path: &Path, pattern: &str) -> Result<Vec<String>> {
        self.verify_is_dir(path)?;
        let location = self.check_path(path)?;
        let pattern = GlobPattern::new(pattern)?;
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&location).map_err(|err| io_error(err, &location))? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if pattern.matches(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn open_file(&self, path: &Path, mode: OpenMode) -> Result<FileHandle> {
        self.verify_is_not_dir(path)?;
        let location = self.check_path(path)?;
        let file = mode
            .to_open_options()
            .open(&location)
            .map_err(|err| io_error(err, &location))?;
        Ok(Box::new(file))
    }

    /// Removes a file or directory tree. Write protection is lifted first;
    /// symbolic links are removed, never followed.
    fn remove(&self, path: &Path) -> Result<()> {
        let location = self.check_path(path)?;
        let host = HostPath::new(&location);
        let metadata = std::fs::symlink_metadata(host).map_err(|err| io_error(err, &location))?;
        if metadata.file_type().is_symlink() {
            std::fs::remove_file(host)?;
            return Ok(());
        }
        if metadata.permissions().readonly() {
            Self::make_writable(host, &metadata)?;
        }
        if metadata.is_dir() {
            for child in self.glob(path, "*")? {
                child.remove()?;
            }
            std::fs::remove_dir(host)?;
        } else {
            std::fs::remove_file(host)?;
        }
        Ok(())
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        let location = self.check_path(path)?;
        std::fs::create_dir(&location).map_err(|err| io_error(err, &location))
    }

    /// Native copy between local paths, preserving access and modification
    /// times. Other destinations go through file handles.
    fn raw_copy(&self, path: &Path, destination: &Path) -> Result<()> {
        if destination.connection().kind() != BackendKind::Local {
            return ops::raw_copy(self, path, destination);
        }
        let source = self.check_path(path)?;
        let target = destination.connection().check_path(destination)?;
        std::fs::copy(&source, &target).map_err(|err| io_error(err, &source))?;
        let metadata = std::fs::metadata(&source)?;
        filetime::set_file_times(
            &target,
            FileTime::from_last_access_time(&metadata),
            FileTime::from_last_modification_time(&metadata),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Access, CheckMode, DirOptions, SaveMode};
    use std::time::Duration;
    use tempdir::TempDir;

    fn setup_test_env() -> TempDir {
        TempDir::new("local_fs_test").unwrap()
    }

    fn root_of(temp_dir: &TempDir) -> Path {
        Path::new(
            temp_dir.path().to_string_lossy(),
            LocalConnector::new().connection(),
        )
    }

    fn write(path: &Path, content: &str) {
        std::fs::write(path.location(), content).unwrap();
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path.location()).unwrap()
    }

    mod paths {
        use super::*;

        #[test]
        fn test_expand_home() {
            let connection = LocalConnector::new().connection();
            if let Ok(home) = std::env::var("HOME") {
                let path = Path::new("~/notes.txt", connection.clone());
                assert_eq!(connection.check_path(&path).unwrap(), format!("{home}/notes.txt"));
                assert_eq!(path.location(), "~/notes.txt");
            }
        }

        #[test]
        fn test_relative_resolves_against_cwd() {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let connection = root.connection().clone();
            connection.set_cwd(&root).unwrap();

            let relative = Path::new("data.txt", connection.clone());
            assert_eq!(
                connection.check_path(&relative).unwrap(),
                format!("{}/data.txt", root.location())
            );
            assert_eq!(relative.abs().unwrap(), root.join("data.txt"));
        }

        #[test]
        fn test_abs_path_normalizes() {
            let connection = LocalConnector::new().connection();
            let path = Path::new("/a/./b/../c", connection);
            assert_eq!(path.abs().unwrap().location(), "/a/c");
        }

        #[test]
        fn test_initial_cwd() {
            let temp_dir = setup_test_env();
            let location = temp_dir.path().to_string_lossy().into_owned();
            let connector = LocalConnector::with_initial_cwd(location.clone());

            assert_eq!(connector.connection().cwd(), Some(location.clone()));
            let connection = connector.connect().unwrap();
            assert_eq!(connection.cwd(), Some(location));
        }
    }

    mod predicates {
        use super::*;

        #[test]
        fn test_file_and_dir() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let file = root.join("a.txt");
            write(&file, "x");

            assert!(root.is_dir()?);
            assert!(!root.is_file()?);
            assert!(file.is_file()?);
            assert!(file.exists()?);
            assert!(!root.join("missing").exists()?);
            assert!(root.is_local());
            Ok(())
        }

        #[test]
        fn test_verifications() {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let missing = root.join("missing");

            assert!(matches!(missing.verify_exists(), Err(FsError::NotFound(_))));
            assert!(matches!(
                root.verify_not_exists(),
                Err(FsError::IsADirectory(_))
            ));
            assert!(matches!(
                root.verify_is_not_dir(),
                Err(FsError::IsADirectory(_))
            ));
            assert!(matches!(
                missing.verify_is_dir(),
                Err(FsError::NotADirectory(_))
            ));
            assert!(missing.verify_not_exists().is_ok());
        }

        #[cfg(unix)]
        #[test]
        fn test_symlink() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let target = root.join("target");
            let link = root.join("link");
            std::fs::create_dir(target.location()).unwrap();
            std::os::unix::fs::symlink(target.location(), link.location()).unwrap();

            assert!(link.is_link()?);
            assert!(link.is_dir()?);
            assert!(!target.is_link()?);
            Ok(())
        }
    }

    mod metadata {
        use super::*;

        #[test]
        fn test_size_and_times() -> Result<()> {
            let temp_dir = setup_test_env();
            let file = root_of(&temp_dir).join("a.txt");
            write(&file, "hello");

            assert_eq!(file.size()?, 5);
            let modified = file.modified_time()?;
            assert!(modified <= SystemTime::now());
            assert!(file.accessed_time().is_ok());
            assert!(file.metadata_changed_time().is_ok());
            Ok(())
        }

        #[cfg(unix)]
        #[test]
        fn test_unix_fields() -> Result<()> {
            use std::os::unix::fs::PermissionsExt;

            let temp_dir = setup_test_env();
            let file = root_of(&temp_dir).join("a.txt");
            write(&file, "hello");
            std::fs::set_permissions(file.location(), PermissionsExt::from_mode(0o640)).unwrap();

            assert_eq!(file.protection_mode()? & 0o777, 0o640);
            assert_eq!(file.hard_link_count()?, 1);
            assert!(file.inode_number()? > 0);
            file.device()?;
            file.owner_user_id()?;
            file.owner_group_id()?;
            Ok(())
        }

        #[test]
        fn test_missing_file() {
            let temp_dir = setup_test_env();
            let missing = root_of(&temp_dir).join("missing");
            assert!(matches!(missing.size(), Err(FsError::NotFound(_))));
        }
    }

    mod listing {
        use super::*;

        #[test]
        fn test_list_sorted_and_filtered() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            for name in ["b.csv", "a.CSV", "c.txt"] {
                write(&root.join(name), "");
            }

            assert_eq!(root.list("*")?, vec!["a.CSV", "b.csv", "c.txt"]);
            assert_eq!(root.list("*.csv")?, vec!["a.CSV", "b.csv"]);
            assert_eq!(root.entry_count()?, 3);
            assert!(root.contains_name("c.txt")?);
            assert!(!root.contains_name("C.TXT")?);
            assert!(root.contains_path(&root.join("b.csv"))?);
            Ok(())
        }

        #[test]
        fn test_glob_matches_list() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            for name in ["x1.log", "x2.log", "y.log"] {
                write(&root.join(name), "");
            }

            let expected: Vec<Path> = root.list("x*")?.iter().map(|n| root.join(n)).collect();
            assert_eq!(root.glob("x*")?, expected);
            assert_eq!(expected.len(), 2);
            Ok(())
        }

        #[test]
        fn test_list_requires_directory() {
            let temp_dir = setup_test_env();
            let file = root_of(&temp_dir).join("a.txt");
            write(&file, "");
            assert!(matches!(file.list("*"), Err(FsError::NotADirectory(_))));
            assert!(file.children().unwrap().is_empty());
        }

        #[test]
        fn test_find_on_path() -> Result<()> {
            let connection = LocalConnector::new().connection();
            if cfg!(unix) {
                let found = Path::new("sh", connection).find(false)?;
                assert!(found.is_some_and(|p| p.name() == "sh"));
            }
            Ok(())
        }
    }

    mod io {
        use super::*;

        #[test]
        fn test_save_load_round_trip() -> Result<()> {
            let temp_dir = setup_test_env();
            let file = root_of(&temp_dir).join("lines.txt");
            let lines = vec!["first", "", "third\r\n"];

            assert_eq!(file.save(&lines, SaveMode::Create)?, 3);
            assert_eq!(file.load()?, vec!["first", "", "third"]);
            assert_eq!(read(&file), "first\n\nthird\n");
            Ok(())
        }

        #[test]
        fn test_save_modes() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let file = root.join("lines.txt");
            file.save(["a"], SaveMode::Create)?;

            assert!(matches!(
                file.save(["b"], SaveMode::Create),
                Err(FsError::FileExists(_))
            ));
            file.save(["b"], SaveMode::Append)?;
            assert_eq!(file.load()?, vec!["a", "b"]);
            file.save(["c"], SaveMode::Overwrite)?;
            assert_eq!(file.load()?, vec!["c"]);
            assert!(matches!(
                root.save(["c"], SaveMode::Overwrite),
                Err(FsError::IsADirectory(_))
            ));
            Ok(())
        }

        #[test]
        fn test_delimited_round_trip() -> Result<()> {
            let temp_dir = setup_test_env();
            let file = root_of(&temp_dir).join("table.csv");
            let rows = vec![vec!["id", "name"], vec!["1", "Smith, J."]];

            assert_eq!(file.save_delimited(&rows, Default::default(), SaveMode::Create)?, 2);
            assert_eq!(read(&file), "id,name\r\n1,\"Smith, J.\"\r\n");
            assert_eq!(file.load_delimited(Default::default())?, rows);
            Ok(())
        }

        #[test]
        fn test_read_missing_file() {
            let temp_dir = setup_test_env();
            let missing = root_of(&temp_dir).join("missing.txt");
            assert!(matches!(missing.load(), Err(FsError::NotFound(_))));
        }

        #[test]
        fn test_is_available() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let file = root.join("a.txt");
            let missing = root.join("missing.txt");
            write(&file, "x");

            assert!(file.is_available(Access::Read)?);
            assert!(file.is_available(Access::Write)?);
            assert!(missing.is_available(Access::Write)?);
            assert!(!missing.is_available(Access::Read)?);
            assert!(matches!(
                root.is_available(Access::Read),
                Err(FsError::IsADirectory(_))
            ));
            Ok(())
        }

        #[test]
        fn test_is_stable() {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let file = root.join("a.txt");
            write(&file, "x");

            assert!(file.is_stable(Some(Duration::from_millis(10))));
            assert!(!root.join("missing").is_stable(Some(Duration::from_millis(10))));
        }

        #[test]
        fn test_growing_file_is_not_stable() {
            use std::io::Write as _;
            use std::sync::Arc;
            use std::sync::atomic::{AtomicBool, Ordering};

            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let file = root.join("growing.log");
            write(&file, "start");

            let done = Arc::new(AtomicBool::new(false));
            let writer = {
                let done = done.clone();
                let location = file.location().to_string();
                std::thread::spawn(move || {
                    let mut log = std::fs::OpenOptions::new()
                        .append(true)
                        .open(location)
                        .unwrap();
                    while !done.load(Ordering::Relaxed) {
                        log.write_all(b"more\n").unwrap();
                        log.flush().unwrap();
                        std::thread::sleep(Duration::from_millis(5));
                    }
                })
            };

            let stable = file.is_stable(Some(Duration::from_millis(200)));
            done.store(true, Ordering::Relaxed);
            writer.join().unwrap();
            assert!(!stable);
        }
    }

    mod remove {
        use super::*;

        #[test]
        fn test_remove_tree() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let tree = root.join("tree");
            std::fs::create_dir_all(tree.join("a/b").location()).unwrap();
            write(&tree.join("a/b/c.txt"), "c");

            tree.remove()?;
            assert!(!tree.exists()?);
            Ok(())
        }

        #[test]
        fn test_remove_read_only() -> Result<()> {
            let temp_dir = setup_test_env();
            let file = root_of(&temp_dir).join("locked.txt");
            write(&file, "x");
            let mut permissions = std::fs::metadata(file.location()).unwrap().permissions();
            permissions.set_readonly(true);
            std::fs::set_permissions(file.location(), permissions).unwrap();

            file.remove()?;
            assert!(!file.exists()?);
            Ok(())
        }

        #[test]
        fn test_remove_missing_and_discard() {
            let temp_dir = setup_test_env();
            let missing = root_of(&temp_dir).join("missing");
            assert!(matches!(missing.remove(), Err(FsError::NotFound(_))));
            assert!(missing.discard().is_ok());
        }
    }

    mod make_dir {
        use super::*;

        #[test]
        fn test_fill_creates_parents() -> Result<()> {
            let temp_dir = setup_test_env();
            let nested = root_of(&temp_dir).join("a/b/c");

            nested.make_dir(DirOptions::new())?;
            assert!(nested.is_dir()?);
            Ok(())
        }

        #[test]
        fn test_without_fill_requires_parent() {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let nested = root.join("a/b");

            let result = nested.make_dir(DirOptions::new().fill(false));
            assert!(matches!(result, Err(FsError::NotADirectory(ref p)) if *p == root.join("a").to_string()));
            assert!(!root.join("a").exists().unwrap());
        }

        #[test]
        fn test_clear_requires_overwrite() -> Result<()> {
            let temp_dir = setup_test_env();
            let dir = root_of(&temp_dir).join("full");
            std::fs::create_dir(dir.location()).unwrap();
            write(&dir.join("keep.txt"), "x");

            let result = dir.make_dir(DirOptions::new().clear(true));
            assert!(matches!(result, Err(FsError::DirectoryNotEmpty(_))));
            assert!(dir.join("keep.txt").exists()?);

            dir.make_dir(DirOptions::new().clear(true).overwrite(true))?;
            assert!(dir.is_dir()?);
            assert_eq!(dir.entry_count()?, 0);
            Ok(())
        }

        #[test]
        fn test_existing_directory_is_kept() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            write(&root.join("keep.txt"), "x");

            root.make_dir(DirOptions::new())?;
            assert!(root.join("keep.txt").exists()?);
            Ok(())
        }

        #[test]
        fn test_file_in_the_way() -> Result<()> {
            let temp_dir = setup_test_env();
            let target = root_of(&temp_dir).join("target");
            write(&target, "x");

            assert!(matches!(
                target.make_dir(DirOptions::new()),
                Err(FsError::FileExists(_))
            ));
            target.make_dir(DirOptions::new().overwrite(true))?;
            assert!(target.is_dir()?);
            Ok(())
        }

        #[test]
        fn test_check_only_changes_nothing() -> Result<()> {
            let temp_dir = setup_test_env();
            let nested = root_of(&temp_dir).join("a/b");

            nested.make_dir(DirOptions::new().mode(CheckMode::CheckOnly))?;
            assert!(!nested.exists()?);
            assert!(!nested.dir().unwrap().exists()?);
            Ok(())
        }
    }

    mod copy {
        use super::*;

        #[test]
        fn test_copy_file_preserves_content_and_mtime() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let source = root.join("a.txt");
            let target = root.join("out/b.txt");
            write(&source, "payload");
            let old = FileTime::from_unix_time(1_000_000_000, 0);
            filetime::set_file_mtime(source.location(), old).unwrap();

            source.copy_to(&target, DirOptions::new())?;
            assert_eq!(read(&target), "payload");
            assert_eq!(read(&source), "payload");
            let copied = std::fs::metadata(target.location()).unwrap();
            assert_eq!(FileTime::from_last_modification_time(&copied), old);
            Ok(())
        }

        #[test]
        fn test_copy_onto_itself() {
            let temp_dir = setup_test_env();
            let file = root_of(&temp_dir).join("a.txt");
            write(&file, "x");
            assert!(matches!(
                file.copy_to(&file, DirOptions::new().overwrite(true)),
                Err(FsError::FileExists(_))
            ));
        }

        #[test]
        fn test_conflict_is_detected_before_copying() {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let source = root.join("src");
            let target = root.join("dst");
            std::fs::create_dir(source.location()).unwrap();
            std::fs::create_dir(target.location()).unwrap();
            write(&source.join("a.txt"), "a");
            write(&source.join("b.txt"), "b");
            write(&target.join("b.txt"), "old");

            let result = source.copy_to(&target, DirOptions::new());
            assert!(matches!(result, Err(FsError::FileExists(_))));
            assert!(!target.join("a.txt").exists().unwrap());
            assert_eq!(read(&target.join("b.txt")), "old");
        }

        #[test]
        fn test_copy_tree_with_overwrite() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let source = root.join("src");
            let target = root.join("dst");
            std::fs::create_dir_all(source.join("sub").location()).unwrap();
            std::fs::create_dir(target.location()).unwrap();
            write(&source.join("sub/a.txt"), "new");
            write(&target.join("extra.txt"), "kept");

            source.copy_to(&target, DirOptions::new().overwrite(true))?;
            assert_eq!(read(&target.join("sub/a.txt")), "new");
            assert!(target.join("extra.txt").exists()?);
            Ok(())
        }

        #[test]
        fn test_copy_into_itself() {
            let temp_dir = setup_test_env();
            let source = root_of(&temp_dir).join("src");
            std::fs::create_dir(source.location()).unwrap();
            assert!(matches!(
                source.copy_to(&source.join("inner"), DirOptions::new()),
                Err(FsError::InvalidPath(_))
            ));
        }

        #[test]
        fn test_copy_into_directory() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let source = root.join("a.txt");
            let target = root.join("box");
            write(&source, "a");
            std::fs::create_dir(target.location()).unwrap();

            source.copy_into(&target, DirOptions::new())?;
            assert_eq!(read(&target.join("a.txt")), "a");
            Ok(())
        }
    }

    mod moves {
        use super::*;

        #[test]
        fn test_move_file() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let source = root.join("a.txt");
            let target = root.join("moved/a.txt");
            write(&source, "content");

            source.move_to(&target, DirOptions::new())?;
            assert!(!source.exists()?);
            assert_eq!(read(&target), "content");
            Ok(())
        }

        #[test]
        fn test_move_check_only_keeps_source() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let source = root.join("a.txt");
            write(&source, "content");

            source.move_to(&root.join("b.txt"), DirOptions::new().mode(CheckMode::CheckOnly))?;
            assert!(source.exists()?);
            assert!(!root.join("b.txt").exists()?);
            Ok(())
        }

        #[test]
        fn test_rename_directory() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let dir = root.join("old");
            std::fs::create_dir_all(dir.join("sub").location()).unwrap();
            write(&dir.join("sub/x.txt"), "x");

            dir.rename("new")?;
            assert!(!dir.exists()?);
            assert_eq!(read(&root.join("new/sub/x.txt")), "x");
            Ok(())
        }

        #[test]
        fn test_rename_conflict_and_noop() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let a = root.join("a.txt");
            write(&a, "a");
            write(&root.join("b.txt"), "b");

            a.rename("a.txt")?;
            assert!(matches!(a.rename("b.txt"), Err(FsError::FileExists(_))));
            assert!(matches!(a.rename("x/y"), Err(FsError::InvalidPath(_))));
            assert_eq!(read(&a), "a");
            Ok(())
        }
    }

    mod find_unique_file {
        use super::*;

        fn touch(path: &Path, seconds: i64) {
            write(path, "");
            filetime::set_file_mtime(path.location(), FileTime::from_unix_time(seconds, 0)).unwrap();
        }

        #[test]
        fn test_single_and_none() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            touch(&root.join("report.csv"), 100);
            touch(&root.join("~$report.csv"), 200);

            assert_eq!(
                root.find_unique_file("*.csv", false)?,
                Some(root.join("report.csv"))
            );
            assert_eq!(root.find_unique_file("*.xls", false)?, None);
            Ok(())
        }

        #[test]
        fn test_directories_are_not_candidates() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            std::fs::create_dir(root.join("archive.csv").location()).unwrap();
            touch(&root.join("report.csv"), 100);

            assert_eq!(
                root.find_unique_file("*.csv", false)?,
                Some(root.join("report.csv"))
            );
            Ok(())
        }

        #[test]
        fn test_ambiguous_or_most_recent() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            touch(&root.join("a.csv"), 100);
            touch(&root.join("b.csv"), 300);
            touch(&root.join("c.csv"), 200);

            assert!(matches!(
                root.find_unique_file("*.csv", false),
                Err(FsError::AmbiguousMatch { .. })
            ));
            assert_eq!(
                root.find_unique_file("*.csv", true)?,
                Some(root.join("b.csv"))
            );
            Ok(())
        }

        #[test]
        fn test_requires_directory() {
            let temp_dir = setup_test_env();
            let file = root_of(&temp_dir).join("a.csv");
            touch(&file, 100);
            assert!(matches!(
                file.find_unique_file("*", true),
                Err(FsError::NotADirectory(_))
            ));
        }
    }

    mod cwd {
        use super::*;

        #[test]
        fn test_enter_restores_previous() -> Result<()> {
            let temp_dir = setup_test_env();
            let root = root_of(&temp_dir);
            let sub = root.join("sub");
            std::fs::create_dir(sub.location()).unwrap();
            let connection = root.connection().clone();

            {
                let _outer = root.enter()?;
                assert_eq!(connection.cwd().as_deref(), Some(root.location()));
                {
                    let _inner = sub.enter()?;
                    assert_eq!(connection.cwd().as_deref(), Some(sub.location()));
                    let relative = Path::new("x.txt", connection.clone());
                    assert_eq!(relative.abs()?, sub.join("x.txt"));
                }
                assert_eq!(connection.cwd().as_deref(), Some(root.location()));
            }
            assert_eq!(connection.cwd(), None);
            Ok(())
        }
    }
}
