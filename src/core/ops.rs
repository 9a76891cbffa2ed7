//! Generic implementations of the checked, recursive operations.
//!
//! These back the default methods of [`FsBackend`] and stay callable from
//! backends that override a method but still want the generic behavior for
//! some inputs.

use std::io::{BufWriter, Write};
use std::time::{Duration, SystemTime};

use tracing::{debug, info};

use crate::Path;
use crate::core::{
    Access, CheckMode, DEFAULT_STABILITY_INTERVAL, Dialect, DirOptions, FsBackend, FsError,
    OpenMode, Result, SaveMode,
};

/// Checks the target of a save: a new file for `Create`, a missing path or a
/// file otherwise.
fn prepare_save<B: FsBackend + ?Sized>(backend: &B, path: &Path, mode: SaveMode) -> Result<()> {
    match mode {
        SaveMode::Create => backend.verify_not_exists(path),
        SaveMode::Overwrite | SaveMode::Append => backend.verify_is_not_dir(path),
    }
}

fn write_and_close<B: FsBackend + ?Sized>(
    backend: &B,
    path: &Path,
    mode: SaveMode,
    chunks: &mut dyn Iterator<Item = String>,
) -> Result<usize> {
    let file = backend.open_file(path, mode.open_mode())?;
    let mut writer = BufWriter::new(file);
    let mut count = 0;
    for chunk in chunks {
        writer.write_all(chunk.as_bytes())?;
        count += 1;
    }
    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.close()?;
    Ok(count)
}

pub(crate) fn save<B: FsBackend + ?Sized>(
    backend: &B,
    path: &Path,
    lines: &mut dyn Iterator<Item = String>,
    mode: SaveMode,
) -> Result<usize> {
    prepare_save(backend, path, mode)?;
    let mut chunks = lines.map(|line| {
        let mut line = line.trim_end_matches(['\r', '\n']).to_string();
        line.push('\n');
        line
    });
    write_and_close(backend, path, mode, &mut chunks)
}

pub(crate) fn save_delimited<B: FsBackend + ?Sized>(
    backend: &B,
    path: &Path,
    rows: &mut dyn Iterator<Item = Vec<String>>,
    dialect: Dialect,
    mode: SaveMode,
) -> Result<usize> {
    prepare_save(backend, path, mode)?;
    let mut chunks = rows.map(|row| dialect.format_row(&row));
    write_and_close(backend, path, mode, &mut chunks)
}

pub(crate) fn is_available<B: FsBackend + ?Sized>(
    backend: &B,
    path: &Path,
    access: Access,
) -> Result<bool> {
    backend.check_path(path)?;
    if !backend.exists(path)? {
        return Ok(access == Access::Write);
    }
    backend.verify_is_not_dir(path)?;
    let mode = match access {
        Access::Read => OpenMode::read(),
        Access::Write => OpenMode::append(),
    };
    Ok(match backend.open_file(path, mode) {
        Ok(file) => file.close().is_ok(),
        Err(err) => {
            debug!(path = %path, error = %err, "file is not available");
            false
        }
    })
}

pub(crate) fn is_stable<B: FsBackend + ?Sized>(
    backend: &B,
    path: &Path,
    interval: Option<Duration>,
) -> bool {
    let Ok(initial) = backend.size(path) else {
        return false;
    };
    std::thread::sleep(interval.unwrap_or(DEFAULT_STABILITY_INTERVAL));
    matches!(backend.size(path), Ok(size) if size == initial)
}

/// Creates the directory at `path`.
///
/// # Arguments
///
/// * `path` - The directory to create.
/// * `options` - `overwrite` allows replacing a file and clearing a
///   non-empty directory, `clear` requires an existing directory to end up
///   empty, `fill` creates missing parents.
///
/// # Returns
///
/// * `Err(FsError::DirectoryNotEmpty)` - the directory exists, is not empty,
///   `clear` is set and `overwrite` is not.
/// * `Err(FsError::FileExists)` - a non-directory exists and `overwrite` is
///   not set.
/// * `Err(FsError::NotADirectory)` - the parent is missing and `fill` is not
///   set.
///
/// # Notes
///
/// Existing directories are kept. Parents are created with `clear = false`.
pub(crate) fn make_dir<B: FsBackend + ?Sized>(
    backend: &B,
    path: &Path,
    options: DirOptions,
) -> Result<()> {
    let location = backend.check_path(path)?;
    if options.mode == CheckMode::CheckThenCommit {
        backend.verify_open()?;
        return options.in_phases(|options| backend.make_dir(path, options));
    }
    let commit = options.commits();

    if backend.is_dir(path)? {
        if options.clear {
            let children = backend.glob(path, "*")?;
            if !children.is_empty() {
                if !options.overwrite {
                    return Err(FsError::DirectoryNotEmpty(location));
                }
                if commit {
                    for child in children {
                        child.remove()?;
                    }
                }
            }
        }
    } else if backend.exists(path)? {
        if !options.overwrite {
            return Err(FsError::FileExists(location));
        }
        if commit {
            backend.remove(path)?;
            backend.create_dir(path)?;
        }
    } else {
        let parent = backend
            .dir(path)
            .ok_or_else(|| FsError::NotADirectory(location.clone()))?;
        if !parent.is_dir()? {
            if !options.fill {
                return Err(FsError::NotADirectory(parent.to_string()));
            }
            parent.make_dir(options.clear(false))?;
        }
        if commit {
            backend.create_dir(path)?;
        }
    }
    Ok(())
}

/// Byte copy through the backends' file handles.
pub(crate) fn raw_copy<B: FsBackend + ?Sized>(
    backend: &B,
    path: &Path,
    destination: &Path,
) -> Result<()> {
    backend.check_path(path)?;
    let mut source = backend.open_file(path, OpenMode::parse("rb")?)?;
    let mut target = destination.open(OpenMode::parse("wb")?)?;
    std::io::copy(&mut source, &mut target)?;
    target.close()?;
    source.close()
}

/// Copies a file or directory tree.
///
/// # Returns
///
/// * `Err(FsError::NotFound)` - the source does not exist.
/// * `Err(FsError::FileExists)` - the destination is the source itself, or
///   a file exists there and `overwrite` is not set.
/// * `Err(FsError::IsADirectory)` - a file would replace a directory without
///   `overwrite`.
/// * `Err(FsError::InvalidPath)` - a directory would be copied into itself.
///
/// # Notes
///
/// Directories are merged into an existing destination according to
/// `options`; see [`make_dir`].
pub(crate) fn copy_to<B: FsBackend + ?Sized>(
    backend: &B,
    path: &Path,
    destination: &Path,
    options: DirOptions,
) -> Result<()> {
    if options.mode == CheckMode::CheckThenCommit {
        backend.verify_open()?;
        destination.connection().verify_open()?;
        return options.in_phases(|options| backend.copy_to(path, destination, options));
    }
    let commit = options.commits();
    let source = backend.abs_path(path)?;
    let destination = destination.abs()?;
    backend.verify_exists(path)?;

    if let Some(parent) = destination.dir() {
        parent.make_dir(options.clear(false))?;
    }

    if backend.is_dir(path)? {
        if source < destination {
            return Err(FsError::InvalidPath(format!(
                "cannot copy {source} into itself at {destination}"
            )));
        }
        let existed = destination.exists()?;
        destination.make_dir(options)?;
        // Children of a destination that does not exist yet cannot conflict.
        if commit || existed {
            for child in backend.glob(path, "*")? {
                child.copy_into(&destination, options)?;
            }
        }
    } else {
        backend.verify_is_file(path)?;
        if destination.exists()? {
            if source == destination {
                return Err(FsError::FileExists(destination.to_string()));
            }
            if !options.overwrite {
                return Err(if destination.is_dir()? {
                    FsError::IsADirectory(destination.to_string())
                } else {
                    FsError::FileExists(destination.to_string())
                });
            }
            if commit {
                destination.remove()?;
            }
        }
        if commit {
            backend.raw_copy(path, &destination)?;
        }
    }
    Ok(())
}

pub(crate) fn move_to<B: FsBackend + ?Sized>(
    backend: &B,
    path: &Path,
    destination: &Path,
    options: DirOptions,
) -> Result<()> {
    backend.copy_to(path, destination, options)?;
    if options.commits() {
        backend.remove(path)?;
    }
    Ok(())
}

pub(crate) fn rename<B: FsBackend + ?Sized>(backend: &B, path: &Path, new_name: &str) -> Result<()> {
    if new_name.is_empty() || new_name.contains('/') {
        return Err(FsError::InvalidPath(new_name.to_string()));
    }
    if backend.name(path) == new_name {
        return Ok(());
    }
    let parent = backend
        .dir(path)
        .ok_or_else(|| FsError::InvalidPath(path.to_string()))?;
    let options = DirOptions::new().overwrite(false).clear(true).fill(false);
    backend.move_to(path, &parent.join(new_name), options)
}

pub(crate) fn find_unique_file<B: FsBackend + ?Sized>(
    backend: &B,
    path: &Path,
    pattern: &str,
    most_recent: bool,
) -> Result<Option<Path>> {
    let location = backend.check_path(path)?;
    backend.verify_open()?;
    if !backend.is_dir(path)? {
        return Err(FsError::NotADirectory(location));
    }

    let mut candidates = Vec::new();
    for candidate in backend.glob(path, pattern)? {
        // Office lock files.
        if !candidate.name().starts_with("~$") && candidate.is_file()? {
            candidates.push(candidate);
        }
    }

    if candidates.is_empty() {
        info!(folder = %location, pattern, "no matching source file found");
        return Ok(None);
    }
    for candidate in &candidates {
        info!(path = %candidate, "source file identified");
    }
    if candidates.len() == 1 {
        return Ok(candidates.pop());
    }
    if !most_recent {
        return Err(FsError::AmbiguousMatch {
            pattern: pattern.to_string(),
            location,
        });
    }

    info!("multiple matching files; using the most recently modified one");
    let mut newest: Option<(SystemTime, Path)> = None;
    for candidate in candidates {
        let modified = candidate.modified_time()?;
        if newest.as_ref().is_none_or(|(time, _)| modified > *time) {
            newest = Some((modified, candidate));
        }
    }
    Ok(newest.map(|(_, path)| path))
}
