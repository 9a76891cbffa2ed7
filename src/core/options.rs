//! Option types for bulk operations, saving and opening files.

use std::fmt;
use std::fs::OpenOptions;
use std::str::FromStr;

use crate::core::{FsError, Result};

/// Controls which phases of a checked operation run.
///
/// `make_dir`, `copy_to` and `move_to` first verify that the whole operation
/// can be carried out and only then perform it. The check is advisory: the
/// file system may change between the phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckMode {
    /// Run the check phase, then the commit phase.
    #[default]
    CheckThenCommit,
    /// Only verify; nothing is modified.
    CheckOnly,
    /// Only perform; conflicts still raise errors as they are met.
    CommitOnly,
}

/// Policies for `make_dir`, `copy_to` and `move_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirOptions {
    /// Replace conflicting files and clear non-empty directories.
    pub overwrite: bool,
    /// Require an existing destination directory to end up empty.
    pub clear: bool,
    /// Create missing parent directories.
    pub fill: bool,
    pub mode: CheckMode,
}

impl Default for DirOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            clear: false,
            fill: true,
            mode: CheckMode::CheckThenCommit,
        }
    }
}

impl DirOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn clear(mut self, clear: bool) -> Self {
        self.clear = clear;
        self
    }

    pub fn fill(mut self, fill: bool) -> Self {
        self.fill = fill;
        self
    }

    pub fn mode(mut self, mode: CheckMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether this pass is allowed to modify the file system.
    pub fn commits(&self) -> bool {
        self.mode != CheckMode::CheckOnly
    }

    /// Runs `op` once per phase. `CheckThenCommit` becomes a `CheckOnly` pass
    /// followed by a `CommitOnly` pass; single-phase modes run `op` as is.
    pub(crate) fn in_phases<F>(self, mut op: F) -> Result<()>
    where
        F: FnMut(DirOptions) -> Result<()>,
    {
        match self.mode {
            CheckMode::CheckThenCommit => {
                op(self.mode(CheckMode::CheckOnly))?;
                op(self.mode(CheckMode::CommitOnly))
            }
            _ => op(self),
        }
    }
}

/// How `save` treats an existing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// The target must not exist.
    #[default]
    Create,
    /// Replace an existing file.
    Overwrite,
    /// Append to an existing file.
    Append,
}

impl SaveMode {
    pub fn open_mode(self) -> OpenMode {
        match self {
            SaveMode::Append => OpenMode::append(),
            SaveMode::Create | SaveMode::Overwrite => OpenMode::write(),
        }
    }
}

/// Kind of access probed by `is_available`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// A parsed file open mode in the familiar `r`, `w`, `a`, `x` letter form,
/// optionally followed by `+`, `b` or `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    primary: char,
    update: bool,
    binary: bool,
}

impl OpenMode {
    /// Parses a mode string.
    ///
    /// # Returns
    ///
    /// * `Err(FsError::UnsupportedMode)` - if the string is empty, has no
    ///   `r`/`w`/`a`/`x` letter, has more than one, or repeats a flag.
    pub fn parse(mode: &str) -> Result<Self> {
        let invalid = || FsError::UnsupportedMode(mode.to_string());
        let mut primary = None;
        let mut update = false;
        let mut binary = None;
        for c in mode.chars() {
            match c {
                'r' | 'w' | 'a' | 'x' if primary.is_none() => primary = Some(c),
                '+' if !update => update = true,
                'b' | 't' if binary.is_none() => binary = Some(c == 'b'),
                _ => return Err(invalid()),
            }
        }
        Ok(Self {
            primary: primary.ok_or_else(invalid)?,
            update,
            binary: binary.unwrap_or(false),
        })
    }

    pub fn read() -> Self {
        Self { primary: 'r', update: false, binary: false }
    }

    pub fn write() -> Self {
        Self { primary: 'w', update: false, binary: false }
    }

    pub fn append() -> Self {
        Self { primary: 'a', update: false, binary: false }
    }

    pub fn is_readable(&self) -> bool {
        self.primary == 'r' || self.update
    }

    pub fn is_writable(&self) -> bool {
        self.primary != 'r' || self.update
    }

    pub fn is_append(&self) -> bool {
        self.primary == 'a'
    }

    /// Whether opening discards existing content.
    pub fn truncates(&self) -> bool {
        self.primary == 'w'
    }

    /// Whether opening fails when the file already exists.
    pub fn is_exclusive(&self) -> bool {
        self.primary == 'x'
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// The same mode without the exclusive-create requirement. Used for
    /// local staging files that exist before they are opened.
    pub fn non_exclusive(self) -> Self {
        if self.primary == 'x' {
            Self { primary: 'w', ..self }
        } else {
            self
        }
    }

    pub fn to_open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(self.is_readable());
        match self.primary {
            'w' => {
                options.write(true).create(true).truncate(true);
            }
            'a' => {
                options.append(true).create(true);
            }
            'x' => {
                options.write(true).create_new(true);
            }
            _ => {
                options.write(self.update);
            }
        }
        options
    }
}

impl FromStr for OpenMode {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if self.update {
            write!(f, "+")?;
        }
        if self.binary {
            write!(f, "b")?;
        }
        Ok(())
    }
}
