//! Open file handles and line iteration.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};

use crate::core::{FsError, Result};

/// Separator that splits a physical line into several logical lines.
pub const FORM_FEED: char = '\x0C';

/// An open file on any backend.
///
/// Handles are plain `Read + Write` streams with an explicit, fallible
/// `close`. Dropping a handle without closing it still releases it, but
/// errors raised while doing so (for example a failed upload) are only
/// logged.
pub trait FsFile: Read + Write + Send {
    /// Flushes pending data and releases the handle.
    fn close(self: Box<Self>) -> Result<()>;
}

/// A boxed, backend-independent file handle.
pub type FileHandle = Box<dyn FsFile>;

impl FsFile for File {
    fn close(mut self: Box<Self>) -> Result<()> {
        self.flush()?;
        Ok(())
    }
}

/// Iterator over the logical lines of a file.
///
/// Each physical line is stripped of its trailing `\r`/`\n` characters and
/// then split on form feeds. The handle is closed once the end is reached.
pub struct Lines {
    reader: Option<BufReader<FileHandle>>,
    pending: VecDeque<String>,
}

impl Lines {
    pub fn new(file: FileHandle) -> Self {
        Self {
            reader: Some(BufReader::new(file)),
            pending: VecDeque::new(),
        }
    }

    fn finish(&mut self) -> Option<Result<String>> {
        let reader = self.reader.take()?;
        reader.into_inner().close().err().map(Err)
    }
}

impl Iterator for Lines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(Ok(line));
            }
            let reader = self.reader.as_mut()?;
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => return self.finish(),
                Ok(_) => {
                    let line = line.trim_end_matches(['\r', '\n']);
                    self.pending
                        .extend(line.split(FORM_FEED).map(str::to_string));
                }
                Err(err) => {
                    self.reader = None;
                    return Some(Err(FsError::Io(err)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// In-memory handle used to feed `Lines`.
    struct Memory(Cursor<Vec<u8>>);

    impl Read for Memory {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Write for Memory {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl FsFile for Memory {
        fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn lines_of(text: &str) -> Vec<String> {
        let handle: FileHandle = Box::new(Memory(Cursor::new(text.as_bytes().to_vec())));
        Lines::new(handle).collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_strips_line_endings() {
        assert_eq!(lines_of("a\r\nb\nc"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_splits_form_feeds() {
        assert_eq!(lines_of("page1\x0Cpage2\nend\n"), vec!["page1", "page2", "end"]);
    }

    #[test]
    fn test_keeps_empty_lines() {
        assert_eq!(lines_of("\n\nx\n"), vec!["", "", "x"]);
        assert!(lines_of("").is_empty());
    }
}
