//! Delimited (CSV-style) records.

use std::io::{BufRead, BufReader};

use crate::core::{FileHandle, Result};

/// Field delimiter and quote character of a delimited file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: char,
    pub quote: char,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
        }
    }
}

impl Dialect {
    pub fn new(delimiter: char, quote: char) -> Self {
        Self { delimiter, quote }
    }

    /// Formats one row, quoting only fields that need it, terminated by `\r\n`.
    pub fn format_row<S: AsRef<str>>(&self, fields: &[S]) -> String {
        let mut row = String::new();
        if let [only] = fields {
            if only.as_ref().is_empty() {
                // A lone empty field would otherwise read back as a blank line.
                row.push(self.quote);
                row.push(self.quote);
                row.push_str("\r\n");
                return row;
            }
        }
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                row.push(self.delimiter);
            }
            let field = field.as_ref();
            let needs_quotes = field
                .chars()
                .any(|c| c == self.delimiter || c == self.quote || c == '\r' || c == '\n');
            if needs_quotes {
                row.push(self.quote);
                for c in field.chars() {
                    if c == self.quote {
                        row.push(self.quote);
                    }
                    row.push(c);
                }
                row.push(self.quote);
            } else {
                row.push_str(field);
            }
        }
        row.push_str("\r\n");
        row
    }
}

/// Iterator over the records of a delimited file. Blank lines yield empty
/// records. The handle is closed once the end is reached.
pub struct Records {
    reader: Option<BufReader<FileHandle>>,
    dialect: Dialect,
}

impl Records {
    pub fn new(file: FileHandle, dialect: Dialect) -> Self {
        Self {
            reader: Some(BufReader::new(file)),
            dialect,
        }
    }

    fn read_record(&mut self) -> Result<Option<Vec<String>>> {
        let Dialect { delimiter, quote } = self.dialect;
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let mut fields = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut at_field_start = true;
        let mut has_data = false;

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                if let Some(reader) = self.reader.take() {
                    reader.into_inner().close()?;
                }
                if !has_data && fields.is_empty() {
                    return Ok(None);
                }
                fields.push(field);
                return Ok(Some(fields));
            }

            let mut chars = line.chars().peekable();
            while let Some(c) = chars.next() {
                if in_quotes {
                    if c == quote {
                        if chars.peek() == Some(&quote) {
                            chars.next();
                            field.push(quote);
                        } else {
                            in_quotes = false;
                        }
                    } else {
                        field.push(c);
                    }
                    continue;
                }
                match c {
                    '\r' | '\n' => {
                        if !has_data {
                            return Ok(Some(Vec::new()));
                        }
                        fields.push(field);
                        return Ok(Some(fields));
                    }
                    c if c == delimiter => {
                        has_data = true;
                        fields.push(std::mem::take(&mut field));
                        at_field_start = true;
                    }
                    c if c == quote && at_field_start => {
                        has_data = true;
                        in_quotes = true;
                        at_field_start = false;
                    }
                    c => {
                        has_data = true;
                        at_field_start = false;
                        field.push(c);
                    }
                }
            }
            if !in_quotes {
                // Last line of the file without a terminator.
                fields.push(field);
                return Ok(Some(fields));
            }
        }
    }
}

impl Iterator for Records {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_record() {
            Ok(record) => record.map(Ok),
            Err(err) => {
                self.reader = None;
                Some(Err(err))
            }
        }
    }
}
