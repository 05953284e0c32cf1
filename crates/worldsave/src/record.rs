// Copyright (C) 2026 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The text format of world data files.
//!
//! A file is a sequence of named blocks:
//!
//! ```text
//! Item
//! {
//! 	Serial	0x40000001
//! 	ObjType	0x1f03
//! }
//!
//! ```
//!
//! Outside a block, blank lines and lines starting with `#` are ignored. Property values are kept
//! as text exactly as read, so a parsed record writes back byte for byte.

use std::fmt::{Display, Formatter};
use std::io::{self, BufRead, Write};
use std::str::FromStr;

/// The key every persisted entity carries.
pub const SERIAL_KEY: &str = "Serial";

/// Stable identity of a persisted entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Serial(pub u32);

impl Display for Serial {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for Serial {
    type Err = RecordError;

    /// Accepts `0x`-prefixed hex or plain decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => s.parse(),
        };
        parsed
            .map(Serial)
            .map_err(|_| RecordError::InvalidSerial(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("io error: {0} @ line {1}")]
    IoError(io::Error, usize),
    #[error("parse error @ line {0}: {1}")]
    ParseError(usize, String),
    #[error("invalid serial: {0:?}")]
    InvalidSerial(String),
    #[error("{kind} record is missing property {key}")]
    MissingProperty { kind: String, key: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    kind: String,
    properties: Vec<(String, String)>,
}

impl Record {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            properties: vec![],
        }
    }

    /// Builder form of [`Record::push`].
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    /// Append a property. Keys may repeat; order is preserved.
    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.properties.push((key.into(), value.to_string()));
    }

    /// Replace the first property named `key`, or append it.
    pub fn set(&mut self, key: &str, value: impl ToString) {
        match self
            .properties
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some((_, v)) => *v = value.to_string(),
            None => self.push(key, value),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The first value of `key`. Keys compare case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.properties
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    /// The record's serial, if it has one.
    pub fn serial(&self) -> Result<Option<Serial>, RecordError> {
        self.get(SERIAL_KEY).map(Serial::from_str).transpose()
    }

    pub fn require(&self, key: &str) -> Result<&str, RecordError> {
        self.get(key).ok_or_else(|| RecordError::MissingProperty {
            kind: self.kind.clone(),
            key: key.to_string(),
        })
    }
}

pub struct RecordWriter<W: Write> {
    writer: W,
    records: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    /// Write a `#` comment block, framed by bare `#` lines and followed by a blank line.
    pub fn write_comment_block<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<(), io::Error> {
        writeln!(self.writer, "#")?;
        for line in lines {
            match line.as_ref() {
                "" => writeln!(self.writer, "#")?,
                line => writeln!(self.writer, "#  {line}")?,
            }
        }
        writeln!(self.writer, "#\n")
    }

    /// Write one record. A record which would not read back as itself is refused with
    /// `InvalidInput` before anything is written.
    pub fn write_record(&mut self, record: &Record) -> Result<(), io::Error> {
        check_writable(record)?;
        writeln!(self.writer, "{}\n{{", record.kind)?;
        for (key, value) in &record.properties {
            writeln!(self.writer, "\t{key}\t{value}")?;
        }
        writeln!(self.writer, "}}\n")?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn records_written(&self) -> usize {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn check_writable(record: &Record) -> Result<(), io::Error> {
    let invalid = |what: String| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} record: {what}", record.kind.escape_debug()),
        )
    };
    let kind = record.kind.as_str();
    if kind.is_empty()
        || kind.trim() != kind
        || kind.contains(['\n', '\r'])
        || kind.starts_with('#')
    {
        return Err(invalid(format!("unwritable record type {kind:?}")));
    }
    for (key, value) in &record.properties {
        if key.is_empty()
            || key.contains(['\t', ' ', '\n', '\r'])
            || key.starts_with('#')
            || key.starts_with('}')
        {
            return Err(invalid(format!("unwritable property name {key:?}")));
        }
        if value.contains(['\n', '\r']) || value.starts_with(['\t', ' ']) {
            return Err(invalid(format!("unwritable value {value:?} for {key}")));
        }
    }
    Ok(())
}

pub struct RecordReader<R: BufRead> {
    line_num: usize,
    reader: R,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            line_num: 0,
            reader,
        }
    }

    fn read_next_line(&mut self) -> Result<Option<String>, RecordError> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .map_err(|e| RecordError::IoError(e, self.line_num))?;
        if n == 0 {
            return Ok(None);
        }
        self.line_num += 1;
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    fn is_filler(line: &str) -> bool {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    }

    /// Read the next record, or `None` at end of input.
    pub fn read_record(&mut self) -> Result<Option<Record>, RecordError> {
        let kind = loop {
            match self.read_next_line()? {
                None => return Ok(None),
                Some(line) if Self::is_filler(&line) => continue,
                Some(line) => break line.trim().to_string(),
            }
        };

        let opening = loop {
            match self.read_next_line()? {
                None => {
                    return Err(RecordError::ParseError(
                        self.line_num,
                        format!("end of input after record type {kind}"),
                    ));
                }
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
            }
        };
        if opening.trim() != "{" {
            return Err(RecordError::ParseError(
                self.line_num,
                format!("expected '{{' after {kind}, found {opening:?}"),
            ));
        }

        let mut record = Record::new(kind);
        loop {
            let Some(line) = self.read_next_line()? else {
                return Err(RecordError::ParseError(
                    self.line_num,
                    format!("unterminated {} record", record.kind),
                ));
            };
            let body = line.trim_start();
            if body == "}" || body.trim_end() == "}" {
                return Ok(Some(record));
            }
            if Self::is_filler(body) {
                continue;
            }
            let (key, value) = match body.find(['\t', ' ']) {
                Some(split) => (
                    &body[..split],
                    body[split..].trim_start_matches(['\t', ' ']),
                ),
                None => (body, ""),
            };
            record.push(key, value);
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}
