//! Storage layer: line-delimited JSON artifacts.
//!
//! Every pipeline stage reads and writes one JSON record per line. Readers
//! stream lazily and skip blank lines; writers serialize a record completely
//! before appending it, so a failed record never leaves a partial line.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: invalid record: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: invalid document: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True when the error concerns one record and later lines are still readable.
    pub fn is_record_level(&self) -> bool {
        matches!(self, StorageError::Parse { .. })
    }
}

/// A decoded record together with its 1-based line number.
#[derive(Debug, Clone, PartialEq)]
pub struct Line<T> {
    pub number: usize,
    pub value: T,
}

pub struct JsonlReader<T> {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    _record: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| StorageError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
            _record: PhantomData,
        })
    }
}

impl<T: DeserializeOwned> Iterator for JsonlReader<T> {
    type Item = Result<Line<T>, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = match self.lines.next()? {
                Ok(raw) => raw,
                Err(e) => return Some(Err(StorageError::io(&self.path, e))),
            };
            self.line_no += 1;
            if raw.trim().is_empty() {
                continue;
            }
            let parsed = serde_json::from_str(&raw)
                .map(|value| Line {
                    number: self.line_no,
                    value,
                })
                .map_err(|source| StorageError::Parse {
                    path: self.path.clone(),
                    line: self.line_no,
                    source,
                });
            return Some(parsed);
        }
    }
}

/// Appends one JSON record per line to a freshly truncated file.
pub struct JsonlWriter {
    path: PathBuf,
    out: BufWriter<File>,
    written: usize,
}

impl JsonlWriter {
    /// Creates (or truncates) the file, creating parent directories as needed.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| StorageError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn append<T: Serialize>(&mut self, record: &T) -> Result<(), StorageError> {
        let mut line = serde_json::to_string(record).map_err(StorageError::Encode)?;
        line.push('\n');
        self.out
            .write_all(line.as_bytes())
            .map_err(|e| StorageError::io(&self.path, e))?;
        self.written += 1;
        Ok(())
    }

    /// Flushes buffered records and returns how many were written.
    pub fn finish(mut self) -> Result<usize, StorageError> {
        self.out
            .flush()
            .map_err(|e| StorageError::io(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), records = self.written, "jsonl output flushed");
        Ok(self.written)
    }
}

/// Reads a whole file as a single JSON document.
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, StorageError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|source| StorageError::Document {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads every record of a JSONL file, failing on the first bad line.
pub fn read_all<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>, StorageError> {
    JsonlReader::open(path)?
        .map(|line| line.map(|l| l.value))
        .collect()
}
