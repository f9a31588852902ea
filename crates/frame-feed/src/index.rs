//! Timestamp-index file reader.
//!
//! An index file is a comma-separated text sequence of `timestamp_us,size,` records, one
//! per frame, in the same order as the payloads in the paired data file. Whitespace around
//! fields (including newlines between records) is ignored.
//!
//! The reader is sequential and lazy: it pulls one field at a time off a `BufRead`, so it
//! can sit on an open file while the feeder reads frame by frame. A malformed or truncated
//! record ends the sequence, exactly like reaching end-of-file.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// One `(timestamp_us, size)` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    pub timestamp_us: i64,
    pub size: usize,
}

/// Sequential reader over index records.
#[derive(Debug)]
pub struct IndexReader<R> {
    inner: R,
    field: Vec<u8>,
}

impl IndexReader<BufReader<File>> {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> IndexReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            field: Vec::with_capacity(24),
        }
    }

    fn next_field(&mut self) -> io::Result<Option<i64>> {
        self.field.clear();
        if self.inner.read_until(b',', &mut self.field)? == 0 {
            return Ok(None);
        }
        if self.field.last() == Some(&b',') {
            self.field.pop();
        }
        let value = std::str::from_utf8(&self.field)
            .ok()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<i64>().ok());
        Ok(value)
    }

    /// Next record, or `None` at end of file or on the first malformed record.
    pub fn next_record(&mut self) -> io::Result<Option<IndexRecord>> {
        let Some(timestamp_us) = self.next_field()? else {
            return Ok(None);
        };
        let Some(size) = self.next_field()? else {
            return Ok(None);
        };
        let Ok(size) = usize::try_from(size) else {
            return Ok(None);
        };
        Ok(Some(IndexRecord { timestamp_us, size }))
    }
}

/// Aggregate view of a whole index file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub records: usize,
    pub first_timestamp_us: Option<i64>,
    pub max_timestamp_us: Option<i64>,
}

impl IndexSummary {
    /// Scan an index file from the start. `Ok(None)` if the file does not exist.
    pub fn scan(path: &Path) -> io::Result<Option<Self>> {
        let mut reader = match IndexReader::open(path) {
            Ok(r) => r,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        Self::from_reader(&mut reader).map(Some)
    }

    pub fn from_reader<R: BufRead>(reader: &mut IndexReader<R>) -> io::Result<Self> {
        let mut summary = IndexSummary::default();
        while let Some(record) = reader.next_record()? {
            summary.records += 1;
            summary.first_timestamp_us.get_or_insert(record.timestamp_us);
            summary.max_timestamp_us = Some(
                summary
                    .max_timestamp_us
                    .map_or(record.timestamp_us, |m| m.max(record.timestamp_us)),
            );
        }
        Ok(summary)
    }
}
