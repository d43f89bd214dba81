//! Persisted product table: read, merge with a new batch, write atomically
//!
//! The table is CSV, UTF-8 with a byte-order mark so spreadsheet tools pick
//! the right encoding. Missing cells are empty strings.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::PersistenceError;
use crate::types::ProductRecord;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Non-empty values of every identity field present in the header
    fn identity_values(&self, identity_fields: &[String]) -> HashSet<&str> {
        identity_fields
            .iter()
            .filter_map(|field| self.column(field))
            .flat_map(|col| self.rows.iter().filter_map(move |row| row.get(col)))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .collect()
    }

    fn add_missing_headers<'r>(&mut self, names: impl Iterator<Item = &'r str>) {
        for name in names {
            if self.column(name).is_none() {
                self.headers.push(name.to_string());
            }
        }
    }

    fn push_record(&mut self, record: &ProductRecord) {
        let row = self
            .headers
            .iter()
            .map(|h| record.get(h).unwrap_or_default().to_string())
            .collect();
        self.rows.push(row);
    }
}

/// Counts reported for one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Rows already in the table
    pub existing: usize,
    pub added: usize,
    /// New records dropped as duplicates
    pub skipped: usize,
    /// Rows in the merged table
    pub total: usize,
    /// Distinct identity values the batch shares with the table
    pub shared_identities: usize,
}

fn record_identities<'r>(
    record: &'r ProductRecord,
    identity_fields: &'r [String],
) -> impl Iterator<Item = &'r str> {
    identity_fields
        .iter()
        .filter_map(|field| record.get(field))
        .filter(|v| !v.is_empty())
}

/// Merge `records` into `existing`.
///
/// A new record is a duplicate when ANY of its identity values appears among
/// the values of ANY identity field in the existing table. Existing rows are
/// kept unchanged and first; surviving new records follow in batch order.
/// Columns only one side knows about are filled with empty strings.
pub fn merge(
    existing: Option<Table>,
    records: &[ProductRecord],
    identity_fields: &[String],
) -> (Table, MergeStats) {
    let Some(mut table) = existing else {
        let mut table = Table::default();
        for record in records {
            table.add_missing_headers(record.names());
        }
        for record in records {
            table.push_record(record);
        }
        let stats = MergeStats {
            existing: 0,
            added: records.len(),
            skipped: 0,
            total: table.len(),
            shared_identities: 0,
        };
        return (table, stats);
    };

    let existing_count = table.len();

    let (fresh, shared_identities) = {
        let known = table.identity_values(identity_fields);
        let fresh: Vec<&ProductRecord> = records
            .iter()
            .filter(|record| !record_identities(record, identity_fields).any(|v| known.contains(v)))
            .collect();
        let shared: HashSet<&str> = records
            .iter()
            .flat_map(|record| record_identities(record, identity_fields))
            .filter(|v| known.contains(v))
            .collect();
        (fresh, shared.len())
    };

    for record in &fresh {
        table.add_missing_headers(record.names());
    }
    let width = table.headers.len();
    for row in &mut table.rows {
        row.resize(width, String::new());
    }
    for record in &fresh {
        table.push_record(record);
    }

    let stats = MergeStats {
        existing: existing_count,
        added: fresh.len(),
        skipped: records.len() - fresh.len(),
        total: table.len(),
        shared_identities,
    };
    (table, stats)
}

/// Owns the table file for the length of a run
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the table. A missing file is `Ok(None)`, the normal first run.
    pub fn load(&self) -> Result<Option<Table>, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let content = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

        let read_err = |source| PersistenceError::Read {
            path: self.path.clone(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new().from_reader(content);
        let headers: Vec<String> = reader.headers().map_err(read_err)?.iter().map(String::from).collect();
        if headers.is_empty() {
            return Err(PersistenceError::MissingHeader {
                path: self.path.clone(),
            });
        }

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(read_err)?;
            rows.push(record.iter().map(String::from).collect());
        }

        Ok(Some(Table { headers, rows }))
    }

    /// Replace the table file with `table`. Either the whole table lands or
    /// the previous file is left as it was.
    pub fn commit(&self, table: &Table) -> Result<(), PersistenceError> {
        let io_err = |source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        };
        let write_err = |source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err)?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(UTF8_BOM).map_err(io_err)?;
        {
            let mut writer = csv::Writer::from_writer(&mut tmp);
            writer.write_record(&table.headers).map_err(write_err)?;
            for row in &table.rows {
                writer.write_record(row).map_err(write_err)?;
            }
            writer.flush().map_err(io_err)?;
        }
        tmp.as_file().sync_all().map_err(io_err)?;

        tmp.persist(&self.path).map_err(|source| PersistenceError::Persist {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Load, merge and commit in one step. Nothing is written when no new
    /// rows survive deduplication.
    pub fn merge_and_commit(
        &self,
        records: &[ProductRecord],
        identity_fields: &[String],
    ) -> Result<MergeStats, PersistenceError> {
        let existing = self.load()?;
        let (table, stats) = merge(existing, records, identity_fields);
        if stats.added > 0 {
            self.commit(&table)?;
        }
        Ok(stats)
    }
}
