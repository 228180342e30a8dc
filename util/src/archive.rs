//! Struct archiving functionality
//!
//! Archives are timestamped CSV files, one row per serialised record. Rows are buffered and
//! written out every [`FLUSH_INTERVAL`] records, on [`Archiver::flush`] and when the archiver is
//! dropped.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::path::Path;
use std::fs::{File, OpenOptions};
use csv::WriterBuilder;
pub use csv::Writer;
use serde::Serialize;
use thiserror::Error;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of records serialised between two flushes of the archive file.
pub const FLUSH_INTERVAL: usize = 250;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
#[derive(Default)]
pub struct Archiver {
    writer: Option<Writer<File>>,
    num_unflushed: usize
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while archiving.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot create the archive file: {0}")]
    CreateError(std::io::Error),

    #[error("Cannot write the record: {0}")]
    WriteError(csv::Error),

    #[error("Cannot flush the archive: {0}")]
    FlushError(std::io::Error),

    #[error("The archiver has not been initialised")]
    NotInitialised
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session, path: P
    ) -> Result<Self, ArchiveError> {
        let mut session_path = session.arch_root.clone();
        session_path.push(path);

        Self::from_file(session_path)
    }

    /// Create a new archiver writing to the given file. Any existing file is
    /// truncated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        // Create the parent directory if needed
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(ArchiveError::CreateError)?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(path)
            .map_err(ArchiveError::CreateError)?;

        let w = WriterBuilder::new()
            .has_headers(true)
            .from_writer(file);

        Ok(Self {
            writer: Some(w),
            num_unflushed: 0
        })
    }

    /// Serialise a record into the archive.
    pub fn serialise<T: Serialize>(
        &mut self, record: T
    ) -> Result<(), ArchiveError> {
        match self.writer {
            Some(ref mut w) => {
                w.serialize(record).map_err(ArchiveError::WriteError)?;
                self.num_unflushed += 1;
            },
            None => return Err(ArchiveError::NotInitialised)
        }

        if self.num_unflushed >= FLUSH_INTERVAL {
            self.flush()?;
        }

        Ok(())
    }

    /// Write any buffered records out to the archive file.
    pub fn flush(&mut self) -> Result<(), ArchiveError> {
        match self.writer {
            Some(ref mut w) => {
                w.flush().map_err(ArchiveError::FlushError)?;
                self.num_unflushed = 0;
                Ok(())
            },
            None => Err(ArchiveError::NotInitialised)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        time_s: f64,
        torque_nm: f64
    }

    #[test]
    fn test_archive_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telem/torque.csv");

        let mut arch = Archiver::from_file(&path).unwrap();
        arch.serialise(Row { time_s: 0.0, torque_nm: 0.5 }).unwrap();
        arch.serialise(Row { time_s: 0.002, torque_nm: 0.25 }).unwrap();
        arch.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["time_s,torque_nm", "0.0,0.5", "0.002,0.25"]);
    }

    #[test]
    fn test_archive_buffering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("torque.csv");
        let num_rows = |p: &std::path::Path| std::fs::read_to_string(p).unwrap().lines().count();

        let mut arch = Archiver::from_file(&path).unwrap();

        for i in 0..(FLUSH_INTERVAL - 1) {
            arch.serialise(Row { time_s: i as f64, torque_nm: 0.0 }).unwrap();
        }

        // Nothing reaches the file until the interval is complete
        assert_eq!(num_rows(&path), 0);

        arch.serialise(Row { time_s: 1e3, torque_nm: 0.0 }).unwrap();
        assert_eq!(num_rows(&path), FLUSH_INTERVAL + 1);

        // The remainder is written when the archiver is dropped
        arch.serialise(Row { time_s: 2e3, torque_nm: 1.0 }).unwrap();
        assert_eq!(num_rows(&path), FLUSH_INTERVAL + 1);

        drop(arch);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), FLUSH_INTERVAL + 2);
        assert_eq!(contents.lines().last(), Some("2000.0,1.0"));
    }

    #[test]
    fn test_default_archiver_errors() {
        let mut arch = Archiver::default();
        assert!(matches!(
            arch.serialise(Row { time_s: 0.0, torque_nm: 0.0 }),
            Err(ArchiveError::NotInitialised)
        ));
        assert!(matches!(arch.flush(), Err(ArchiveError::NotInitialised)));
    }
}
