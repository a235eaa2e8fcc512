// Line-delimited JSON files of vector records, one file per news section

#[cfg(test)]
mod tests;

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::VectorRecord;
use crate::{RagError, Result};

const FILE_PREFIX: &str = "cnn_articles_";
const FILE_EXTENSION: &str = "jsonl";

/// File name the scraper writes a section's records to
#[inline]
pub fn section_file_name(section: &str) -> String {
    format!("{}{}.{}", FILE_PREFIX, section, FILE_EXTENSION)
}

/// Streams records into a JSONL file, replacing any previous content.
///
/// Lines go to `<path>.tmp` and the file is renamed over `path` by
/// [`JsonlWriter::finish`], so an aborted run leaves the previous file intact.
#[derive(Debug)]
pub struct JsonlWriter {
    path: PathBuf,
    temp_path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

/// Sibling path the writer fills before the rename
#[inline]
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

impl JsonlWriter {
    #[inline]
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = temp_path(path);
        let file = File::create(&temp_path)?;
        debug!("Writing records to {}", temp_path.display());

        Ok(Self {
            path: path.to_path_buf(),
            temp_path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    #[inline]
    pub fn write(&mut self, record: &VectorRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    #[inline]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush buffered lines, move the file into place and return the number
    /// of records written
    #[inline]
    pub fn finish(self) -> Result<usize> {
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.temp_path, &self.path)?;
        info!("Wrote {} records to {}", self.written, self.path.display());
        Ok(self.written)
    }
}

/// Write all records to `path`, replacing the file
#[inline]
pub fn write_records(path: &Path, records: &[VectorRecord]) -> Result<usize> {
    let mut writer = JsonlWriter::create(path)?;
    for record in records {
        writer.write(record)?;
    }
    writer.finish()
}

/// Read every record in a JSONL file. Blank lines are skipped.
#[inline]
pub fn read_records(path: &Path) -> Result<Vec<VectorRecord>> {
    read_records_limited(path, usize::MAX)
}

/// Read at most `limit` records from the start of a JSONL file
#[inline]
pub fn read_records_limited(path: &Path, limit: usize) -> Result<Vec<VectorRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        if records.len() >= limit {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record = serde_json::from_str(&line).map_err(|source| RagError::MalformedRecord {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        records.push(record);
    }

    debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// All `*.jsonl` files directly inside `dir`, sorted by name
#[inline]
pub fn list_jsonl_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(FILE_EXTENSION))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
