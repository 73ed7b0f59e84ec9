//! Result store
//!
//! Append-only CSV file with a fixed four-column header. Every append is a
//! single write of one serialized row, so a crash can at worst leave a torn
//! last record, which is cut off before the next append.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};
use thiserror::Error;

use crate::consts::RESULT_COLUMNS;

/// One processed image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub image_path: String,
    pub language_detected: String,
    pub extracted_text: String,
    pub prediction: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("result store {path} is not readable as CSV: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("result store {path} has header [{found}], expected [{expected}]")]
    SchemaMismatch {
        path: PathBuf,
        found: String,
        expected: String,
    },

    #[error("result store {path} is damaged: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Position of the last record found in the file
struct TailRecord {
    /// 0 is the header line
    index: usize,
    /// Byte offset of the record's first byte
    start: u64,
    fields: usize,
    quotes_closed: bool,
}

/// CSV-backed append-only record sink
pub struct ResultStore {
    path: PathBuf,
    /// Held for the whole append so concurrent callers cannot interleave
    write_lock: Mutex<()>,
}

impl ResultStore {
    /// Open the store at `path`, creating it with a header if absent
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        };
        store.ensure_initialized()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    pub fn append(&self, record: &ClassificationRecord) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.ensure_initialized()?;
        self.repair_torn_tail()?;

        let row = serialize_row(record).map_err(|source| self.csv_err(source))?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_err(source))?;
        file.write_all(&row).map_err(|source| self.io_err(source))?;
        file.sync_data().map_err(|source| self.io_err(source))?;

        debug!("Appended record for {} to {}", record.image_path, self.path.display());
        Ok(())
    }

    /// All records, oldest first
    pub fn records(&self) -> Result<Vec<ClassificationRecord>, StoreError> {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() > 0 => {}
            Ok(_) => return Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(self.io_err(source)),
        }

        let mut reader = csv::Reader::from_path(&self.path).map_err(|source| self.csv_err(source))?;
        self.check_header(&mut reader)?;

        reader
            .deserialize()
            .collect::<Result<Vec<ClassificationRecord>, _>>()
            .map_err(|source| self.csv_err(source))
    }

    /// Number of stored records
    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records()?.len())
    }

    /// Create the header-only file if it is missing, otherwise verify the
    /// header.
    fn ensure_initialized(&self) -> Result<(), StoreError> {
        let has_content = fs::metadata(&self.path)
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if has_content {
            let mut reader =
                csv::Reader::from_path(&self.path).map_err(|source| self.csv_err(source))?;
            return self.check_header(&mut reader);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_err(source))?;
        }

        // Write header to a sibling temp file and rename it into place
        let mut header = csv::Writer::from_writer(Vec::new());
        header
            .write_record(RESULT_COLUMNS)
            .map_err(|source| self.csv_err(source))?;
        let header = header
            .into_inner()
            .map_err(|e| self.io_err(io::Error::other(e.to_string())))?;

        let tmp_path = self.path.with_extension("csv.tmp");
        {
            let mut tmp = File::create(&tmp_path).map_err(|source| self.io_err(source))?;
            tmp.write_all(&header).map_err(|source| self.io_err(source))?;
            tmp.sync_all().map_err(|source| self.io_err(source))?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|source| self.io_err(source))?;

        info!("Created result store at {}", self.path.display());
        Ok(())
    }

    fn check_header<R: Read>(&self, reader: &mut csv::Reader<R>) -> Result<(), StoreError> {
        let headers = reader.headers().map_err(|source| self.csv_err(source))?;
        if headers.iter().eq(RESULT_COLUMNS.iter().copied()) {
            return Ok(());
        }
        Err(StoreError::SchemaMismatch {
            path: self.path.clone(),
            found: headers.iter().collect::<Vec<_>>().join(","),
            expected: RESULT_COLUMNS.join(","),
        })
    }

    /// Make sure the file ends on a record boundary before appending.
    ///
    /// A final record that is complete but lacks its newline gets the
    /// newline back. A partial record (too few fields or an unterminated
    /// quoted field) is cut off at its first byte. The header line is never
    /// cut.
    fn repair_torn_tail(&self) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|source| self.io_err(source))?;

        let len = file.metadata().map_err(|source| self.io_err(source))?.len();
        if len == 0 {
            return Ok(());
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))
            .and_then(|_| file.read_exact(&mut last))
            .map_err(|source| self.io_err(source))?;
        if last[0] == b'\n' {
            return Ok(());
        }

        let mut content = Vec::with_capacity(len as usize);
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_to_end(&mut content))
            .map_err(|source| self.io_err(source))?;

        match self.last_record(&content)? {
            // Complete, only the terminator is missing (header included)
            Some(tail) if tail.fields == RESULT_COLUMNS.len() && tail.quotes_closed => {
                warn!(
                    "Result store {} is missing its final newline, restoring it",
                    self.path.display()
                );
                file.seek(SeekFrom::End(0))
                    .and_then(|_| file.write_all(b"\n"))
                    .map_err(|source| self.io_err(source))?;
            }
            Some(tail) if tail.index > 0 => {
                warn!(
                    "Result store {} ends with a partial record, dropping {} bytes",
                    self.path.display(),
                    len - tail.start
                );
                file.set_len(tail.start)
                    .map_err(|source| self.io_err(source))?;
            }
            _ => {
                return Err(StoreError::Corrupt {
                    path: self.path.clone(),
                    reason: "header line is incomplete".to_string(),
                });
            }
        }
        file.sync_data().map_err(|source| self.io_err(source))?;
        Ok(())
    }

    /// Locate the last CSV record in `content`, header included. Quoted
    /// fields may span lines, so this has to parse rather than search for
    /// newlines.
    fn last_record(&self, content: &[u8]) -> Result<Option<TailRecord>, StoreError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content);
        let mut record = csv::ByteRecord::new();
        let mut tail = None;
        let mut index = 0;
        while reader
            .read_byte_record(&mut record)
            .map_err(|source| self.csv_err(source))?
        {
            tail = Some((index, record.position().map(|p| p.byte()).unwrap_or(0), record.len()));
            index += 1;
        }

        Ok(tail.map(|(index, start, fields)| {
            // Escaped quotes come in pairs, so an odd count means the last
            // quoted field never ended
            let quotes = content[start as usize..]
                .iter()
                .filter(|&&b| b == b'"')
                .count();
            TailRecord {
                index,
                start,
                fields,
                quotes_closed: quotes % 2 == 0,
            }
        }))
    }

    fn io_err(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_err(&self, source: csv::Error) -> StoreError {
        StoreError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}

/// One CSV row, newline-terminated, no header
fn serialize_row(record: &ClassificationRecord) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.serialize(record)?;
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(io::Error::other(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(image: &str, text: &str) -> ClassificationRecord {
        ClassificationRecord {
            image_path: image.to_string(),
            language_detected: "te, en".to_string(),
            extracted_text: text.to_string(),
            prediction: "Fake".to_string(),
        }
    }

    #[test]
    fn creates_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results/predictions.csv");

        let store = ResultStore::open(&path).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "image_path,language_detected,extracted_text,prediction\n"
        );
        assert_eq!(store.count().unwrap(), 0);
        assert!(!dir.path().join("results/predictions.csv.tmp").exists());
    }

    #[test]
    fn append_adds_exactly_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path().join("p.csv")).unwrap();
        store.append(&record("a.png", "first")).unwrap();
        store.append(&record("b.png", "second")).unwrap();

        let r = record("c.png", "with, comma and \"quotes\"");
        store.append(&r).unwrap();

        let records = store.records().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records.last(), Some(&r));
    }

    #[test]
    fn duplicate_records_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path().join("p.csv")).unwrap();
        let r = record("same.png", "");

        store.append(&r).unwrap();
        store.append(&r).unwrap();

        assert_eq!(store.records().unwrap(), vec![r.clone(), r]);
    }

    #[test]
    fn reopening_keeps_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.csv");
        ResultStore::open(&path)
            .unwrap()
            .append(&record("a.png", "x"))
            .unwrap();

        let store = ResultStore::open(&path).unwrap();
        store.append(&record("b.png", "y")).unwrap();

        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn foreign_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.csv");
        fs::write(&path, "title,url\nfoo,bar\n").unwrap();

        assert!(matches!(
            ResultStore::open(&path),
            Err(StoreError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn torn_tail_is_dropped_before_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.csv");
        let store = ResultStore::open(&path).unwrap();
        store.append(&record("a.png", "ok")).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"b.png,en,half writ").unwrap();
        drop(file);

        store.append(&record("c.png", "after")).unwrap();

        let images = store
            .records()
            .unwrap()
            .into_iter()
            .map(|r| r.image_path)
            .collect::<Vec<_>>();
        assert_eq!(images, vec!["a.png", "c.png"]);
    }

    #[test]
    fn complete_record_without_newline_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.csv");
        fs::write(
            &path,
            "image_path,language_detected,extracted_text,prediction\nold.png,en,hello,Real",
        )
        .unwrap();
        let store = ResultStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        store.append(&record("a.png", "x")).unwrap();

        let images = store
            .records()
            .unwrap()
            .into_iter()
            .map(|r| r.image_path)
            .collect::<Vec<_>>();
        assert_eq!(images, vec!["old.png", "a.png"]);
    }

    #[test]
    fn header_without_newline_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.csv");
        fs::write(&path, "image_path,language_detected,extracted_text,prediction").unwrap();
        let store = ResultStore::open(&path).unwrap();

        store.append(&record("a.png", "x")).unwrap();

        assert_eq!(store.records().unwrap(), vec![record("a.png", "x")]);
        assert!(
            fs::read_to_string(&path)
                .unwrap()
                .starts_with("image_path,language_detected,extracted_text,prediction\n")
        );
    }

    #[test]
    fn torn_quoted_field_is_dropped_before_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.csv");
        let store = ResultStore::open(&path).unwrap();
        store.append(&record("a.png", "ok")).unwrap();

        // Interrupted inside a quoted field that spans lines
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"b.png,en,\"first line\nsecond, li").unwrap();
        drop(file);

        store.append(&record("c.png", "after")).unwrap();

        assert_eq!(
            store.records().unwrap(),
            vec![record("a.png", "ok"), record("c.png", "after")]
        );
    }

    #[test]
    fn unterminated_quote_in_last_field_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.csv");
        let store = ResultStore::open(&path).unwrap();
        store.append(&record("a.png", "ok")).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"b.png,en,text,\"Fa").unwrap();
        drop(file);

        store.append(&record("c.png", "after")).unwrap();

        assert_eq!(
            store.records().unwrap(),
            vec![record("a.png", "ok"), record("c.png", "after")]
        );
    }

    #[test]
    fn damaged_header_is_never_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.csv");
        let damaged = "image_path,language_detected,extracted_text,\"prediction";
        fs::write(&path, damaged).unwrap();

        let appended = ResultStore::open(&path).and_then(|store| store.append(&record("a.png", "x")));

        assert!(appended.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), damaged);
    }

    #[test]
    fn recreates_store_deleted_after_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.csv");
        let store = ResultStore::open(&path).unwrap();
        fs::remove_file(&path).unwrap();

        store.append(&record("a.png", "x")).unwrap();

        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(ResultStore::open(dir.path().join("p.csv")).unwrap());

        let handles = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        store.append(&record(&format!("{t}-{i}.png"), "text")).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.count().unwrap(), 40);
    }
}
