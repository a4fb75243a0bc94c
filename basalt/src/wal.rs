//! The Write-Ahead Log.
//!
//! The log is a flat sequence of variable-length records:
//!
//! ```text
//! +----------------------------------------------+
//! | record type (1 byte)                         |
//! | transaction id (4 bytes)                     |
//! | record body (variable)                       |
//! | record start offset (8 bytes)                |
//! +----------------------------------------------+
//! ```
//!
//! Begin, Commit, and Abort bodies are empty. An Update body carries the
//! before page then the after page, each framed as
//! `i32 file_id, i32 page_no, PAGE_SIZE bytes of page image`; file ids are
//! resolved through the catalog. All integers are little-endian. The
//! trailing start offset lets a reader walk the log backwards.
//!
//! Appends land in an in-memory buffer and advance the logical offset;
//! `force` writes the buffer and fsyncs. Seeking forces first, so reads
//! never observe buffered bytes, and a writer that has been reading must
//! seek back to end-of-file before appending again.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use crate::catalog::{Catalog, FileId};
use crate::error::{DbError, Result};
use crate::heap_file::HeapFile;
use crate::heap_page::HeapPage;
use crate::transaction::TransactionId;
use crate::PAGE_SIZE;

/// Width of the trailing start-offset word.
const TRAILER_SIZE: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordKind {
    Abort = 0,
    Commit = 1,
    Update = 2,
    Begin = 3,
}

impl LogRecordKind {
    fn from_i8(raw: i8) -> Option<LogRecordKind> {
        match raw {
            0 => Some(LogRecordKind::Abort),
            1 => Some(LogRecordKind::Commit),
            2 => Some(LogRecordKind::Update),
            3 => Some(LogRecordKind::Begin),
            _ => None,
        }
    }
}

impl fmt::Display for LogRecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogRecordKind::Abort => "abort",
            LogRecordKind::Commit => "commit",
            LogRecordKind::Update => "update",
            LogRecordKind::Begin => "begin",
        };
        write!(f, "{}", name)
    }
}

/// A page image decoded from an update body, bound to the heap file the
/// catalog resolved for it.
#[derive(Debug, Clone)]
pub struct LoggedPage {
    pub file: Arc<HeapFile>,
    pub page: HeapPage,
}

/// One decoded log record. `offset` is the record's start position.
#[derive(Debug, Clone)]
pub enum LogRecord {
    Begin {
        tid: TransactionId,
        offset: u64,
    },
    Commit {
        tid: TransactionId,
        offset: u64,
    },
    Abort {
        tid: TransactionId,
        offset: u64,
    },
    Update {
        tid: TransactionId,
        before: LoggedPage,
        after: LoggedPage,
        offset: u64,
    },
}

impl LogRecord {
    pub fn tid(&self) -> TransactionId {
        match self {
            LogRecord::Begin { tid, .. }
            | LogRecord::Commit { tid, .. }
            | LogRecord::Abort { tid, .. }
            | LogRecord::Update { tid, .. } => *tid,
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            LogRecord::Begin { offset, .. }
            | LogRecord::Commit { offset, .. }
            | LogRecord::Abort { offset, .. }
            | LogRecord::Update { offset, .. } => *offset,
        }
    }

    pub fn kind(&self) -> LogRecordKind {
        match self {
            LogRecord::Begin { .. } => LogRecordKind::Begin,
            LogRecord::Commit { .. } => LogRecordKind::Commit,
            LogRecord::Abort { .. } => LogRecordKind::Abort,
            LogRecord::Update { .. } => LogRecordKind::Update,
        }
    }
}

/// The append-buffered log file with a single read/write cursor.
pub struct LogFile {
    file: File,
    buf: BytesMut,
    offset: u64,
    catalog: Arc<Catalog>,
}

impl LogFile {
    /// Open or create the log, positioned at end-of-file ready to append.
    pub fn open<P: AsRef<Path>>(path: P, catalog: Arc<Catalog>) -> Result<LogFile> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let offset = file.seek(SeekFrom::End(0))?;
        Ok(LogFile {
            file,
            buf: BytesMut::new(),
            offset,
            catalog,
        })
    }

    /// The logical cursor position, counting buffered appends.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn log_begin(&mut self, tid: TransactionId) {
        self.append_simple(LogRecordKind::Begin, tid);
    }

    pub fn log_commit(&mut self, tid: TransactionId) {
        self.append_simple(LogRecordKind::Commit, tid);
    }

    pub fn log_abort(&mut self, tid: TransactionId) {
        self.append_simple(LogRecordKind::Abort, tid);
    }

    fn append_simple(&mut self, kind: LogRecordKind, tid: TransactionId) {
        let start = self.offset;
        let appended_from = self.buf.len();
        self.buf.put_i8(kind as i8);
        self.buf.put_i32_le(tid.as_u32() as i32);
        self.buf.put_i64_le(start as i64);
        self.offset += (self.buf.len() - appended_from) as u64;
    }

    /// Append an update record carrying the before and after images of one
    /// page. Does not force.
    pub fn log_update(
        &mut self,
        tid: TransactionId,
        file: &Arc<HeapFile>,
        before: &HeapPage,
        after: &HeapPage,
    ) -> Result<()> {
        let file_id = self.catalog.file_id(file).ok_or_else(|| {
            DbError::MalformedData(format!(
                "file {} is not registered in the catalog",
                file.backing_path().display()
            ))
        })?;
        let start = self.offset;
        let appended_from = self.buf.len();
        self.buf.put_i8(LogRecordKind::Update as i8);
        self.buf.put_i32_le(tid.as_u32() as i32);
        append_page(&mut self.buf, file_id, before);
        append_page(&mut self.buf, file_id, after);
        self.buf.put_i64_le(start as i64);
        self.offset += (self.buf.len() - appended_from) as u64;
        Ok(())
    }

    /// Flush buffered appends to disk and fsync.
    pub fn force(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.file.write_all(&self.buf)?;
        self.buf.clear();
        self.file.sync_all()?;
        Ok(())
    }

    /// Force pending appends, then reposition the cursor.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<()> {
        self.force()?;
        self.offset = self.file.seek(pos)?;
        Ok(())
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0))
    }

    pub fn seek_end(&mut self) -> Result<()> {
        self.seek(SeekFrom::End(0))
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.seek(SeekFrom::Start(offset))
    }

    /// Drop everything at and beyond `len`. Recovery uses this to cut a
    /// torn tail at the last intact record boundary.
    pub(crate) fn truncate(&mut self, len: u64) -> Result<()> {
        self.force()?;
        self.file.set_len(len)?;
        self.seek_to(len)
    }

    /// Decode the record under the cursor and advance past it. `None` at
    /// clean end-of-file; `PartialRecord` when the record is cut short.
    pub fn read_record(&mut self) -> Result<Option<LogRecord>> {
        self.force()?;
        let start = self.offset;

        let kind_raw = match self.read_i8() {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(DbError::Io(e)),
        };
        let kind = LogRecordKind::from_i8(kind_raw).ok_or_else(|| {
            DbError::PartialRecord(format!(
                "unknown record type {} at offset {}",
                kind_raw, start
            ))
        })?;

        let tid_raw = self
            .read_i32()
            .map_err(|e| partial("transaction id", start, &e))?;
        let tid = TransactionId::from_u32(tid_raw as u32);

        let record = match kind {
            LogRecordKind::Begin => LogRecord::Begin { tid, offset: start },
            LogRecordKind::Commit => LogRecord::Commit { tid, offset: start },
            LogRecordKind::Abort => LogRecord::Abort { tid, offset: start },
            LogRecordKind::Update => {
                let before = self.read_logged_page(start, "before page")?;
                let after = self.read_logged_page(start, "after page")?;
                LogRecord::Update {
                    tid,
                    before,
                    after,
                    offset: start,
                }
            }
        };

        let trailer = self.read_i64().map_err(|e| partial("offset", start, &e))?;
        if trailer < 0 || trailer as u64 != start {
            return Err(DbError::PartialRecord(format!(
                "trailing offset {} does not match record start {}",
                trailer, start
            )));
        }
        Ok(Some(record))
    }

    /// Decode the record that ends at the cursor and leave the cursor at
    /// its start, so repeated calls walk the log backwards from wherever
    /// the cursor was placed (usually end-of-file). `None` once the start
    /// of the log is reached.
    pub fn read_prev_record(&mut self) -> Result<Option<LogRecord>> {
        if self.offset < TRAILER_SIZE {
            return Ok(None);
        }
        self.seek(SeekFrom::Current(-(TRAILER_SIZE as i64)))?;
        let start = self.read_i64().map_err(DbError::Io)?;
        if start < 0 {
            return Err(DbError::PartialRecord(format!(
                "negative record offset {} in trailer",
                start
            )));
        }
        let start = start as u64;
        self.seek_to(start)?;
        let record = self.read_record()?;
        self.seek_to(start)?;
        Ok(record)
    }

    /// Debug helper: dump every record to stdout, then restore the cursor.
    pub fn print_records(&mut self) -> Result<()> {
        let saved = self.offset;
        self.rewind()?;
        loop {
            let position = self.offset;
            let record = match self.read_record()? {
                Some(r) => r,
                None => break,
            };
            match &record {
                LogRecord::Update { before, .. } => println!(
                    "{} {} tid={} page={:?}",
                    position,
                    record.kind(),
                    record.tid(),
                    before.file.page_key(before.page.page_no())
                ),
                _ => println!("{} {} tid={}", position, record.kind(), record.tid()),
            }
        }
        self.seek_to(saved)
    }

    fn read_logged_page(&mut self, start: u64, what: &str) -> Result<LoggedPage> {
        let file_id = self.read_i32().map_err(|e| partial(what, start, &e))? as FileId;
        let page_no = self.read_i32().map_err(|e| partial(what, start, &e))?;
        if page_no < 0 {
            return Err(DbError::MalformedData(format!(
                "negative page number {} in update record",
                page_no
            )));
        }
        let mut image = vec![0u8; PAGE_SIZE];
        self.read_exact(&mut image)
            .map_err(|e| partial(what, start, &e))?;

        let file = self.catalog.file(file_id).ok_or_else(|| {
            DbError::MalformedData(format!("update record names unknown file id {}", file_id))
        })?;
        let page = HeapPage::from_bytes(file.descriptor(), page_no as usize, &image)?;
        Ok(LoggedPage { file, page })
    }

    fn read_i8(&mut self) -> io::Result<i8> {
        let mut raw = [0u8; 1];
        self.read_exact(&mut raw)?;
        Ok(raw[0] as i8)
    }

    fn read_i32(&mut self) -> io::Result<i32> {
        let mut raw = [0u8; 4];
        self.read_exact(&mut raw)?;
        Ok(i32::from_le_bytes(raw))
    }

    fn read_i64(&mut self) -> io::Result<i64> {
        let mut raw = [0u8; 8];
        self.read_exact(&mut raw)?;
        Ok(i64::from_le_bytes(raw))
    }

    fn read_exact(&mut self, out: &mut [u8]) -> io::Result<()> {
        self.file.read_exact(out)?;
        self.offset += out.len() as u64;
        Ok(())
    }
}

fn partial(what: &str, start: u64, cause: &io::Error) -> DbError {
    DbError::PartialRecord(format!(
        "failed to read {}: partial record at offset {} ({})",
        what, start, cause
    ))
}

fn append_page(buf: &mut BytesMut, file_id: FileId, page: &HeapPage) {
    buf.put_i32_le(file_id as i32);
    buf.put_i32_le(page.page_no() as i32);
    buf.put_slice(&page.to_bytes());
}
