//! Heap files: unordered tuple storage for one table, backed by an
//! append-growing sequence of fixed-size pages.
//!
//! The backing file is opened per operation; all page traffic during
//! inserts, deletes, and scans goes through the buffer pool so cached and
//! dirty state stays coherent.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::buffer_pool::{BufferPool, PageKey, Permission, SharedPage};
use crate::error::{DbError, Result};
use crate::heap_page::HeapPage;
use crate::transaction::TransactionId;
use crate::tuple::{FieldKind, Rid, Tuple, TupleDesc, Value};
use crate::{basalt_debug_log, PAGE_SIZE, STRING_LENGTH};

#[derive(Debug)]
struct FileState {
    num_pages: usize,
    // advisory lower bound for a page with free slots; revalidated on use
    last_empty_page: Option<usize>,
}

/// An unordered collection of tuples of one schema.
#[derive(Debug)]
pub struct HeapFile {
    desc: TupleDesc,
    path: PathBuf,
    state: Mutex<FileState>,
}

impl HeapFile {
    /// Open or create the backing file. An existing file's length determines
    /// the page count.
    pub fn open<P: AsRef<Path>>(path: P, desc: TupleDesc) -> Result<HeapFile> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let num_pages = (file.metadata()?.len() / PAGE_SIZE as u64) as usize;
        Ok(HeapFile {
            desc,
            path,
            state: Mutex::new(FileState {
                num_pages,
                last_empty_page: None,
            }),
        })
    }

    pub fn descriptor(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn backing_path(&self) -> &Path {
        &self.path
    }

    pub fn num_pages(&self) -> usize {
        self.state.lock().unwrap().num_pages
    }

    /// Stable cache identity of one page of this file.
    pub fn page_key(&self, page_no: usize) -> PageKey {
        PageKey::new(&self.path, page_no)
    }

    /// Read one page image from disk. Called by the buffer pool on a cache
    /// miss.
    pub fn read_page(&self, page_no: usize) -> Result<HeapPage> {
        let mut file = OpenOptions::new().read(true).open(&self.path)?;
        file.seek(SeekFrom::Start((page_no * PAGE_SIZE) as u64))?;
        let mut data = vec![0u8; PAGE_SIZE];
        file.read_exact(&mut data).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                DbError::MalformedData(format!(
                    "short read for page {} of {}",
                    page_no,
                    self.path.display()
                ))
            } else {
                DbError::Io(e)
            }
        })?;
        HeapPage::from_bytes(&self.desc, page_no, &data)
    }

    /// Write one page image back at its offset, growing the file as needed.
    pub fn flush_page(&self, page: &HeapPage) -> Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.seek(SeekFrom::Start((page.page_no() * PAGE_SIZE) as u64))?;
        file.write_all(&page.to_bytes())?;

        let mut state = self.state.lock().unwrap();
        if page.page_no() >= state.num_pages {
            state.num_pages = page.page_no() + 1;
        }
        Ok(())
    }

    /// Add a tuple, probing existing pages from the free-slot hint and
    /// appending a fresh page when none has room. The touched page is
    /// marked dirty for `tid`.
    pub fn insert_tuple(
        self: &Arc<Self>,
        pool: &BufferPool,
        tuple: &Tuple,
        tid: TransactionId,
    ) -> Result<()> {
        let (start, num_pages) = {
            let state = self.state.lock().unwrap();
            (state.last_empty_page.unwrap_or(0), state.num_pages)
        };

        for page_no in start..num_pages {
            let page = pool.get_page(self, page_no, tid, Permission::Read)?;
            let has_room = page.read().unwrap().num_empty_slots() > 0;
            if !has_room {
                continue;
            }

            let page = pool.get_page(self, page_no, tid, Permission::Write)?;
            let mut guard = page.write().unwrap();
            match guard.insert(tuple) {
                Ok(_) => {
                    guard.set_dirty(tid);
                    drop(guard);
                    self.state.lock().unwrap().last_empty_page = Some(page_no);
                    return Ok(());
                }
                Err(DbError::PageFull) => continue,
                Err(e) => return Err(e),
            }
        }

        // no existing page had room; flush an empty image at the end of the
        // file and insert through the pool so the page is cached and dirty
        let page_no = self.state.lock().unwrap().num_pages;
        basalt_debug_log!(
            "[HeapFile::insert_tuple] allocating page {} of {}",
            page_no,
            self.path.display()
        );
        self.flush_page(&HeapPage::new(&self.desc, page_no))?;

        let page = pool.get_page(self, page_no, tid, Permission::Write)?;
        let mut guard = page.write().unwrap();
        guard.insert(tuple)?;
        guard.set_dirty(tid);
        drop(guard);

        self.state.lock().unwrap().last_empty_page = Some(page_no);
        Ok(())
    }

    /// Remove the tuple the rid of `tuple` addresses and mark its page
    /// dirty for `tid`.
    pub fn delete_tuple(
        self: &Arc<Self>,
        pool: &BufferPool,
        tuple: &Tuple,
        tid: TransactionId,
    ) -> Result<()> {
        let rid = tuple
            .rid
            .ok_or_else(|| DbError::TupleNotFound("tuple has no rid".to_string()))?;
        let Rid::Heap(heap_rid) = rid;
        if heap_rid.page_no >= self.num_pages() {
            return Err(DbError::TupleNotFound(format!(
                "rid references page {} beyond the end of the file",
                heap_rid.page_no
            )));
        }

        let page = pool.get_page(self, heap_rid.page_no, tid, Permission::Write)?;
        let mut guard = page.write().unwrap();
        guard.delete(rid)?;
        guard.set_dirty(tid);
        drop(guard);

        let mut state = self.state.lock().unwrap();
        if let Some(hint) = state.last_empty_page {
            if heap_rid.page_no < hint {
                state.last_empty_page = Some(heap_rid.page_no);
            }
        }
        Ok(())
    }

    /// A lazy scan over every tuple of the file in ascending
    /// `(page_no, slot_no)` order. Yielded tuples are fresh copies with
    /// their rids set, so `delete_tuple` accepts them.
    pub fn iterator(self: &Arc<Self>, pool: &Arc<BufferPool>, tid: TransactionId) -> HeapFileIterator {
        HeapFileIterator {
            file: Arc::clone(self),
            pool: Arc::clone(pool),
            tid,
            page_no: 0,
            num_pages: self.num_pages(),
            slot_no: 0,
            current: None,
        }
    }

    /// Bulk-load rows from CSV in one transaction, flushing all pages
    /// before commit. Int fields tolerate scientific notation (parsed as
    /// floating point, then truncated); string fields are cut to the fixed
    /// capacity. Returns the number of rows loaded.
    pub fn load_from_csv<R: Read>(
        self: &Arc<Self>,
        pool: &BufferPool,
        reader: R,
        has_header: bool,
        delimiter: u8,
        skip_last_field: bool,
    ) -> Result<usize> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(has_header)
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(reader);

        let tid = TransactionId::new();
        pool.begin_transaction(tid)?;

        let mut loaded = 0usize;
        for (line_no, record) in csv_reader.records().enumerate() {
            let record =
                record.map_err(|e| DbError::MalformedData(format!("csv parse error: {}", e)))?;
            let field_count = record
                .len()
                .saturating_sub(if skip_last_field { 1 } else { 0 });
            if field_count != self.desc.num_fields() {
                return Err(DbError::MalformedData(format!(
                    "line {}: expected {} fields, got {}",
                    line_no + 1,
                    self.desc.num_fields(),
                    field_count
                )));
            }

            let mut values = Vec::with_capacity(field_count);
            for (field, raw) in self.desc.fields.iter().zip(record.iter()) {
                match field.kind {
                    FieldKind::Int => {
                        let parsed: f64 = raw.trim().parse().map_err(|_| {
                            DbError::TypeMismatch(format!(
                                "line {}: cannot convert {:?} to int",
                                line_no + 1,
                                raw
                            ))
                        })?;
                        values.push(Value::Int(parsed as i64));
                    }
                    FieldKind::String => values.push(Value::Str(truncate_to_capacity(raw))),
                }
            }

            let tuple = Tuple::new(self.desc.clone(), values)?;
            self.insert_tuple(pool, &tuple, tid)?;
            loaded += 1;
        }

        pool.flush_all_pages()?;
        pool.commit_transaction(tid)?;
        Ok(loaded)
    }
}

fn truncate_to_capacity(raw: &str) -> String {
    if raw.len() <= STRING_LENGTH {
        return raw.to_string();
    }
    let mut end = STRING_LENGTH;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    raw[..end].to_string()
}

/// Pull iterator over one heap file. The page count is snapshotted at
/// creation, so a scan feeding an insert into the same file terminates.
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    tid: TransactionId,
    page_no: usize,
    num_pages: usize,
    slot_no: usize,
    current: Option<SharedPage>,
}

impl HeapFileIterator {
    pub fn next(&mut self) -> Result<Option<Tuple>> {
        loop {
            let page = match &self.current {
                Some(page) => Arc::clone(page),
                None => {
                    if self.page_no >= self.num_pages {
                        return Ok(None);
                    }
                    let page =
                        self.pool
                            .get_page(&self.file, self.page_no, self.tid, Permission::Read)?;
                    self.slot_no = 0;
                    self.current = Some(Arc::clone(&page));
                    page
                }
            };

            let guard = page.read().unwrap();
            while self.slot_no < guard.num_slots() {
                let slot_no = self.slot_no;
                self.slot_no += 1;
                if let Some(tuple) = guard.tuple_at(slot_no) {
                    return Ok(Some(tuple.clone()));
                }
            }
            drop(guard);

            self.current = None;
            self.page_no += 1;
        }
    }
}
