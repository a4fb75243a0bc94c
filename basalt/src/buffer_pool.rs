//! The buffer pool: a bounded cache of heap pages keyed by
//! `(backing path, page number)`, and the home of the transaction
//! lifecycle.
//!
//! The durability policy is FORCE / NO-STEAL: commit writes every page the
//! transaction dirtied, and dirty pages are never evicted, so an abort in
//! the simple (log-less) configuration only has to drop cache entries.
//! With a log attached, update records are appended and forced before any
//! page image reaches disk, which is what makes rollback and crash
//! recovery possible.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::basalt_debug_log;
use crate::error::{DbError, Result};
use crate::heap_file::HeapFile;
use crate::heap_page::HeapPage;
use crate::transaction::TransactionId;
use crate::wal::{LogFile, LogRecord, LoggedPage};

/// Permission requested when fetching a page. Tracked so page-level
/// locking can be added behind the same signature; any permission is
/// accepted today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
}

/// Cache identity of one page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub path: PathBuf,
    pub page_no: usize,
}

impl PageKey {
    pub fn new(path: &Path, page_no: usize) -> PageKey {
        PageKey {
            path: path.to_path_buf(),
            page_no,
        }
    }
}

/// A cached page, shared with whoever fetched it.
pub type SharedPage = Arc<RwLock<HeapPage>>;

struct Frame {
    file: Arc<HeapFile>,
    page: SharedPage,
}

pub struct BufferPool {
    cache: Mutex<HashMap<PageKey, Frame>>,
    capacity: usize,
    active: Mutex<HashSet<TransactionId>>,
    log: Mutex<Option<LogFile>>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> BufferPool {
        BufferPool {
            cache: Mutex::new(HashMap::new()),
            capacity,
            active: Mutex::new(HashSet::new()),
            log: Mutex::new(None),
        }
    }

    /// Number of pages currently cached.
    pub fn cached_pages(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    /// Fetch a page, loading it from the file on a miss. A miss at
    /// capacity evicts some clean page first; if every cached page is
    /// dirty the fetch fails with `BufferPoolFull`.
    pub fn get_page(
        &self,
        file: &Arc<HeapFile>,
        page_no: usize,
        _tid: TransactionId,
        _perm: Permission,
    ) -> Result<SharedPage> {
        let key = file.page_key(page_no);
        let mut cache = self.cache.lock().unwrap();
        if let Some(frame) = cache.get(&key) {
            return Ok(Arc::clone(&frame.page));
        }

        if cache.len() >= self.capacity {
            self.evict_one(&mut cache)?;
        }

        let page = file.read_page(page_no)?;
        let shared = Arc::new(RwLock::new(page));
        cache.insert(
            key,
            Frame {
                file: Arc::clone(file),
                page: Arc::clone(&shared),
            },
        );
        Ok(shared)
    }

    fn evict_one(&self, cache: &mut HashMap<PageKey, Frame>) -> Result<()> {
        let victim = cache
            .iter()
            .find(|(_, frame)| !frame.page.read().unwrap().is_dirty())
            .map(|(key, _)| key.clone());
        match victim {
            Some(key) => {
                basalt_debug_log!("[BufferPool] evicting clean page {:?}", key);
                cache.remove(&key);
                Ok(())
            }
            None => Err(DbError::BufferPoolFull),
        }
    }

    /// Flush every cached page and clear its dirty bit. With a log
    /// attached, dirty pages get their update records forced first.
    pub fn flush_all_pages(&self) -> Result<()> {
        for (file, page) in self.collect_frames(|_| true) {
            self.flush_frame(&file, &page)?;
        }
        Ok(())
    }

    /// Register a new transaction. Registering the same id twice is an
    /// error.
    pub fn begin_transaction(&self, tid: TransactionId) -> Result<()> {
        {
            let mut active = self.active.lock().unwrap();
            if !active.insert(tid) {
                return Err(DbError::IllegalTransaction(format!(
                    "transaction {} is already running",
                    tid
                )));
            }
        }
        let mut log = self.log.lock().unwrap();
        if let Some(log) = log.as_mut() {
            log.log_begin(tid);
            log.force()?;
        }
        Ok(())
    }

    /// Commit: flush the pages `tid` dirtied (forcing their update records
    /// first when a log is attached), then append Commit and force.
    pub fn commit_transaction(&self, tid: TransactionId) -> Result<()> {
        self.require_active(tid)?;
        for (file, page) in self.collect_frames(|page| page.dirtied_by() == Some(tid)) {
            self.flush_frame(&file, &page)?;
        }
        {
            let mut log = self.log.lock().unwrap();
            if let Some(log) = log.as_mut() {
                log.log_commit(tid);
                log.force()?;
            }
        }
        self.active.lock().unwrap().remove(&tid);
        Ok(())
    }

    /// Abort: undo whatever `tid` already pushed through the log, drop its
    /// still-cached mutations, and (with a log) append Abort.
    pub fn abort_transaction(&self, tid: TransactionId) -> Result<()> {
        self.require_active(tid)?;
        let has_log = self.log.lock().unwrap().is_some();
        if has_log {
            self.rollback(tid)?;
        }

        // mutations that never produced an update record live only in the
        // cache; dropping the frames restores the pre-transaction state
        self.cache
            .lock()
            .unwrap()
            .retain(|_, frame| frame.page.read().unwrap().dirtied_by() != Some(tid));

        if has_log {
            let mut log = self.log.lock().unwrap();
            if let Some(log) = log.as_mut() {
                log.log_abort(tid);
                log.force()?;
            }
        }
        self.active.lock().unwrap().remove(&tid);
        Ok(())
    }

    /// Walk the log backwards from the tail, restoring the before image of
    /// every update `tid` wrote, stopping at its Begin record. Leaves the
    /// log positioned at end-of-file.
    pub fn rollback(&self, tid: TransactionId) -> Result<()> {
        let mut log_slot = self.log.lock().unwrap();
        let log = log_slot.as_mut().ok_or_else(|| {
            DbError::IllegalTransaction("rollback requires a log file".to_string())
        })?;

        log.seek_end()?;
        while let Some(record) = log.read_prev_record()? {
            if record.tid() != tid {
                continue;
            }
            match record {
                LogRecord::Begin { .. } => break,
                LogRecord::Update { before, after, .. } => {
                    let key = before.file.page_key(before.page.page_no());
                    basalt_debug_log!("[rollback] restoring {:?}", key);
                    self.cache.lock().unwrap().remove(&key);
                    undo_update(log, tid, &before, &after)?;
                }
                _ => {}
            }
        }
        log.seek_end()
    }

    /// Reconstruct a consistent disk state from the log, then install the
    /// log on this pool. Call at startup, even when the log is empty.
    ///
    /// Pass 1 replays every update's after image forward and collects the
    /// transactions that began but neither committed nor aborted. Pass 2
    /// walks backwards restoring those losers' before images (logging a
    /// compensating update per undo) and appends a synthetic Abort for
    /// each. Running recovery twice is a no-op.
    pub fn recover(&self, mut log: LogFile) -> Result<()> {
        log.rewind()?;
        let mut losers: HashMap<TransactionId, u64> = HashMap::new();
        loop {
            let record_start = log.offset();
            let record = match log.read_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(DbError::PartialRecord(msg)) => {
                    // torn tail: the last intact record is the effective
                    // end of the log
                    basalt_debug_log!("[recover] dropping torn tail: {}", msg);
                    log.truncate(record_start)?;
                    break;
                }
                Err(e) => return Err(e),
            };
            match record {
                LogRecord::Begin { tid, offset } => {
                    losers.insert(tid, offset);
                }
                LogRecord::Commit { tid, .. } | LogRecord::Abort { tid, .. } => {
                    losers.remove(&tid);
                }
                LogRecord::Update { after, .. } => {
                    let key = after.file.page_key(after.page.page_no());
                    basalt_debug_log!("[recover] REDO {:?}", key);
                    self.cache.lock().unwrap().remove(&key);
                    after.file.flush_page(&after.page)?;
                }
            }
        }

        log.seek_end()?;
        while !losers.is_empty() {
            let record = match log.read_prev_record()? {
                Some(record) => record,
                None => break,
            };
            if !losers.contains_key(&record.tid()) {
                continue;
            }
            match record {
                LogRecord::Update {
                    tid, before, after, ..
                } => {
                    let key = before.file.page_key(before.page.page_no());
                    basalt_debug_log!("[recover] UNDO {:?}", key);
                    self.cache.lock().unwrap().remove(&key);
                    undo_update(&mut log, tid, &before, &after)?;
                }
                LogRecord::Begin { tid, .. } => {
                    let resume = log.offset();
                    log.seek_end()?;
                    log.log_abort(tid);
                    log.force()?;
                    log.seek_to(resume)?;
                    losers.remove(&tid);
                }
                _ => {}
            }
        }

        log.seek_end()?;
        *self.log.lock().unwrap() = Some(log);
        Ok(())
    }

    fn require_active(&self, tid: TransactionId) -> Result<()> {
        if self.active.lock().unwrap().contains(&tid) {
            Ok(())
        } else {
            Err(DbError::IllegalTransaction(format!(
                "transaction {} is not active",
                tid
            )))
        }
    }

    fn collect_frames(
        &self,
        select: impl Fn(&HeapPage) -> bool,
    ) -> Vec<(Arc<HeapFile>, SharedPage)> {
        self.cache
            .lock()
            .unwrap()
            .values()
            .filter(|frame| select(&frame.page.read().unwrap()))
            .map(|frame| (Arc::clone(&frame.file), Arc::clone(&frame.page)))
            .collect()
    }

    /// Write one cached page through its file. Appends and forces the
    /// update record first when the page is dirty and a log is attached
    /// (write-ahead discipline), then cleans the page and refreshes its
    /// before image.
    fn flush_frame(&self, file: &Arc<HeapFile>, page: &SharedPage) -> Result<()> {
        let mut guard = page.write().unwrap();
        if let Some(tid) = guard.dirtied_by() {
            let mut log = self.log.lock().unwrap();
            if let Some(log) = log.as_mut() {
                let before = guard.before_image()?;
                log.log_update(tid, file, &before, &guard)?;
                log.force()?;
            }
        }
        file.flush_page(&guard)?;
        guard.set_clean();
        guard.set_before_image();
        Ok(())
    }
}

/// Undo one logged update: append a compensating update record whose after
/// image is the restored state, force it, then write the before image
/// through the file. The compensation record is what keeps a later redo
/// pass from resurrecting the undone change, and so what makes recovery
/// idempotent.
fn undo_update(
    log: &mut LogFile,
    tid: TransactionId,
    before: &LoggedPage,
    after: &LoggedPage,
) -> Result<()> {
    let resume = log.offset();
    log.seek_end()?;
    log.log_update(tid, &before.file, &after.page, &before.page)?;
    log.force()?;
    log.seek_to(resume)?;
    before.file.flush_page(&before.page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{FieldKind, FieldType, Tuple, TupleDesc, Value};
    use tempfile::tempdir;

    fn int_desc() -> TupleDesc {
        TupleDesc::new(vec![FieldType::new("v", FieldKind::Int)])
    }

    fn int_tuple(v: i64) -> Tuple {
        Tuple::new(int_desc(), vec![Value::Int(v)]).unwrap()
    }

    // three slots per page
    fn wide_desc() -> TupleDesc {
        TupleDesc::new(
            (0..150)
                .map(|i| FieldType::new(&format!("f{}", i), FieldKind::Int))
                .collect(),
        )
    }

    fn wide_tuple(v: i64) -> Tuple {
        Tuple::new(wide_desc(), vec![Value::Int(v); 150]).unwrap()
    }

    fn scan_count(file: &Arc<HeapFile>, pool: &Arc<BufferPool>) -> usize {
        let mut iter = file.iterator(pool, TransactionId::new());
        let mut count = 0;
        while iter.next().unwrap().is_some() {
            count += 1;
        }
        count
    }

    #[test]
    fn cache_stays_within_capacity() {
        let dir = tempdir().unwrap();
        let file = Arc::new(HeapFile::open(dir.path().join("t.db"), int_desc()).unwrap());

        // seed five pages on disk
        for page_no in 0..5 {
            file.flush_page(&HeapPage::new(&int_desc(), page_no)).unwrap();
        }

        let pool = Arc::new(BufferPool::new(3));
        let tid = TransactionId::new();
        for page_no in 0..5 {
            pool.get_page(&file, page_no, tid, Permission::Read).unwrap();
            assert!(pool.cached_pages() <= 3);
        }
    }

    #[test]
    fn repeated_fetches_share_one_entry() {
        let dir = tempdir().unwrap();
        let file = Arc::new(HeapFile::open(dir.path().join("t.db"), int_desc()).unwrap());
        file.flush_page(&HeapPage::new(&int_desc(), 0)).unwrap();

        let pool = Arc::new(BufferPool::new(4));
        let tid = TransactionId::new();
        let first = pool.get_page(&file, 0, tid, Permission::Read).unwrap();
        let second = pool.get_page(&file, 0, tid, Permission::Write).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.cached_pages(), 1);
    }

    #[test]
    fn a_pool_full_of_dirty_pages_rejects_new_fetches() {
        let dir = tempdir().unwrap();
        let file = Arc::new(HeapFile::open(dir.path().join("wide.db"), wide_desc()).unwrap());
        let pool = Arc::new(BufferPool::new(2));
        let tid = TransactionId::new();
        pool.begin_transaction(tid).unwrap();

        // six inserts dirty two full pages; the seventh needs a third
        for i in 0..6 {
            file.insert_tuple(&pool, &wide_tuple(i), tid).unwrap();
        }
        let err = file.insert_tuple(&pool, &wide_tuple(6), tid).unwrap_err();
        assert!(matches!(err, DbError::BufferPoolFull));

        // committing flushes the dirty pages and unblocks the insert
        pool.commit_transaction(tid).unwrap();
        let tid = TransactionId::new();
        pool.begin_transaction(tid).unwrap();
        file.insert_tuple(&pool, &wide_tuple(6), tid).unwrap();
        pool.commit_transaction(tid).unwrap();
        assert_eq!(scan_count(&file, &pool), 7);
    }

    #[test]
    fn beginning_the_same_transaction_twice_is_an_error() {
        let pool = BufferPool::new(4);
        let tid = TransactionId::new();
        pool.begin_transaction(tid).unwrap();
        assert!(matches!(
            pool.begin_transaction(tid),
            Err(DbError::IllegalTransaction(_))
        ));
    }

    #[test]
    fn committing_an_unknown_transaction_is_an_error() {
        let pool = BufferPool::new(4);
        assert!(matches!(
            pool.commit_transaction(TransactionId::new()),
            Err(DbError::IllegalTransaction(_))
        ));
        assert!(matches!(
            pool.abort_transaction(TransactionId::new()),
            Err(DbError::IllegalTransaction(_))
        ));
    }

    #[test]
    fn commit_makes_changes_visible_to_a_fresh_pool() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        let file = Arc::new(HeapFile::open(&path, int_desc()).unwrap());
        let pool = Arc::new(BufferPool::new(8));
        let tid = TransactionId::new();
        pool.begin_transaction(tid).unwrap();
        file.insert_tuple(&pool, &int_tuple(1), tid).unwrap();
        file.insert_tuple(&pool, &int_tuple(2), tid).unwrap();
        pool.commit_transaction(tid).unwrap();

        let fresh_file = Arc::new(HeapFile::open(&path, int_desc()).unwrap());
        let fresh_pool = Arc::new(BufferPool::new(8));
        assert_eq!(scan_count(&fresh_file, &fresh_pool), 2);
    }

    #[test]
    fn simple_mode_abort_discards_cached_mutations() {
        let dir = tempdir().unwrap();
        let file = Arc::new(HeapFile::open(dir.path().join("t.db"), int_desc()).unwrap());
        let pool = Arc::new(BufferPool::new(8));

        let t1 = TransactionId::new();
        pool.begin_transaction(t1).unwrap();
        file.insert_tuple(&pool, &int_tuple(1), t1).unwrap();
        pool.commit_transaction(t1).unwrap();

        let t2 = TransactionId::new();
        pool.begin_transaction(t2).unwrap();
        file.insert_tuple(&pool, &int_tuple(2), t2).unwrap();
        pool.abort_transaction(t2).unwrap();

        assert_eq!(scan_count(&file, &pool), 1);
    }
}
