use std::sync::Arc;

use basalt::heap_file::{HeapFile, HeapFileIterator};
use basalt::transaction::TransactionId;
use basalt::tuple::{Tuple, TupleDesc};
use basalt::{BufferPool, Result};

use super::{Operator, TupleStream};

/// A full scan over one heap file. Tuples come out in `(page, slot)` order
/// with their rids set, so mutation operators downstream can address them.
pub struct SeqScan {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
}

impl SeqScan {
    pub fn new(file: Arc<HeapFile>, pool: Arc<BufferPool>) -> SeqScan {
        SeqScan { file, pool }
    }
}

impl Operator for SeqScan {
    fn descriptor(&self) -> &TupleDesc {
        self.file.descriptor()
    }

    fn iterator(&self, tid: TransactionId) -> Result<Box<dyn TupleStream + '_>> {
        Ok(Box::new(ScanStream {
            inner: self.file.iterator(&self.pool, tid),
        }))
    }
}

struct ScanStream {
    inner: HeapFileIterator,
}

impl TupleStream for ScanStream {
    fn next(&mut self) -> Result<Option<Tuple>> {
        self.inner.next()
    }
}
