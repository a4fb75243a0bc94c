//! The mutation operators. Both drain their child on the first pull,
//! apply the mutation per tuple, and emit exactly one `{count}` tuple.

use std::sync::Arc;

use basalt::heap_file::HeapFile;
use basalt::transaction::TransactionId;
use basalt::tuple::{FieldKind, FieldType, Tuple, TupleDesc, Value};
use basalt::{BufferPool, Result};

use super::{Operator, TupleStream};

fn count_descriptor() -> TupleDesc {
    TupleDesc::new(vec![FieldType::new("count", FieldKind::Int)])
}

/// Inserts every child tuple into the target file.
pub struct InsertOp {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    child: Box<dyn Operator>,
    desc: TupleDesc,
}

impl InsertOp {
    pub fn new(file: Arc<HeapFile>, pool: Arc<BufferPool>, child: Box<dyn Operator>) -> InsertOp {
        InsertOp {
            file,
            pool,
            child,
            desc: count_descriptor(),
        }
    }
}

impl Operator for InsertOp {
    fn descriptor(&self) -> &TupleDesc {
        &self.desc
    }

    fn iterator(&self, tid: TransactionId) -> Result<Box<dyn TupleStream + '_>> {
        Ok(Box::new(MutationStream {
            file: &self.file,
            pool: &self.pool,
            desc: &self.desc,
            child: self.child.iterator(tid)?,
            tid,
            apply: HeapFile::insert_tuple,
            done: false,
        }))
    }
}

/// Deletes every child tuple from the target file. Each incoming tuple
/// must carry a valid rid, which the heap-file iterator guarantees.
pub struct DeleteOp {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    child: Box<dyn Operator>,
    desc: TupleDesc,
}

impl DeleteOp {
    pub fn new(file: Arc<HeapFile>, pool: Arc<BufferPool>, child: Box<dyn Operator>) -> DeleteOp {
        DeleteOp {
            file,
            pool,
            child,
            desc: count_descriptor(),
        }
    }
}

impl Operator for DeleteOp {
    fn descriptor(&self) -> &TupleDesc {
        &self.desc
    }

    fn iterator(&self, tid: TransactionId) -> Result<Box<dyn TupleStream + '_>> {
        Ok(Box::new(MutationStream {
            file: &self.file,
            pool: &self.pool,
            desc: &self.desc,
            child: self.child.iterator(tid)?,
            tid,
            apply: HeapFile::delete_tuple,
            done: false,
        }))
    }
}

type ApplyFn = fn(&Arc<HeapFile>, &BufferPool, &Tuple, TransactionId) -> Result<()>;

struct MutationStream<'a> {
    file: &'a Arc<HeapFile>,
    pool: &'a Arc<BufferPool>,
    desc: &'a TupleDesc,
    child: Box<dyn TupleStream + 'a>,
    tid: TransactionId,
    apply: ApplyFn,
    done: bool,
}

impl TupleStream for MutationStream<'_> {
    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut count = 0i64;
        while let Some(tuple) = self.child.next()? {
            (self.apply)(self.file, self.pool.as_ref(), &tuple, self.tid)?;
            count += 1;
        }
        Ok(Some(Tuple::new(self.desc.clone(), vec![Value::Int(count)])?))
    }
}
