use std::sync::Arc;

use basalt::heap_file::HeapFile;
use basalt::transaction::TransactionId;
use basalt::tuple::{FieldKind, FieldType, Tuple, TupleDesc, Value};
use basalt::BufferPool;

pub fn people_desc() -> TupleDesc {
    TupleDesc::new(vec![
        FieldType::new("name", FieldKind::String),
        FieldType::new("age", FieldKind::Int),
    ])
}

pub fn person(desc: &TupleDesc, name: &str, age: i64) -> Tuple {
    Tuple::new(
        desc.clone(),
        vec![Value::Str(name.to_string()), Value::Int(age)],
    )
    .unwrap()
}

pub fn scan_all(file: &Arc<HeapFile>, pool: &Arc<BufferPool>) -> Vec<Tuple> {
    let mut iter = file.iterator(pool, TransactionId::new());
    let mut out = Vec::new();
    while let Some(tuple) = iter.next().unwrap() {
        out.push(tuple);
    }
    out
}
