//! Tuples, schemas, and record identifiers.
//!
//! All tuples are fixed width: an `Int` occupies 8 bytes and a `String`
//! occupies exactly [`STRING_LENGTH`](crate::STRING_LENGTH) bytes on the
//! wire, so a schema alone determines how many tuples fit on a page.

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{DbError, Result};
use crate::STRING_LENGTH;

/// The kinds of values a field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Int,
    String,
}

impl FieldKind {
    /// On-disk width of a value of this kind.
    pub fn byte_len(self) -> usize {
        match self {
            FieldKind::Int => 8,
            FieldKind::String => STRING_LENGTH,
        }
    }
}

/// A single column: name, optional table qualifier, and kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub name: String,
    pub qualifier: String,
    pub kind: FieldKind,
}

impl FieldType {
    pub fn new(name: &str, kind: FieldKind) -> FieldType {
        FieldType {
            name: name.to_string(),
            qualifier: String::new(),
            kind,
        }
    }

    pub fn qualified(name: &str, qualifier: &str, kind: FieldKind) -> FieldType {
        FieldType {
            name: name.to_string(),
            qualifier: qualifier.to_string(),
            kind,
        }
    }
}

/// An ordered sequence of field types. Two descriptors are equal iff their
/// field sequences are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TupleDesc {
    pub fields: Vec<FieldType>,
}

impl TupleDesc {
    pub fn new(fields: Vec<FieldType>) -> TupleDesc {
        TupleDesc { fields }
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Width of one serialized tuple of this schema.
    pub fn bytes_per_tuple(&self) -> usize {
        self.fields.iter().map(|f| f.kind.byte_len()).sum()
    }

    /// Position of the field matching `name`. When a qualifier is supplied,
    /// unqualified fields still match it.
    pub fn field_index(&self, name: &str, qualifier: Option<&str>) -> Option<usize> {
        self.fields.iter().position(|f| {
            f.name == name
                && match qualifier {
                    None => true,
                    Some(q) => f.qualifier.is_empty() || f.qualifier == q,
                }
        })
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i64),
    Str(String),
}

impl Value {
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::Int(_) => FieldKind::Int,
            Value::Str(_) => FieldKind::String,
        }
    }

    /// Serialize in wire form: Int as 8 bytes little-endian, Str as exactly
    /// `STRING_LENGTH` bytes, truncated or zero padded.
    pub fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Value::Int(v) => buf.put_i64_le(*v),
            Value::Str(s) => {
                let raw = s.as_bytes();
                let n = raw.len().min(STRING_LENGTH);
                buf.put_slice(&raw[..n]);
                buf.put_bytes(0, STRING_LENGTH - n);
            }
        }
    }

    pub fn read_from(buf: &mut impl Buf, kind: FieldKind) -> Result<Value> {
        if buf.remaining() < kind.byte_len() {
            return Err(DbError::MalformedData(format!(
                "buffer too short for a {:?} value",
                kind
            )));
        }
        match kind {
            FieldKind::Int => Ok(Value::Int(buf.get_i64_le())),
            FieldKind::String => {
                let mut raw = [0u8; STRING_LENGTH];
                buf.copy_to_slice(&mut raw);
                let end = raw.iter().position(|b| *b == 0).unwrap_or(STRING_LENGTH);
                Ok(Value::Str(String::from_utf8_lossy(&raw[..end]).into_owned()))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Record identifier for a tuple stored on a heap page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapRid {
    pub page_no: usize,
    pub slot_no: usize,
}

/// A record identifier. Operators above the file layer treat this as an
/// opaque token compared by value; heap storage is the only variant today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rid {
    Heap(HeapRid),
}

/// A tuple: a descriptor, one value per field, and the record identifier of
/// its slot when it was read from a heap page (`None` for synthesized
/// tuples such as operator counts).
#[derive(Debug, Clone)]
pub struct Tuple {
    pub desc: TupleDesc,
    pub fields: Vec<Value>,
    pub rid: Option<Rid>,
}

impl Tuple {
    /// Build a tuple, checking arity and per-field kinds against the
    /// descriptor.
    pub fn new(desc: TupleDesc, fields: Vec<Value>) -> Result<Tuple> {
        if fields.len() != desc.fields.len() {
            return Err(DbError::TypeMismatch(format!(
                "tuple has {} values but the schema has {} fields",
                fields.len(),
                desc.fields.len()
            )));
        }
        for (value, field) in fields.iter().zip(&desc.fields) {
            if value.kind() != field.kind {
                return Err(DbError::TypeMismatch(format!(
                    "value {} does not match the {:?} field {}",
                    value, field.kind, field.name
                )));
            }
        }
        Ok(Tuple {
            desc,
            fields,
            rid: None,
        })
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        for value in &self.fields {
            value.write_to(buf);
        }
    }

    pub fn read_from(buf: &mut impl Buf, desc: &TupleDesc) -> Result<Tuple> {
        let mut fields = Vec::with_capacity(desc.fields.len());
        for field in &desc.fields {
            fields.push(Value::read_from(buf, field.kind)?);
        }
        Ok(Tuple {
            desc: desc.clone(),
            fields,
            rid: None,
        })
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    pub fn field_named(&self, name: &str, qualifier: Option<&str>) -> Result<&Value> {
        let index = self
            .desc
            .field_index(name, qualifier)
            .ok_or_else(|| DbError::TypeMismatch(format!("no field named {}", name)))?;
        Ok(&self.fields[index])
    }
}

// Tuples compare by descriptor and values; the rid identifies a slot, not
// the record's content.
impl PartialEq for Tuple {
    fn eq(&self, other: &Tuple) -> bool {
        self.desc == other.desc && self.fields == other.fields
    }
}

impl Eq for Tuple {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_desc() -> TupleDesc {
        TupleDesc::new(vec![
            FieldType::new("name", FieldKind::String),
            FieldType::new("age", FieldKind::Int),
        ])
    }

    #[test]
    fn bytes_per_tuple_sums_field_widths() {
        assert_eq!(sample_desc().bytes_per_tuple(), STRING_LENGTH + 8);
    }

    #[test]
    fn descriptors_compare_by_field_sequence() {
        assert_eq!(sample_desc(), sample_desc());
        let other = TupleDesc::new(vec![FieldType::new("age", FieldKind::Int)]);
        assert_ne!(sample_desc(), other);
    }

    #[test]
    fn tuple_construction_checks_arity_and_kinds() {
        let desc = sample_desc();
        assert!(Tuple::new(desc.clone(), vec![Value::Int(1)]).is_err());
        let err = Tuple::new(
            desc.clone(),
            vec![Value::Int(1), Value::Str("alice".to_string())],
        )
        .unwrap_err();
        assert!(matches!(err, DbError::TypeMismatch(_)));
        assert!(Tuple::new(desc, vec![Value::Str("alice".to_string()), Value::Int(1)]).is_ok());
    }

    #[test]
    fn values_round_trip_through_wire_form() {
        let mut buf = BytesMut::new();
        Value::Int(-42).write_to(&mut buf);
        Value::Str("bob".to_string()).write_to(&mut buf);
        assert_eq!(buf.len(), 8 + STRING_LENGTH);

        let mut cursor = &buf[..];
        assert_eq!(
            Value::read_from(&mut cursor, FieldKind::Int).unwrap(),
            Value::Int(-42)
        );
        assert_eq!(
            Value::read_from(&mut cursor, FieldKind::String).unwrap(),
            Value::Str("bob".to_string())
        );
    }

    #[test]
    fn long_strings_truncate_to_capacity() {
        let long = "x".repeat(STRING_LENGTH + 10);
        let mut buf = BytesMut::new();
        Value::Str(long).write_to(&mut buf);
        assert_eq!(buf.len(), STRING_LENGTH);

        let mut cursor = &buf[..];
        let back = Value::read_from(&mut cursor, FieldKind::String).unwrap();
        assert_eq!(back, Value::Str("x".repeat(STRING_LENGTH)));
    }

    #[test]
    fn tuple_round_trips_and_ignores_rid_in_equality() {
        let desc = sample_desc();
        let tuple = Tuple::new(
            desc.clone(),
            vec![Value::Str("carol".to_string()), Value::Int(30)],
        )
        .unwrap();

        let mut buf = BytesMut::new();
        tuple.write_to(&mut buf);
        let mut cursor = &buf[..];
        let mut back = Tuple::read_from(&mut cursor, &desc).unwrap();
        assert_eq!(back, tuple);

        back.rid = Some(Rid::Heap(HeapRid {
            page_no: 0,
            slot_no: 3,
        }));
        assert_eq!(back, tuple);
    }

    #[test]
    fn short_buffer_is_malformed() {
        let desc = sample_desc();
        let mut cursor = &[0u8; 4][..];
        let err = Tuple::read_from(&mut cursor, &desc).unwrap_err();
        assert!(matches!(err, DbError::MalformedData(_)));
    }

    #[test]
    fn field_lookup_honors_qualifiers() {
        let desc = TupleDesc::new(vec![
            FieldType::qualified("id", "t1", FieldKind::Int),
            FieldType::qualified("id", "t2", FieldKind::Int),
        ]);
        assert_eq!(desc.field_index("id", None), Some(0));
        assert_eq!(desc.field_index("id", Some("t2")), Some(1));
        assert_eq!(desc.field_index("missing", None), None);
    }
}
