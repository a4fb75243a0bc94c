//! Expressions and predicates evaluated against tuples.

use std::cmp::Ordering;

use basalt::tuple::{FieldKind, FieldType, Tuple, Value};
use basalt::{DbError, Result};

/// Boolean comparison between two values of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Predicate {
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Predicate::Eq => ordering == Ordering::Equal,
            Predicate::Ne => ordering != Ordering::Equal,
            Predicate::Gt => ordering == Ordering::Greater,
            Predicate::Ge => ordering != Ordering::Less,
            Predicate::Lt => ordering == Ordering::Less,
            Predicate::Le => ordering != Ordering::Greater,
        }
    }
}

/// Compare two values, failing on mixed kinds. Ints compare by signed
/// order, strings lexicographically.
pub fn compare_values(left: &Value, right: &Value) -> Result<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => Err(DbError::IncompatibleTypes(format!(
            "cannot compare {:?} with {:?}",
            left.kind(),
            right.kind()
        ))),
    }
}

/// Total order over values for sorting. Within a sort key every value has
/// the expression's kind, so the cross-kind arms never decide a real
/// comparison; they only keep the order total.
pub fn value_ordering(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        (Value::Int(_), Value::Str(_)) => Ordering::Less,
        (Value::Str(_), Value::Int(_)) => Ordering::Greater,
    }
}

/// An expression: either a field access resolved by name against the
/// input tuple, or a constant.
#[derive(Debug, Clone)]
pub enum Expr {
    Field(FieldType),
    Const(Value),
}

impl Expr {
    pub fn field(name: &str, kind: FieldKind) -> Expr {
        Expr::Field(FieldType::new(name, kind))
    }

    pub fn int(v: i64) -> Expr {
        Expr::Const(Value::Int(v))
    }

    pub fn string(s: &str) -> Expr {
        Expr::Const(Value::Str(s.to_string()))
    }

    /// The output field type, used to build projection descriptors.
    pub fn field_type(&self) -> FieldType {
        match self {
            Expr::Field(field) => field.clone(),
            Expr::Const(value) => FieldType::new("const", value.kind()),
        }
    }

    pub fn eval(&self, tuple: Option<&Tuple>) -> Result<Value> {
        match self {
            Expr::Const(value) => Ok(value.clone()),
            Expr::Field(field) => {
                let tuple = tuple.ok_or_else(|| {
                    DbError::TypeMismatch(format!(
                        "field {} referenced without an input tuple",
                        field.name
                    ))
                })?;
                let qualifier = if field.qualifier.is_empty() {
                    None
                } else {
                    Some(field.qualifier.as_str())
                };
                tuple.field_named(&field.name, qualifier).cloned()
            }
        }
    }
}
