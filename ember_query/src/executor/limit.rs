use basalt::transaction::TransactionId;
use basalt::tuple::{Tuple, TupleDesc, Value};
use basalt::{DbError, Result};

use super::{Operator, TupleStream};
use crate::expr::Expr;

/// Emits at most `bound` child tuples. The bound expression is evaluated
/// once against no tuple when iteration starts; plans whose bound
/// references a field are rejected at construction.
pub struct Limit {
    bound: Expr,
    child: Box<dyn Operator>,
}

impl std::fmt::Debug for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limit").field("bound", &self.bound).finish_non_exhaustive()
    }
}

impl Limit {
    pub fn new(bound: Expr, child: Box<dyn Operator>) -> Result<Limit> {
        if matches!(bound, Expr::Field(_)) {
            return Err(DbError::IncompatibleTypes(
                "limit bound must not reference a field".to_string(),
            ));
        }
        Ok(Limit { bound, child })
    }
}

impl Operator for Limit {
    fn descriptor(&self) -> &TupleDesc {
        self.child.descriptor()
    }

    fn iterator(&self, tid: TransactionId) -> Result<Box<dyn TupleStream + '_>> {
        let remaining = match self.bound.eval(None)? {
            Value::Int(n) if n >= 0 => n as usize,
            Value::Int(n) => {
                return Err(DbError::MalformedData(format!("negative limit {}", n)));
            }
            other => {
                return Err(DbError::TypeMismatch(format!(
                    "limit bound must be an integer, got {}",
                    other
                )));
            }
        };
        Ok(Box::new(LimitStream {
            child: self.child.iterator(tid)?,
            remaining,
        }))
    }
}

struct LimitStream<'a> {
    child: Box<dyn TupleStream + 'a>,
    remaining: usize,
}

impl TupleStream for LimitStream<'_> {
    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        match self.child.next()? {
            Some(tuple) => {
                self.remaining -= 1;
                Ok(Some(tuple))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::{collect, MockScan};
    use basalt::tuple::FieldKind;

    #[test]
    fn caps_the_stream() {
        let child = MockScan::ints(1..=10);
        let limit = Limit::new(Expr::int(3), Box::new(child)).unwrap();
        let rows = collect(&limit);
        let values: Vec<_> = rows.iter().map(|t| t.fields[0].clone()).collect();
        assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn a_short_child_ends_early() {
        let child = MockScan::ints(1..=2);
        let limit = Limit::new(Expr::int(5), Box::new(child)).unwrap();
        assert_eq!(collect(&limit).len(), 2);
    }

    #[test]
    fn zero_limit_yields_nothing() {
        let child = MockScan::ints(1..=5);
        let limit = Limit::new(Expr::int(0), Box::new(child)).unwrap();
        assert!(collect(&limit).is_empty());
    }

    #[test]
    fn field_bounds_are_rejected_at_construction() {
        let child = MockScan::ints(1..=5);
        let err = Limit::new(Expr::field("age", FieldKind::Int), Box::new(child)).unwrap_err();
        assert!(matches!(err, DbError::IncompatibleTypes(_)));
    }

    #[test]
    fn negative_and_non_integer_bounds_fail_at_iteration() {
        let child = MockScan::ints(1..=5);
        let limit = Limit::new(Expr::int(-1), Box::new(child)).unwrap();
        assert!(matches!(
            limit.iterator(TransactionId::new()),
            Err(DbError::MalformedData(_))
        ));

        let child = MockScan::ints(1..=5);
        let limit = Limit::new(Expr::string("three"), Box::new(child)).unwrap();
        assert!(matches!(
            limit.iterator(TransactionId::new()),
            Err(DbError::TypeMismatch(_))
        ));
    }
}
