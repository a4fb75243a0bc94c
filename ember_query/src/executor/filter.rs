use basalt::transaction::TransactionId;
use basalt::tuple::{Tuple, TupleDesc};
use basalt::Result;

use super::{Operator, TupleStream};
use crate::expr::{compare_values, Expr, Predicate};

/// Emits the child tuples for which `left op right` holds.
pub struct Filter {
    left: Expr,
    predicate: Predicate,
    right: Expr,
    child: Box<dyn Operator>,
}

impl Filter {
    pub fn new(left: Expr, predicate: Predicate, right: Expr, child: Box<dyn Operator>) -> Filter {
        Filter {
            left,
            predicate,
            right,
            child,
        }
    }
}

impl Operator for Filter {
    fn descriptor(&self) -> &TupleDesc {
        self.child.descriptor()
    }

    fn iterator(&self, tid: TransactionId) -> Result<Box<dyn TupleStream + '_>> {
        Ok(Box::new(FilterStream {
            op: self,
            child: self.child.iterator(tid)?,
        }))
    }
}

struct FilterStream<'a> {
    op: &'a Filter,
    child: Box<dyn TupleStream + 'a>,
}

impl TupleStream for FilterStream<'_> {
    fn next(&mut self) -> Result<Option<Tuple>> {
        while let Some(tuple) = self.child.next()? {
            let left = self.op.left.eval(Some(&tuple))?;
            let right = self.op.right.eval(Some(&tuple))?;
            if self.op.predicate.holds(compare_values(&left, &right)?) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::{collect, MockScan};
    use basalt::tuple::{FieldKind, Value};
    use basalt::DbError;

    #[test]
    fn keeps_only_matching_tuples() {
        let child = MockScan::people(&[("alice", 10), ("bob", 20), ("carol", 30)]);
        let filter = Filter::new(
            Expr::field("age", FieldKind::Int),
            Predicate::Gt,
            Expr::int(15),
            Box::new(child),
        );

        let rows = collect(&filter);
        let ages: Vec<_> = rows.iter().map(|t| t.fields[1].clone()).collect();
        assert_eq!(ages, vec![Value::Int(20), Value::Int(30)]);
    }

    #[test]
    fn descriptor_is_the_childs() {
        let child = MockScan::people(&[]);
        let expected = child.descriptor().clone();
        let filter = Filter::new(
            Expr::field("name", FieldKind::String),
            Predicate::Eq,
            Expr::string("alice"),
            Box::new(child),
        );
        assert_eq!(filter.descriptor(), &expected);
    }

    #[test]
    fn comparing_across_kinds_terminates_with_an_error() {
        let child = MockScan::people(&[("alice", 10)]);
        let filter = Filter::new(
            Expr::field("name", FieldKind::String),
            Predicate::Eq,
            Expr::int(1),
            Box::new(child),
        );

        let mut stream = filter.iterator(TransactionId::new()).unwrap();
        assert!(matches!(
            stream.next(),
            Err(DbError::IncompatibleTypes(_))
        ));
    }

    #[test]
    fn string_equality_filter() {
        let child = MockScan::people(&[("alice", 10), ("bob", 20), ("alice", 30)]);
        let filter = Filter::new(
            Expr::field("name", FieldKind::String),
            Predicate::Eq,
            Expr::string("alice"),
            Box::new(child),
        );
        assert_eq!(collect(&filter).len(), 2);
    }
}
