use basalt::transaction::TransactionId;
use basalt::tuple::{Tuple, TupleDesc, Value};
use basalt::{DbError, Result};

use super::{Operator, TupleStream};
use crate::expr::{value_ordering, Expr};

/// Blocking sort. The first pull drains the child and sorts it stably by
/// lexicographic comparison over the key expressions; a key whose
/// ascending flag is false compares with its operands swapped. Ties across
/// every key keep the child's order.
pub struct OrderBy {
    keys: Vec<Expr>,
    ascending: Vec<bool>,
    child: Box<dyn Operator>,
}

impl std::fmt::Debug for OrderBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBy")
            .field("keys", &self.keys)
            .field("ascending", &self.ascending)
            .finish_non_exhaustive()
    }
}

impl OrderBy {
    pub fn new(keys: Vec<Expr>, ascending: Vec<bool>, child: Box<dyn Operator>) -> Result<OrderBy> {
        if keys.len() != ascending.len() {
            return Err(DbError::IncompatibleTypes(format!(
                "{} sort keys but {} direction flags",
                keys.len(),
                ascending.len()
            )));
        }
        Ok(OrderBy {
            keys,
            ascending,
            child,
        })
    }
}

impl Operator for OrderBy {
    fn descriptor(&self) -> &TupleDesc {
        self.child.descriptor()
    }

    fn iterator(&self, tid: TransactionId) -> Result<Box<dyn TupleStream + '_>> {
        Ok(Box::new(OrderByStream {
            op: self,
            child: Some(self.child.iterator(tid)?),
            sorted: Vec::new(),
            cursor: 0,
        }))
    }
}

struct OrderByStream<'a> {
    op: &'a OrderBy,
    child: Option<Box<dyn TupleStream + 'a>>,
    sorted: Vec<Tuple>,
    cursor: usize,
}

impl OrderByStream<'_> {
    fn materialize(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        // keys are evaluated up front so the comparator stays infallible
        let mut rows: Vec<(Vec<Value>, Tuple)> = Vec::new();
        while let Some(tuple) = child.next()? {
            let key = self
                .op
                .keys
                .iter()
                .map(|expr| expr.eval(Some(&tuple)))
                .collect::<Result<Vec<_>>>()?;
            rows.push((key, tuple));
        }

        let ascending = &self.op.ascending;
        rows.sort_by(|(left, _), (right, _)| {
            for ((a, b), ascending) in left.iter().zip(right).zip(ascending) {
                let ordering = if *ascending {
                    value_ordering(a, b)
                } else {
                    value_ordering(b, a)
                };
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });

        self.sorted = rows.into_iter().map(|(_, tuple)| tuple).collect();
        Ok(())
    }
}

impl TupleStream for OrderByStream<'_> {
    fn next(&mut self) -> Result<Option<Tuple>> {
        self.materialize()?;
        if self.cursor >= self.sorted.len() {
            return Ok(None);
        }
        let tuple = self.sorted[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(tuple))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::{collect, MockScan};
    use basalt::tuple::FieldKind;

    fn names_and_ages(rows: &[Tuple]) -> Vec<(String, i64)> {
        rows.iter()
            .map(|t| match (&t.fields[0], &t.fields[1]) {
                (Value::Str(name), Value::Int(age)) => (name.clone(), *age),
                other => panic!("unexpected fields {:?}", other),
            })
            .collect()
    }

    #[test]
    fn multi_key_sort_honors_per_key_direction() {
        let child = MockScan::people(&[("a", 2), ("b", 1), ("a", 1)]);
        let order = OrderBy::new(
            vec![
                Expr::field("name", FieldKind::String),
                Expr::field("age", FieldKind::Int),
            ],
            vec![true, false],
            Box::new(child),
        )
        .unwrap();

        assert_eq!(
            names_and_ages(&collect(&order)),
            vec![
                ("a".to_string(), 2),
                ("a".to_string(), 1),
                ("b".to_string(), 1)
            ]
        );
    }

    #[test]
    fn equal_keys_preserve_child_order() {
        let child = MockScan::people(&[("x", 1), ("y", 1), ("z", 1), ("w", 1)]);
        let order = OrderBy::new(
            vec![Expr::field("age", FieldKind::Int)],
            vec![true],
            Box::new(child),
        )
        .unwrap();

        let names: Vec<_> = names_and_ages(&collect(&order))
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["x", "y", "z", "w"]);
    }

    #[test]
    fn descending_sort_reverses_the_comparison() {
        let child = MockScan::people(&[("a", 1), ("b", 3), ("c", 2)]);
        let order = OrderBy::new(
            vec![Expr::field("age", FieldKind::Int)],
            vec![false],
            Box::new(child),
        )
        .unwrap();

        let ages: Vec<_> = names_and_ages(&collect(&order))
            .into_iter()
            .map(|(_, age)| age)
            .collect();
        assert_eq!(ages, vec![3, 2, 1]);
    }

    #[test]
    fn key_and_flag_counts_must_agree() {
        let child = MockScan::people(&[]);
        let err = OrderBy::new(
            vec![Expr::field("age", FieldKind::Int)],
            vec![true, false],
            Box::new(child),
        )
        .unwrap_err();
        assert!(matches!(err, DbError::IncompatibleTypes(_)));
    }

    #[test]
    fn sorting_a_shuffled_permutation_recovers_sorted_order() {
        use rand::seq::SliceRandom;

        let mut values: Vec<i64> = (0..100).collect();
        values.shuffle(&mut rand::thread_rng());
        let child = MockScan::ints(values.into_iter());

        let order = OrderBy::new(
            vec![Expr::field("age", FieldKind::Int)],
            vec![true],
            Box::new(child),
        )
        .unwrap();

        let sorted: Vec<_> = collect(&order)
            .into_iter()
            .map(|t| match &t.fields[0] {
                Value::Int(v) => *v,
                other => panic!("unexpected field {:?}", other),
            })
            .collect();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());
    }
}
