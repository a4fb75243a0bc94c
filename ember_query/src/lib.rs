//! # Ember Query
//! Query execution for the Ember database: expression evaluation and the
//! pull-based operator framework over `basalt` storage.

/// The operator framework: scan, filter, project, order-by, limit, and
/// the mutation operators.
pub mod executor;
/// Expressions and predicates evaluated against tuples.
pub mod expr;

pub use executor::{DeleteOp, Filter, InsertOp, Limit, Operator, OrderBy, Project, SeqScan, TupleStream};
pub use expr::{Expr, Predicate};
