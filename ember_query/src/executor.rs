//! The pull-based operator framework.
//!
//! An [`Operator`] is a node of a relational plan: it knows its output
//! schema and can hand out a fresh [`TupleStream`] for one execution.
//! Streams are lazy; each `next` call produces at most one tuple, and
//! `Ok(None)` signals end-of-stream. Errors terminate iteration and are
//! propagated to the caller unchanged.

use basalt::transaction::TransactionId;
use basalt::tuple::{Tuple, TupleDesc};
use basalt::Result;

mod dml;
mod filter;
mod limit;
mod order_by;
mod project;
mod scan;

pub use dml::{DeleteOp, InsertOp};
pub use filter::Filter;
pub use limit::Limit;
pub use order_by::OrderBy;
pub use project::Project;
pub use scan::SeqScan;

/// A lazy stream of tuples.
pub trait TupleStream {
    fn next(&mut self) -> Result<Option<Tuple>>;
}

/// A node of a relational plan.
pub trait Operator {
    /// The schema of the tuples this operator emits.
    fn descriptor(&self) -> &TupleDesc;

    /// Start one execution on behalf of `tid`.
    fn iterator(&self, tid: TransactionId) -> Result<Box<dyn TupleStream + '_>>;
}
