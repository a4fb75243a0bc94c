use std::collections::HashSet;

use basalt::transaction::TransactionId;
use basalt::tuple::{Tuple, TupleDesc, Value};
use basalt::{DbError, Result};

use super::{Operator, TupleStream};
use crate::expr::Expr;

/// Computes one output field per expression, renamed to the parallel
/// output name. With `distinct`, duplicate projected rows are suppressed;
/// equality is over the projected value vector only, and the first
/// occurrence wins, so output order follows the child.
pub struct Project {
    exprs: Vec<Expr>,
    distinct: bool,
    child: Box<dyn Operator>,
    desc: TupleDesc,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("exprs", &self.exprs)
            .field("distinct", &self.distinct)
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

impl Project {
    pub fn new(
        exprs: Vec<Expr>,
        output_names: Vec<String>,
        distinct: bool,
        child: Box<dyn Operator>,
    ) -> Result<Project> {
        if exprs.len() != output_names.len() {
            return Err(DbError::IncompatibleTypes(format!(
                "{} select expressions but {} output names",
                exprs.len(),
                output_names.len()
            )));
        }
        let fields = exprs
            .iter()
            .zip(&output_names)
            .map(|(expr, name)| {
                let mut field = expr.field_type();
                field.name = name.clone();
                field
            })
            .collect();
        Ok(Project {
            exprs,
            distinct,
            child,
            desc: TupleDesc::new(fields),
        })
    }
}

impl Operator for Project {
    fn descriptor(&self) -> &TupleDesc {
        &self.desc
    }

    fn iterator(&self, tid: TransactionId) -> Result<Box<dyn TupleStream + '_>> {
        Ok(Box::new(ProjectStream {
            op: self,
            child: self.child.iterator(tid)?,
            seen: HashSet::new(),
        }))
    }
}

struct ProjectStream<'a> {
    op: &'a Project,
    child: Box<dyn TupleStream + 'a>,
    seen: HashSet<Vec<Value>>,
}

impl TupleStream for ProjectStream<'_> {
    fn next(&mut self) -> Result<Option<Tuple>> {
        while let Some(tuple) = self.child.next()? {
            let values = self
                .op
                .exprs
                .iter()
                .map(|expr| expr.eval(Some(&tuple)))
                .collect::<Result<Vec<_>>>()?;
            if self.op.distinct && !self.seen.insert(values.clone()) {
                continue;
            }
            return Ok(Some(Tuple::new(self.op.desc.clone(), values)?));
        }
        Ok(None)
    }
}
