//! Lowering of verified descriptors into one of two forms: a call to an external
//! routine bound by name, or an explicit loop nest over the iteration space. The
//! [`eval`] module ships a sequential reference interpreter for the lowered forms.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ir::{
    fold::{Fold, fold},
    ops::{OperandIr, Role, StructuredOp},
    verify::{VerifyError, verify},
};

pub mod eval;
pub mod loops;

pub use eval::{Buffers, EvalError, evaluate};
pub use loops::{Loop, LoopNest, OperandAccess};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LowerError {
    #[error("cannot lower unverified operation: {0}")]
    Unverified(#[from] VerifyError),
    #[error("iteration dimension {0} is not bound by any operand extent")]
    UnresolvedBound(usize),
    #[error("iteration dimension {0} is bound to conflicting extents {1} and {2}")]
    BoundMismatch(usize, usize, usize),
}

/// A call to an external routine that implements the operation's semantics.
///
/// Arguments are in `(inputs…, outputs…)` order regardless of the operand table
/// order; the routine is trusted, so the indexing maps carry no further obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryCall {
    pub callee: String,
    pub args: Vec<OperandIr>,
}

/// The result of lowering a descriptor.
#[derive(Debug, Clone)]
pub enum LoweredForm {
    /// The operation folded away; evaluation touches no memory.
    Noop,
    Call(LibraryCall),
    Loops(LoopNest),
}

/// Lowers a descriptor, re-running verification first: a descriptor that cannot
/// pass verification cannot be lowered.
pub fn lower(op: &StructuredOp) -> Result<LoweredForm, LowerError> {
    verify(op)?;

    if let Some(Fold::Noop) = fold(op) {
        return Ok(LoweredForm::Noop);
    }

    if let Some(callee) = &op.library_call {
        let args: Vec<OperandIr> = [Role::Input, Role::Output]
            .into_iter()
            .flat_map(|role| op.operands.iter().filter(move |operand| operand.role == role))
            .cloned()
            .collect();
        log::debug!("lowering {op} to a call to `{callee}`");
        let callee = callee.clone();
        return Ok(LoweredForm::Call(LibraryCall { callee, args }));
    }

    let nest = LoopNest::build(op)?;
    log::debug!("lowering {op} to a {}-deep loop nest", nest.loops.len());
    Ok(LoweredForm::Loops(nest))
}
