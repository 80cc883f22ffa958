use rustc_hash::FxHashMap as HashMap;
use thiserror::Error;

use super::{LoopNest, LoweredForm, OperandAccess};
use crate::ir::ops::Operand;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("no buffer bound for operand %{0}")]
    MissingBuffer(usize),
    #[error("buffer for operand %{0} holds {1} elements, expected {2}")]
    SizeMismatch(usize, usize, usize),
    #[error("operand %{0} accessed out of bounds at {1:?}")]
    OutOfBounds(usize, Vec<i64>),
    #[error("library call `{0}` must be dispatched by the embedder")]
    ExternalCall(String),
}

/// The pool of `f32` buffers the reference interpreter runs against, keyed by
/// operand identity.
#[derive(Debug, Default, Clone)]
pub struct Buffers(HashMap<usize, Vec<f32>>);

impl Buffers {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `data` to the operand, checking its length against the shape.
    pub fn bind(&mut self, operand: &Operand, data: Vec<f32>) -> Result<(), EvalError> {
        let size = operand.shape().size();
        if data.len() != size {
            return Err(EvalError::SizeMismatch(operand.id().get(), data.len(), size));
        }
        self.0.insert(operand.id().get(), data);
        Ok(())
    }

    #[inline]
    pub fn get(&self, operand: &Operand) -> Option<&[f32]> {
        self.0.get(&operand.id().get()).map(Vec::as_slice)
    }

    fn check(&self, access: &OperandAccess) -> Result<(), EvalError> {
        let id = access.operand.id;
        let size = access.operand.shape.size();
        match self.0.get(&id) {
            None => Err(EvalError::MissingBuffer(id)),
            Some(data) if data.len() != size => {
                Err(EvalError::SizeMismatch(id, data.len(), size))
            }
            Some(_) => Ok(()),
        }
    }
}

/// Executes a lowered form against the bound buffers.
///
/// A no-op touches no memory; a library call cannot be run here and reports
/// [`EvalError::ExternalCall`]. A loop nest iterates the full iteration space in
/// lexicographic order, the reference accumulation order. Accumulating bodies
/// combine with the output buffer's current element, so callers seed outputs with
/// the neutral value (typically via a fill).
pub fn evaluate(form: &LoweredForm, buffers: &mut Buffers) -> Result<(), EvalError> {
    match form {
        LoweredForm::Noop => Ok(()),
        LoweredForm::Call(call) => Err(EvalError::ExternalCall(call.callee.clone())),
        LoweredForm::Loops(nest) => evaluate_loops(nest, buffers),
    }
}

fn evaluate_loops(nest: &LoopNest, buffers: &mut Buffers) -> Result<(), EvalError> {
    for access in nest.inputs.iter().chain(nest.outputs.iter()) {
        buffers.check(access)?;
    }

    for coords in nest.points() {
        let inputs: Vec<f32> = nest
            .inputs
            .iter()
            .map(|access| read(buffers, access, &coords, nest.body.padding()))
            .collect::<Result<_, _>>()?;
        // writes never pad, so output reads must land inside the shape
        let outputs: Vec<f32> = nest
            .outputs
            .iter()
            .map(|access| read(buffers, access, &coords, None))
            .collect::<Result<_, _>>()?;

        let results = nest.body.invoke(&coords, &inputs, &outputs);
        for (access, value) in nest.outputs.iter().zip(results) {
            let index = access.map.apply(&coords);
            let offset = access
                .operand
                .shape
                .linear_index(&index)
                .ok_or_else(|| EvalError::OutOfBounds(access.operand.id, index))?;
            let data = buffers
                .0
                .get_mut(&access.operand.id)
                .ok_or(EvalError::MissingBuffer(access.operand.id))?;
            data[offset] = value;
        }
    }
    Ok(())
}

fn read(
    buffers: &Buffers,
    access: &OperandAccess,
    coords: &[i64],
    padding: Option<f32>,
) -> Result<f32, EvalError> {
    let index = access.map.apply(coords);
    let data = &buffers.0[&access.operand.id];
    match access.operand.shape.linear_index(&index) {
        Some(offset) => Ok(data[offset]),
        None => padding.ok_or_else(|| EvalError::OutOfBounds(access.operand.id, index)),
    }
}
