use itertools::Itertools;
use thiserror::Error;

use super::ops::{Role, StructuredOp};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("operation has {maps} indexing maps for {operands} operands")]
    OperandMapCountMismatch { maps: usize, operands: usize },
    #[error("indexing map {index} has domain rank {found}, iteration space has rank {expected}")]
    IteratorRankMismatch {
        index: usize,
        found: usize,
        expected: usize,
    },
    #[error("indexing map {index} yields {found} indices for an operand of rank {expected}")]
    OperandRankMismatch {
        index: usize,
        found: usize,
        expected: usize,
    },
    #[error("windowed operation has no window dimension")]
    NoWindowDimension,
    #[error("operation has no output operand")]
    NoOutput,
}

/// Checks the structural consistency of a descriptor. Pure; first failure wins.
pub fn verify(op: &StructuredOp) -> Result<(), VerifyError> {
    // 1. one indexing map per operand
    if op.indexing_maps.len() != op.operands.len() {
        return Err(VerifyError::OperandMapCountMismatch {
            maps: op.indexing_maps.len(),
            operands: op.operands.len(),
        });
    }

    // 2. every map ranges over the shared iteration space
    let rank = op.iterators.len();
    for (index, map) in op.indexing_maps.iter().enumerate() {
        if map.domain_rank() != rank {
            return Err(VerifyError::IteratorRankMismatch {
                index,
                found: map.domain_rank(),
                expected: rank,
            });
        }
    }

    // 3. every map addresses its operand's full rank
    for (index, (map, operand)) in op
        .indexing_maps
        .iter()
        .zip_eq(op.operands.iter())
        .enumerate()
    {
        if map.result_count() != operand.shape.rank() {
            return Err(VerifyError::OperandRankMismatch {
                index,
                found: map.result_count(),
                expected: operand.shape.rank(),
            });
        }
    }

    // 4. windowed variants must actually window
    if op.kind.is_windowed() && op.iterators.window_count() == 0 {
        return Err(VerifyError::NoWindowDimension);
    }

    // 5. something must be written
    if !op.operands.iter().any(|operand| operand.role == Role::Output) {
        return Err(VerifyError::NoOutput);
    }

    Ok(())
}
