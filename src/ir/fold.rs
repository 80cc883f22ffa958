use super::ops::{OpKind, StructuredOp};

/// The result of a successful local fold. The surrounding rewriter erases the op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fold {
    Noop,
}

/// Folds the operation when provably safe and purely local: a copy whose source and
/// destination are the same operand under identical indexing maps moves nothing.
pub fn fold(op: &StructuredOp) -> Option<Fold> {
    if !matches!(op.kind, OpKind::Copy) {
        return None;
    }
    match (op.operands.as_slice(), op.indexing_maps.as_slice()) {
        ([input, output], [input_map, output_map])
            if input.id == output.id && input_map == output_map =>
        {
            log::debug!("folding self-copy of %{} to a no-op", input.id);
            Some(Fold::Noop)
        }
        _ => None,
    }
}

/// Rewrites every indexing map into its canonical simplified form. Returns whether
/// anything changed.
pub fn canonicalize(op: &mut StructuredOp) -> bool {
    let mut changed = false;
    for map in op.indexing_maps.iter_mut() {
        let simplified = map.simplified();
        if simplified != *map {
            *map = simplified;
            changed = true;
        }
    }
    if changed {
        log::debug!("canonicalized indexing maps of {op}");
    }
    changed
}
