use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::LowerError;
use crate::ir::{
    affine::AffineMap,
    body::Body,
    iter::IteratorKind,
    ops::{OperandIr, Role, StructuredOp},
};

/// One loop of the nest, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loop {
    pub kind: IteratorKind,
    pub extent: usize,
}

/// An operand paired with the map that addresses it from the loop coordinates.
#[derive(Debug, Clone)]
pub struct OperandAccess {
    pub operand: OperandIr,
    pub map: AffineMap,
}

/// The explicit loop-nest form of a structured operation.
///
/// Inside the innermost loop the consumer applies each input map, reads, invokes the
/// body, and writes through each output map. Window and reduction loops are
/// sequential; parallel loops may run in any order.
#[derive(Debug, Clone)]
pub struct LoopNest {
    pub loops: Vec<Loop>,
    pub inputs: Vec<OperandAccess>,
    pub outputs: Vec<OperandAccess>,
    pub body: Body,
}

impl LoopNest {
    /// Derives loop bounds from the operand shapes and splits the operand table by
    /// role. Only plain dimension results bind an extent; a weighted window result
    /// deliberately binds nothing, since the padded input does not constrain the
    /// iteration space.
    pub(super) fn build(op: &StructuredOp) -> Result<Self, LowerError> {
        let rank = op.iterators.len();
        let mut bounds: Vec<Option<usize>> = vec![None; rank];
        for (map, operand) in op.indexing_maps.iter().zip_eq(op.operands.iter()) {
            for (result, extent) in map.results().iter().zip_eq(operand.shape.iter()) {
                let Some(dim) = result.as_dim() else {
                    continue;
                };
                let size = extent.size();
                match bounds[dim] {
                    None => bounds[dim] = Some(size),
                    Some(bound) if bound == size => {}
                    Some(bound) => return Err(LowerError::BoundMismatch(dim, bound, size)),
                }
            }
        }

        let loops: Vec<Loop> = op
            .iterators
            .iter()
            .zip_eq(bounds)
            .enumerate()
            .map(|(dim, (&kind, bound))| match bound {
                Some(extent) => Ok(Loop { kind, extent }),
                None => Err(LowerError::UnresolvedBound(dim)),
            })
            .try_collect()?;

        let access = |role| {
            op.operands
                .iter()
                .zip_eq(op.indexing_maps.iter())
                .filter(|(operand, _)| operand.role == role)
                .map(|(operand, map)| OperandAccess {
                    operand: operand.clone(),
                    map: map.clone(),
                })
                .collect()
        };
        Ok(Self {
            loops,
            inputs: access(Role::Input),
            outputs: access(Role::Output),
            body: op.body.clone(),
        })
    }

    /// Renders the nest in a human-readable indented form.
    pub fn print_pretty(&self) -> String {
        let mut lines = Vec::new();
        for (depth, r#loop) in self.loops.iter().enumerate() {
            lines.push(format!(
                "{}for d{depth} in 0..{}: {}",
                "  ".repeat(depth),
                r#loop.extent,
                r#loop.kind,
            ));
        }
        let indent = "  ".repeat(self.loops.len());
        let index = |map: &AffineMap| map.results().iter().format(", ").to_string();
        for access in &self.inputs {
            lines.push(format!(
                "{indent}read %{}[{}]",
                access.operand.id,
                index(&access.map)
            ));
        }
        lines.push(format!("{indent}{}", self.body));
        for access in &self.outputs {
            lines.push(format!(
                "{indent}write %{}[{}]",
                access.operand.id,
                index(&access.map)
            ));
        }
        lines.join("\n")
    }

    /// The iteration-space coordinates in the reference (lexicographic) order. A
    /// rank-0 space still has one point.
    pub fn points(&self) -> Box<dyn Iterator<Item = Vec<i64>>> {
        if self.loops.is_empty() {
            return Box::new(std::iter::once(Vec::new()));
        }
        let ranges: Vec<_> = self.loops.iter().map(|l| 0..l.extent as i64).collect();
        Box::new(ranges.into_iter().multi_cartesian_product())
    }
}

impl std::fmt::Display for LoopNest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.print_pretty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{
            affine::AffineExpr,
            body::{Combiner, ScalarFn},
            iter::Iterators,
            ops::Operand,
        },
        lower::{LoweredForm, lower},
    };

    #[test]
    fn test_bounds_from_operands() -> Result<(), Box<dyn std::error::Error>> {
        let input = Operand::new([4, 4]);
        let window = Operand::new([2, 2]);
        let output = Operand::new([2, 2]);
        let op = StructuredOp::pooling(
            Combiner::Max,
            &input,
            &window,
            &output,
            Some(vec![2, 2]),
            None,
            None,
        )?;
        let LoweredForm::Loops(nest) = lower(&op)? else {
            panic!("expected a loop nest");
        };

        // output binds (d0, d1), the window shape binds (d2, d3)
        let extents: Vec<_> = nest.loops.iter().map(|l| l.extent).collect();
        assert_eq!(extents, vec![2, 2, 2, 2]);
        assert_eq!(nest.loops[0].kind, IteratorKind::Parallel);
        assert_eq!(nest.loops[3].kind, IteratorKind::Window);
        assert_eq!(nest.inputs.len(), 2);
        assert_eq!(nest.outputs.len(), 1);
        Ok(())
    }

    #[test]
    fn test_bound_mismatch() {
        let a = Operand::new([2]);
        let b = Operand::new([3]);
        let op = StructuredOp::generic(
            &[a],
            &[b],
            vec![AffineMap::identity(1), AffineMap::identity(1)],
            Iterators::parallel(1),
            ScalarFn::new(|args| vec![args[0]]),
        );
        assert!(matches!(
            lower(&op),
            Err(LowerError::BoundMismatch(0, 2, 3))
        ));
    }

    #[test]
    fn test_unresolved_bound() {
        let a = Operand::new([4]);
        let b = Operand::new([4]);
        let dim = |i| AffineMap::new(2, vec![AffineExpr::dim(i)]);
        let op = StructuredOp::generic(
            &[a],
            &[b],
            vec![dim(0), dim(0)],
            Iterators::parallel(2),
            ScalarFn::new(|args| vec![args[0]]),
        );
        assert!(matches!(lower(&op), Err(LowerError::UnresolvedBound(1))));
    }

    #[test]
    fn test_print_pretty() -> Result<(), Box<dyn std::error::Error>> {
        let input = Operand::new([4]);
        let window = Operand::new([2]);
        let output = Operand::new([3]);
        let op = StructuredOp::pooling(
            Combiner::Sum,
            &input,
            &window,
            &output,
            None,
            None,
            None,
        )?;
        let LoweredForm::Loops(nest) = lower(&op)? else {
            panic!("expected a loop nest");
        };
        let text = nest.print_pretty();
        assert!(text.starts_with("for d0 in 0..3: parallel"));
        assert!(text.contains("  for d1 in 0..2: window"));
        assert!(text.contains("d0 + d1"));
        assert!(text.contains("reduce_sum"));
        Ok(())
    }

    #[test]
    fn test_points_order() -> Result<(), Box<dyn std::error::Error>> {
        let a = Operand::new([2, 2]);
        let b = Operand::new([2, 2]);
        let op = StructuredOp::copy(&a, &b, None, None)?;
        let LoweredForm::Loops(nest) = lower(&op)? else {
            panic!("expected a loop nest");
        };
        let points: Vec<_> = nest.points().collect();
        assert_eq!(
            points,
            vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]
        );
        Ok(())
    }
}
