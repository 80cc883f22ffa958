use derive_more::Display;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    affine::{AffineExpr, AffineMap, MapError},
    body::{Body, Combiner, IndexedScalarFn, ScalarFn},
    iter::Iterators,
    shape::Shape,
    window::{WindowAttrs, weighted_window_index},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("shape mismatch in {0}: expected {1}, found {2}")]
    ShapeMismatch(&'static str, usize, usize),
    #[error(transparent)]
    Map(#[from] MapError),
}

/// How an operation uses an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum Role {
    #[display("in")]
    Input,
    #[display("out")]
    Output,
}

/// The memory-access summary of one operand, derived from its role and the iterator
/// classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, Serialize, Deserialize)]
pub enum Access {
    ReadOnly,
    ReadWrite,
    WriteOnly,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperandId;

/// A user-facing operand handle: a shape paired with a process-unique identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    shape: Shape,
    id: uid::Id<OperandId>,
}

impl Operand {
    #[inline]
    pub fn new(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let id = uid::Id::new();
        Self { shape, id }
    }

    /// A rank-0 operand, e.g. the value of a fill.
    #[inline]
    pub fn scalar() -> Self {
        Self::new(Shape::scalar())
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape.clone()
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    #[inline]
    pub fn id(&self) -> uid::Id<OperandId> {
        self.id
    }

    /// The IR value the descriptor's operand table stores.
    #[inline]
    pub fn ir(&self, role: Role) -> OperandIr {
        let shape = self.shape();
        let id = self.id.get();
        OperandIr { shape, id, role }
    }
}

/// One entry of a descriptor's operand table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperandIr {
    pub shape: Shape,
    pub id: usize,
    pub role: Role,
}

/// The closed set of operation variants. Variant-specific attributes live here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    Copy,
    Fill,
    Conv(WindowAttrs),
    Pooling {
        combiner: Combiner,
        attrs: WindowAttrs,
    },
    Generic,
    IndexedGeneric,
}

impl OpKind {
    /// Returns `true` if the variant derives its input access from a sliding window.
    #[inline]
    pub fn is_windowed(&self) -> bool {
        matches!(self, Self::Conv(_) | Self::Pooling { .. })
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => f.write_str("copy"),
            Self::Fill => f.write_str("fill"),
            Self::Conv(_) => f.write_str("conv"),
            Self::Pooling { combiner, .. } => write!(f, "pooling_{combiner}"),
            Self::Generic => f.write_str("generic"),
            Self::IndexedGeneric => f.write_str("indexed_generic"),
        }
    }
}

/// The complete, verifiable description of one structured computation instance.
///
/// Built once by a variant factory, optionally rewritten by canonicalization, then
/// consumed read-only by verification and lowering.
#[derive(Debug, Clone)]
pub struct StructuredOp {
    pub kind: OpKind,
    pub operands: Vec<OperandIr>,
    pub indexing_maps: Vec<AffineMap>,
    pub iterators: Iterators,
    pub library_call: Option<String>,
    pub body: Body,
}

impl StructuredOp {
    /// Copies `input` into `output`, optionally permuting the axes on either side.
    pub fn copy(
        input: &Operand,
        output: &Operand,
        input_permutation: Option<&[usize]>,
        output_permutation: Option<&[usize]>,
    ) -> Result<Self, BuildError> {
        let rank = input.rank();
        if output.rank() != rank {
            return Err(BuildError::ShapeMismatch("copy output", rank, output.rank()));
        }
        let map = |perm: Option<&[usize]>| match perm {
            Some(perm) if perm.len() != rank => Err(BuildError::ShapeMismatch(
                "copy permutation",
                rank,
                perm.len(),
            )),
            Some(perm) => Ok(AffineMap::permutation(perm)?),
            None => Ok(AffineMap::identity(rank)),
        };
        let indexing_maps = vec![map(input_permutation)?, map(output_permutation)?];
        let operands = vec![input.ir(Role::Input), output.ir(Role::Output)];
        let iterators = Iterators::parallel(rank);
        Ok(Self {
            kind: OpKind::Copy,
            operands,
            indexing_maps,
            iterators,
            library_call: None,
            body: Body::Forward,
        })
    }

    /// Writes the rank-0 `value` to every element of `output`.
    ///
    /// Fill has no side effect beyond writing `output`; its access summary reports
    /// the output as write-only.
    pub fn fill(output: &Operand, value: &Operand) -> Result<Self, BuildError> {
        if value.rank() != 0 {
            return Err(BuildError::ShapeMismatch("fill value", 0, value.rank()));
        }
        let rank = output.rank();
        let operands = vec![output.ir(Role::Output), value.ir(Role::Input)];
        let indexing_maps = vec![AffineMap::identity(rank), AffineMap::new(rank, vec![])];
        let iterators = Iterators::parallel(rank);
        Ok(Self {
            kind: OpKind::Fill,
            operands,
            indexing_maps,
            iterators,
            library_call: None,
            body: Body::Broadcast,
        })
    }

    /// Convolves `input` with `filter` into `output`.
    ///
    /// All three operands share rank `w + 2`: the input is `(batch, spatial…, q)`,
    /// the filter `(window…, q, f)`, the output `(batch, spatial…, f)`, with the
    /// batch and feature dimension counts fixed at one. Absent attributes resolve to
    /// identity values.
    pub fn conv(
        filter: &Operand,
        input: &Operand,
        output: &Operand,
        strides: Option<Vec<i64>>,
        dilations: Option<Vec<i64>>,
        padding: Option<Vec<(i64, i64)>>,
    ) -> Result<Self, BuildError> {
        let rank = output.rank();
        if input.rank() != rank {
            return Err(BuildError::ShapeMismatch("conv input", rank, input.rank()));
        }
        if filter.rank() != rank {
            return Err(BuildError::ShapeMismatch("conv filter", rank, filter.rank()));
        }
        if rank < 2 {
            return Err(BuildError::ShapeMismatch("conv output", 2, rank));
        }
        let window = rank - 2;
        let attrs = WindowAttrs::resolve(window, strides, dilations, padding)?;

        // iteration space: (b, x…, f, q, z…)
        let b = 0;
        let f = window + 1;
        let q = window + 2;
        let x: Vec<usize> = (1..=window).collect();
        let z: Vec<usize> = (window + 3..2 * window + 3).collect();
        let domain = 2 * window + 3;

        let filter_map = AffineMap::new(
            domain,
            z.iter()
                .map(|&i| AffineExpr::dim(i))
                .chain([AffineExpr::dim(q), AffineExpr::dim(f)])
                .collect(),
        );
        let input_map = AffineMap::new(
            domain,
            std::iter::once(AffineExpr::dim(b))
                .chain(weighted_window_index(&x, &z, &attrs))
                .chain(std::iter::once(AffineExpr::dim(q)))
                .collect(),
        );
        let output_map = AffineMap::new(
            domain,
            std::iter::once(AffineExpr::dim(b))
                .chain(x.iter().map(|&i| AffineExpr::dim(i)))
                .chain(std::iter::once(AffineExpr::dim(f)))
                .collect(),
        );

        let operands = vec![
            filter.ir(Role::Input),
            input.ir(Role::Input),
            output.ir(Role::Output),
        ];
        let indexing_maps = vec![filter_map, input_map, output_map];
        let iterators = Iterators::windowed(window + 2, 1, window);
        Ok(Self {
            kind: OpKind::Conv(attrs),
            operands,
            indexing_maps,
            iterators,
            library_call: None,
            body: Body::MulAcc,
        })
    }

    /// Reduces each sliding window of `input` into one element of `output`.
    ///
    /// The `window` operand only carries the window's shape; its element values are
    /// never read by the body. All three operands share the spatial rank.
    pub fn pooling(
        combiner: Combiner,
        input: &Operand,
        window: &Operand,
        output: &Operand,
        strides: Option<Vec<i64>>,
        dilations: Option<Vec<i64>>,
        padding: Option<Vec<(i64, i64)>>,
    ) -> Result<Self, BuildError> {
        let rank = output.rank();
        if input.rank() != rank {
            return Err(BuildError::ShapeMismatch("pooling input", rank, input.rank()));
        }
        if window.rank() != rank {
            return Err(BuildError::ShapeMismatch(
                "pooling window",
                rank,
                window.rank(),
            ));
        }
        let attrs = WindowAttrs::resolve(rank, strides, dilations, padding)?;

        // iteration space: (x…, z…)
        let x: Vec<usize> = (0..rank).collect();
        let z: Vec<usize> = (rank..2 * rank).collect();
        let domain = 2 * rank;

        let input_map = AffineMap::new(domain, weighted_window_index(&x, &z, &attrs));
        let window_map = AffineMap::new(domain, z.iter().map(|&i| AffineExpr::dim(i)).collect());
        let output_map = AffineMap::new(domain, x.iter().map(|&i| AffineExpr::dim(i)).collect());

        let operands = vec![
            input.ir(Role::Input),
            window.ir(Role::Input),
            output.ir(Role::Output),
        ];
        let indexing_maps = vec![input_map, window_map, output_map];
        let iterators = Iterators::windowed(rank, 0, rank);
        Ok(Self {
            kind: OpKind::Pooling { combiner, attrs },
            operands,
            indexing_maps,
            iterators,
            library_call: None,
            body: Body::Reduce(combiner),
        })
    }

    /// Assembles a fully caller-specified operation. The maps and iterators are
    /// taken as given here and validated by verification.
    pub fn generic(
        inputs: &[Operand],
        outputs: &[Operand],
        indexing_maps: Vec<AffineMap>,
        iterators: impl Into<Iterators>,
        body: ScalarFn,
    ) -> Self {
        let operands = inputs
            .iter()
            .map(|operand| operand.ir(Role::Input))
            .chain(outputs.iter().map(|operand| operand.ir(Role::Output)))
            .collect();
        Self {
            kind: OpKind::Generic,
            operands,
            indexing_maps,
            iterators: iterators.into(),
            library_call: None,
            body: Body::Scalar(body),
        }
    }

    /// Like [`generic`](Self::generic), with a body that also observes the current
    /// iteration-space coordinates.
    pub fn indexed_generic(
        inputs: &[Operand],
        outputs: &[Operand],
        indexing_maps: Vec<AffineMap>,
        iterators: impl Into<Iterators>,
        body: IndexedScalarFn,
    ) -> Self {
        let operands = inputs
            .iter()
            .map(|operand| operand.ir(Role::Input))
            .chain(outputs.iter().map(|operand| operand.ir(Role::Output)))
            .collect();
        Self {
            kind: OpKind::IndexedGeneric,
            operands,
            indexing_maps,
            iterators: iterators.into(),
            library_call: None,
            body: Body::IndexedScalar(body),
        }
    }

    /// Binds the operation to an external routine; lowering emits a call instead of
    /// a loop nest.
    #[inline]
    pub fn with_library_call(mut self, callee: impl Into<String>) -> Self {
        self.library_call = Some(callee.into());
        self
    }

    /// The access summary per operand: inputs are read-only; outputs are write-only
    /// in an all-parallel space and read-write accumulators otherwise.
    pub fn accesses(&self) -> Vec<Access> {
        let accumulates = !self.iterators.is_parallel();
        self.operands
            .iter()
            .map(|operand| match operand.role {
                Role::Input => Access::ReadOnly,
                Role::Output if accumulates => Access::ReadWrite,
                Role::Output => Access::WriteOnly,
            })
            .collect()
    }
}

impl std::fmt::Display for StructuredOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let render = |role| {
            self.operands
                .iter()
                .filter(move |operand| operand.role == role)
                .map(|operand| format!("%{} : {}", operand.id, operand.shape))
                .join(", ")
        };
        write!(
            f,
            "{} ins({}) outs({})",
            self.kind,
            render(Role::Input),
            render(Role::Output)
        )?;
        if let OpKind::Conv(attrs) | OpKind::Pooling { attrs, .. } = &self.kind {
            write!(
                f,
                " strides = [{}] dilations = [{}] padding = [{}]",
                attrs.strides.iter().format(", "),
                attrs.dilations.iter().format(", "),
                attrs
                    .padding
                    .iter()
                    .format_with(", ", |(low, high), f| f(&format_args!("({low}, {high})"))),
            )?;
        }
        if let Some(callee) = &self.library_call {
            write!(f, " library_call = \"{callee}\"")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::iter::IteratorKind;

    #[test]
    fn test_copy_rank_mismatch() {
        let input = Operand::new([2, 3]);
        let output = Operand::new([2, 3, 4]);
        let err = StructuredOp::copy(&input, &output, None, None);
        assert!(matches!(err, Err(BuildError::ShapeMismatch("copy output", 2, 3))));
    }

    #[test]
    fn test_copy_bad_permutation() {
        let input = Operand::new([2, 3]);
        let output = Operand::new([3, 2]);
        let err = StructuredOp::copy(&input, &output, None, Some(&[0, 0]));
        assert!(matches!(err, Err(BuildError::Map(MapError::InvalidPermutation(..)))));

        let err = StructuredOp::copy(&input, &output, None, Some(&[0]));
        assert!(matches!(
            err,
            Err(BuildError::ShapeMismatch("copy permutation", 2, 1))
        ));
    }

    #[test]
    fn test_fill_scalar_value() -> Result<(), BuildError> {
        let output = Operand::new([4, 4]);
        let value = Operand::scalar();
        let op = StructuredOp::fill(&output, &value)?;

        // output first, then the scalar
        assert_eq!(op.operands[0].role, Role::Output);
        assert_eq!(op.operands[1].role, Role::Input);
        assert_eq!(op.indexing_maps[0], AffineMap::identity(2));
        assert_eq!(op.indexing_maps[1].result_count(), 0);
        assert!(op.iterators.is_parallel());

        let bad = Operand::new([2]);
        let err = StructuredOp::fill(&output, &bad);
        assert!(matches!(err, Err(BuildError::ShapeMismatch("fill value", 0, 1))));
        Ok(())
    }

    #[test]
    fn test_conv_layout() -> Result<(), BuildError> {
        let filter = Operand::new([2, 2, 1, 1]);
        let input = Operand::new([1, 8, 8, 1]);
        let output = Operand::new([1, 4, 4, 1]);
        let op = StructuredOp::conv(
            &filter,
            &input,
            &output,
            Some(vec![2, 2]),
            Some(vec![1, 1]),
            None,
        )?;

        // (b, x0, x1, f, q, z0, z1)
        assert_eq!(op.iterators.len(), 7);
        assert_eq!(op.iterators.count(IteratorKind::Parallel), 4);
        assert_eq!(op.iterators.count(IteratorKind::Reduction), 1);
        assert_eq!(op.iterators.window_count(), 2);

        // filter indexes (z0, z1, q, f)
        let filter_map = &op.indexing_maps[0];
        assert_eq!(filter_map.results()[0], AffineExpr::dim(5));
        assert_eq!(filter_map.results()[2], AffineExpr::dim(4));
        assert_eq!(filter_map.results()[3], AffineExpr::dim(3));

        // input spatial indices are strided
        let input_map = &op.indexing_maps[1];
        assert_eq!(input_map.results()[1], AffineExpr::dim(1) * 2 + AffineExpr::dim(5));
        assert_eq!(input_map.results()[2], AffineExpr::dim(2) * 2 + AffineExpr::dim(6));

        assert_eq!(
            op.accesses(),
            vec![Access::ReadOnly, Access::ReadOnly, Access::ReadWrite]
        );
        Ok(())
    }

    #[test]
    fn test_conv_rank_too_small() {
        let filter = Operand::new([1]);
        let input = Operand::new([1]);
        let output = Operand::new([1]);
        let err = StructuredOp::conv(&filter, &input, &output, None, None, None);
        assert!(matches!(err, Err(BuildError::ShapeMismatch("conv output", 2, 1))));
    }

    #[test]
    fn test_pooling_layout() -> Result<(), BuildError> {
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

        assert_eq!(op.iterators.len(), 4);
        assert_eq!(op.iterators.count(IteratorKind::Parallel), 2);
        assert_eq!(op.iterators.window_count(), 2);

        // input indexes (x0 * 2 + z0, x1 * 2 + z1)
        let input_map = &op.indexing_maps[0];
        assert_eq!(input_map.results()[0], AffineExpr::dim(0) * 2 + AffineExpr::dim(2));
        assert_eq!(input_map.results()[1], AffineExpr::dim(1) * 2 + AffineExpr::dim(3));
        Ok(())
    }

    #[test]
    fn test_display() -> Result<(), BuildError> {
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
        let text = op.to_string();
        assert!(text.starts_with("pooling_max ins("));
        assert!(text.contains("outs("));
        assert!(text.contains("strides = [2, 2]"));
        assert!(text.contains("padding = [(0, 0), (0, 0)]"));

        let op = op.with_library_call("pooling_max_2d");
        assert!(op.to_string().ends_with("library_call = \"pooling_max_2d\""));
        Ok(())
    }

    #[test]
    fn test_ir_round_trip() -> Result<(), serde_json::Error> {
        let operand = Operand::new([2, 3]);
        let ir = operand.ir(Role::Input);
        let text = serde_json::to_string(&ir)?;
        let back: OperandIr = serde_json::from_str(&text)?;
        assert_eq!(ir, back);
        Ok(())
    }
}
