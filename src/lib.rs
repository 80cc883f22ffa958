//! `trellis` models structured multi-dimensional array computations (copy, fill,
//! convolution, pooling, and fully generic element-wise/reduction operations) over
//! tensor-like operands. Each operation's access pattern is a set of affine index
//! maps from a shared iteration space to per-operand coordinates, and each iteration
//! dimension is classified as parallel, reduction, or window.
//!
//! ## Key Components
//! 1. **Operation Model** ([`ir`]):
//!    - Immutable value types: shapes, affine maps, iterator classifications.
//!    - [`StructuredOp`] descriptors built by per-variant factories, with windowed
//!      access derived from stride/dilation/padding attributes.
//!    - Structural [`verify`], plus [`fold`] and [`canonicalize`] rewrites.
//!
//! 2. **Lowering** ([`lower`](mod@lower)):
//!    - A descriptor bound to a routine name lowers to a [`LibraryCall`]; anything
//!      else expands to an explicit [`LoopNest`] over the iteration space.
//!    - A sequential reference interpreter ([`evaluate`]) runs lowered forms
//!      against `f32` buffers, fixing the reference accumulation order.
//!
//! ## Design Principles
//! - **Immutability**: maps, shapes, and iterator vectors are shared value types;
//!   any change produces a new value.
//! - **Fail-fast**: construction, verification, lowering, and evaluation surface
//!   structural misuse synchronously as typed errors; nothing is inferred.
//! - **Classification as contract**: parallel dimensions never alias an output
//!   element; reduction and window dimensions keep a fixed accumulation order.

pub mod ir;
pub mod lower;

pub use ir::{
    affine::{AffineExpr, AffineMap, MapError},
    body::{Body, Combiner, IndexedScalarFn, ScalarFn},
    fold::{Fold, canonicalize, fold},
    iter::{IteratorKind, Iterators},
    ops::{Access, BuildError, OpKind, Operand, OperandIr, Role, StructuredOp},
    shape::{Extent, Shape},
    verify::{VerifyError, verify},
    window::{WindowAttrs, weighted_window_index},
};
pub use lower::{
    Buffers, EvalError, LibraryCall, Loop, LoopNest, LowerError, LoweredForm, OperandAccess,
    evaluate, lower,
};
