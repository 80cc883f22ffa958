//! The operation model: shapes, affine index maps, iterator classification, and the
//! verified descriptor the lowering engine consumes.
//!
//! ## Key Components
//! 1. **Value Types**:
//!    - [`Shape`](shape::Shape) and [`Extent`](shape::Extent) describe one operand.
//!    - [`AffineMap`](affine::AffineMap) carries the access pattern from the shared
//!      iteration space to operand coordinates.
//!    - [`Iterators`](iter::Iterators) classifies each iteration dimension as
//!      parallel, reduction, or window.
//!
//! 2. **Descriptors**:
//!    - [`StructuredOp`](ops::StructuredOp) aggregates operands, maps, iterators,
//!      an optional library call, and the per-element [`Body`](body::Body).
//!    - Variant factories (`copy`, `fill`, `conv`, `pooling`, `generic`,
//!      `indexed_generic`) are the only construction paths; windowed variants derive
//!      their input access through [`window`].
//!
//! 3. **Analyses**:
//!    - [`verify`](verify::verify) checks structural consistency.
//!    - [`fold`](fold::fold) and [`canonicalize`](fold::canonicalize) rewrite
//!      descriptors where provably safe.

pub mod affine;
pub mod body;
pub mod fold;
pub mod iter;
pub mod ops;
pub mod shape;
pub mod verify;
pub mod window;
