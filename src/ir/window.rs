use itertools::izip;
use serde::{Deserialize, Serialize};

use super::{affine::AffineExpr, ops::BuildError};

/// Per-spatial-dimension stride, dilation, and `(low, high)` padding of a windowed
/// operation, resolved to explicit values at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowAttrs {
    pub strides: Vec<i64>,
    pub dilations: Vec<i64>,
    pub padding: Vec<(i64, i64)>,
}

impl WindowAttrs {
    /// Unit strides and dilations, zero padding.
    #[inline]
    pub fn identity(rank: usize) -> Self {
        Self {
            strides: vec![1; rank],
            dilations: vec![1; rank],
            padding: vec![(0, 0); rank],
        }
    }

    /// Resolves optional attributes to explicit values, validating their lengths
    /// against the spatial rank. Absent attributes mean identity.
    pub fn resolve(
        rank: usize,
        strides: Option<Vec<i64>>,
        dilations: Option<Vec<i64>>,
        padding: Option<Vec<(i64, i64)>>,
    ) -> Result<Self, BuildError> {
        let strides = strides.unwrap_or_else(|| vec![1; rank]);
        let dilations = dilations.unwrap_or_else(|| vec![1; rank]);
        let padding = padding.unwrap_or_else(|| vec![(0, 0); rank]);
        if strides.len() != rank {
            return Err(BuildError::ShapeMismatch("strides", rank, strides.len()));
        }
        if dilations.len() != rank {
            return Err(BuildError::ShapeMismatch("dilations", rank, dilations.len()));
        }
        if padding.len() != rank {
            return Err(BuildError::ShapeMismatch("padding", rank, padding.len()));
        }
        Ok(Self {
            strides,
            dilations,
            padding,
        })
    }
}

/// Derives the input index of a windowed access, one expression per spatial
/// dimension: `output * stride + window * dilation - low_pad`.
///
/// `outputs` and `windows` name the iteration-space dimensions playing the windowed
/// output and window roles for each spatial dimension.
pub fn weighted_window_index(
    outputs: &[usize],
    windows: &[usize],
    attrs: &WindowAttrs,
) -> Vec<AffineExpr> {
    izip!(outputs, windows, &attrs.strides, &attrs.dilations, &attrs.padding)
        .map(|(&x, &z, &stride, &dilation, &(low, _))| {
            AffineExpr::dim(x) * stride + AffineExpr::dim(z) * dilation - low
        })
        .collect()
}
