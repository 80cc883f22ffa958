use std::sync::Arc;

use derive_more::{Deref, Display, From, Into};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// The size of one operand dimension, either fixed at build time or bound at runtime.
///
/// A dynamic extent still carries the size it is currently bound to; the flag only
/// records that the value is not a compile-time constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum Extent {
    #[display("{_0}")]
    Static(usize),
    #[display("?{_0}")]
    Dynamic(usize),
}

impl Extent {
    #[inline]
    pub fn size(&self) -> usize {
        match *self {
            Self::Static(size) | Self::Dynamic(size) => size,
        }
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }
}

impl From<usize> for Extent {
    #[inline]
    fn from(value: usize) -> Self {
        Self::Static(value)
    }
}

/// Rank and per-dimension extents of one operand. Immutable once an operand is bound.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Deref, From, Into, Display, Serialize, Deserialize)]
#[display("[{}]", _0.iter().format(", "))]
pub struct Shape(Arc<[Extent]>);

impl From<Vec<Extent>> for Shape {
    #[inline]
    fn from(value: Vec<Extent>) -> Self {
        Self(value.into())
    }
}

impl<const N: usize> From<[Extent; N]> for Shape {
    #[inline]
    fn from(value: [Extent; N]) -> Self {
        Self(value.into())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    #[inline]
    fn from(value: [usize; N]) -> Self {
        Self(value.map(Extent::Static).into())
    }
}

impl From<Vec<usize>> for Shape {
    #[inline]
    fn from(value: Vec<usize>) -> Self {
        Self(value.into_iter().map(Extent::Static).collect())
    }
}

impl Shape {
    /// The rank-0 shape of a scalar operand.
    #[inline]
    pub fn scalar() -> Self {
        Self::default()
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.len()
    }

    /// Total element count. A rank-0 shape holds one element.
    #[inline]
    pub fn size(&self) -> usize {
        self.iter().map(Extent::size).product()
    }

    /// Row-major linear offset of `coords`, or `None` if any coordinate is out of bounds.
    pub fn linear_index(&self, coords: &[i64]) -> Option<usize> {
        if coords.len() != self.rank() {
            return None;
        }
        let mut index = 0;
        for (&coord, extent) in coords.iter().zip(self.iter()) {
            let size = extent.size();
            if coord < 0 || coord as usize >= size {
                return None;
            }
            index = index * size + coord as usize;
        }
        Some(index)
    }

    /// Returns `true` if `coords` addresses an element of the shape.
    #[inline]
    pub fn contains(&self, coords: &[i64]) -> bool {
        self.linear_index(coords).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_and_size() {
        let shape = Shape::from([4, 3]);
        assert_eq!(shape.rank(), 2);
        assert_eq!(shape.size(), 12);

        let scalar = Shape::scalar();
        assert_eq!(scalar.rank(), 0);
        assert_eq!(scalar.size(), 1);

        let shape = Shape::from(vec![Extent::Static(2), Extent::Dynamic(5)]);
        assert_eq!(shape.size(), 10);
        assert!(shape[1].is_dynamic());
    }

    #[test]
    fn test_linear_index() {
        let shape = Shape::from([4, 3]);
        assert_eq!(shape.linear_index(&[0, 0]), Some(0));
        assert_eq!(shape.linear_index(&[2, 1]), Some(7));
        assert_eq!(shape.linear_index(&[3, 2]), Some(11));
        assert_eq!(shape.linear_index(&[4, 0]), None);
        assert_eq!(shape.linear_index(&[0, -1]), None);
        assert_eq!(shape.linear_index(&[0]), None);

        assert_eq!(Shape::scalar().linear_index(&[]), Some(0));
    }

    #[test]
    fn test_display() {
        let shape = Shape::from(vec![Extent::Static(4), Extent::Dynamic(3)]);
        assert_eq!(shape.to_string(), "[4, ?3]");
        assert_eq!(Shape::scalar().to_string(), "[]");
    }

    #[test]
    fn test_serde() -> Result<(), serde_json::Error> {
        let shape = Shape::from(vec![Extent::Static(4), Extent::Dynamic(3)]);
        let text = serde_json::to_string(&shape)?;
        let back: Shape = serde_json::from_str(&text)?;
        assert_eq!(shape, back);
        Ok(())
    }
}
