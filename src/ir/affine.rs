use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("map composition error: outer domain rank {0} mismatches inner result count {1}")]
    RankMismatch(usize, usize),
    #[error("invalid permutation: {0:?} is not a bijection on [0, {1})")]
    InvalidPermutation(Vec<usize>, usize),
}

/// An affine expression over iteration-space dimensions.
///
/// Multiplication always pairs an expression with an integer constant, so polynomials
/// are unrepresentable by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AffineExpr {
    Dim(usize),
    Const(i64),
    Add(Box<AffineExpr>, Box<AffineExpr>),
    Mul(Box<AffineExpr>, i64),
}

impl AffineExpr {
    #[inline]
    pub fn dim(index: usize) -> Self {
        Self::Dim(index)
    }

    /// Sum of two expressions, folding constants so canonical forms stay unique.
    pub fn add(lhs: Self, rhs: Self) -> Self {
        match (lhs, rhs) {
            (Self::Const(x), Self::Const(y)) => Self::Const(x + y),
            (Self::Const(0), expr) | (expr, Self::Const(0)) => expr,
            (lhs, rhs) => Self::Add(Box::new(lhs), Box::new(rhs)),
        }
    }

    /// Product of an expression and a constant, folding trivial factors.
    pub fn mul(expr: Self, factor: i64) -> Self {
        match (expr, factor) {
            (_, 0) => Self::Const(0),
            (expr, 1) => expr,
            (Self::Const(value), factor) => Self::Const(value * factor),
            (Self::Mul(expr, value), factor) => Self::Mul(expr, value * factor),
            (expr, factor) => Self::Mul(Box::new(expr), factor),
        }
    }

    /// Rebuilds the tree through the folding constructors.
    pub fn simplified(&self) -> Self {
        match self {
            Self::Dim(index) => Self::Dim(*index),
            Self::Const(value) => Self::Const(*value),
            Self::Add(lhs, rhs) => Self::add(lhs.simplified(), rhs.simplified()),
            Self::Mul(expr, factor) => Self::mul(expr.simplified(), *factor),
        }
    }

    /// Replaces every dimension reference `d_i` with `results[i]`.
    pub fn substitute(&self, results: &[Self]) -> Self {
        match self {
            Self::Dim(index) => results[*index].clone(),
            Self::Const(value) => Self::Const(*value),
            Self::Add(lhs, rhs) => Self::add(lhs.substitute(results), rhs.substitute(results)),
            Self::Mul(expr, factor) => Self::mul(expr.substitute(results), *factor),
        }
    }

    /// Evaluates the expression at an iteration-space coordinate vector.
    pub fn eval(&self, coords: &[i64]) -> i64 {
        match self {
            Self::Dim(index) => coords[*index],
            Self::Const(value) => *value,
            Self::Add(lhs, rhs) => lhs.eval(coords) + rhs.eval(coords),
            Self::Mul(expr, factor) => expr.eval(coords) * factor,
        }
    }

    /// The dimension index if the expression is a plain dimension reference.
    #[inline]
    pub fn as_dim(&self) -> Option<usize> {
        match self {
            Self::Dim(index) => Some(*index),
            _ => None,
        }
    }

    /// The largest dimension index referenced, if any.
    pub fn max_dim(&self) -> Option<usize> {
        match self {
            Self::Dim(index) => Some(*index),
            Self::Const(_) => None,
            Self::Add(lhs, rhs) => lhs.max_dim().max(rhs.max_dim()),
            Self::Mul(expr, _) => expr.max_dim(),
        }
    }
}

impl std::ops::Add for AffineExpr {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::add(self, rhs)
    }
}

impl std::ops::Add<i64> for AffineExpr {
    type Output = Self;

    fn add(self, rhs: i64) -> Self {
        Self::add(self, Self::Const(rhs))
    }
}

impl std::ops::Sub<i64> for AffineExpr {
    type Output = Self;

    fn sub(self, rhs: i64) -> Self {
        Self::add(self, Self::Const(-rhs))
    }
}

impl std::ops::Mul<i64> for AffineExpr {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self {
        Self::mul(self, rhs)
    }
}

impl std::fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dim(index) => write!(f, "d{index}"),
            Self::Const(value) => write!(f, "{value}"),
            Self::Add(lhs, rhs) => match rhs.as_ref() {
                Self::Const(value) if *value < 0 => write!(f, "{lhs} - {}", -value),
                rhs => write!(f, "{lhs} + {rhs}"),
            },
            Self::Mul(expr, factor) => match expr.as_ref() {
                Self::Add(..) => write!(f, "({expr}) * {factor}"),
                expr => write!(f, "{expr} * {factor}"),
            },
        }
    }
}

/// A pure affine function from an iteration-space coordinate vector to an operand
/// coordinate vector. Immutable value type; composition produces a new map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AffineMap {
    domain_rank: usize,
    results: Vec<AffineExpr>,
}

impl AffineMap {
    /// Creates a map from its results.
    ///
    /// # Panics
    /// This method will panic if a result references a dimension outside `[0, domain_rank)`.
    pub fn new(domain_rank: usize, results: Vec<AffineExpr>) -> Self {
        assert!(
            results
                .iter()
                .filter_map(AffineExpr::max_dim)
                .all(|index| index < domain_rank),
            "map results must reference dimensions within the domain rank {domain_rank}"
        );
        Self {
            domain_rank,
            results,
        }
    }

    /// The rank-`rank` identity map `(d0, …) -> (d0, …)`.
    #[inline]
    pub fn identity(rank: usize) -> Self {
        let results = (0..rank).map(AffineExpr::Dim).collect();
        Self {
            domain_rank: rank,
            results,
        }
    }

    /// A map whose results are dimension references reordered by `perm`.
    pub fn permutation(perm: &[usize]) -> Result<Self, MapError> {
        let rank = perm.len();
        let mut seen = vec![false; rank];
        for &index in perm {
            if index >= rank || seen[index] {
                return Err(MapError::InvalidPermutation(perm.to_vec(), rank));
            }
            seen[index] = true;
        }
        let results = perm.iter().copied().map(AffineExpr::Dim).collect();
        Ok(Self {
            domain_rank: rank,
            results,
        })
    }

    #[inline]
    pub fn domain_rank(&self) -> usize {
        self.domain_rank
    }

    #[inline]
    pub fn results(&self) -> &[AffineExpr] {
        &self.results
    }

    #[inline]
    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// Substitutes `inner`'s results for `self`'s dimension references, producing the
    /// map that first applies `inner`, then `self`.
    pub fn compose(&self, inner: &Self) -> Result<Self, MapError> {
        if self.domain_rank != inner.result_count() {
            return Err(MapError::RankMismatch(self.domain_rank, inner.result_count()));
        }
        let results = self
            .results
            .iter()
            .map(|expr| expr.substitute(&inner.results))
            .collect();
        Ok(Self {
            domain_rank: inner.domain_rank,
            results,
        })
    }

    /// Evaluates every result at an iteration-space coordinate vector.
    #[inline]
    pub fn apply(&self, coords: &[i64]) -> Vec<i64> {
        self.results.iter().map(|expr| expr.eval(coords)).collect()
    }

    /// Rebuilds every result through the folding constructors.
    #[inline]
    pub fn simplified(&self) -> Self {
        let results = self.results.iter().map(AffineExpr::simplified).collect();
        Self {
            domain_rank: self.domain_rank,
            results,
        }
    }

    /// Returns `true` if the map forwards every domain dimension in order.
    pub fn is_identity(&self) -> bool {
        self.result_count() == self.domain_rank
            && self
                .results
                .iter()
                .enumerate()
                .all(|(index, expr)| expr.as_dim() == Some(index))
    }
}

impl std::fmt::Display for AffineMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}) -> ({})",
            (0..self.domain_rank).format_with(", ", |index, f| f(&format_args!("d{index}"))),
            self.results.iter().format(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_compose_permutation() -> Result<(), MapError> {
        fastrand::seed(42);

        for rank in 1..6 {
            let mut perm: Vec<usize> = (0..rank).collect();
            fastrand::shuffle(&mut perm);

            let p = AffineMap::permutation(&perm)?;
            assert_eq!(AffineMap::identity(rank).compose(&p)?, p);
        }
        Ok(())
    }

    #[test]
    fn test_invalid_permutation() {
        assert_eq!(
            AffineMap::permutation(&[0, 0, 2]),
            Err(MapError::InvalidPermutation(vec![0, 0, 2], 3))
        );
        assert_eq!(
            AffineMap::permutation(&[1, 2]),
            Err(MapError::InvalidPermutation(vec![1, 2], 2))
        );
    }

    #[test]
    fn test_compose_rank_mismatch() {
        let outer = AffineMap::identity(3);
        let inner = AffineMap::identity(2);
        assert_eq!(outer.compose(&inner), Err(MapError::RankMismatch(3, 2)));
    }

    #[test]
    fn test_compose_weighted() -> Result<(), MapError> {
        // outer (d0) -> (d0 * 2 + 1) after inner (d0, d1) -> (d0 + d1)
        let outer = AffineMap::new(1, vec![AffineExpr::dim(0) * 2 + 1]);
        let inner = AffineMap::new(2, vec![AffineExpr::dim(0) + AffineExpr::dim(1)]);
        let composed = outer.compose(&inner)?;
        assert_eq!(composed.domain_rank(), 2);
        assert_eq!(composed.apply(&[3, 4]), vec![15]);
        Ok(())
    }

    #[test]
    fn test_folding_constructors() {
        let expr = AffineExpr::dim(0) * 1 + 0;
        assert_eq!(expr, AffineExpr::dim(0));

        let expr = AffineExpr::dim(1) * 0;
        assert_eq!(expr, AffineExpr::Const(0));

        let expr = (AffineExpr::dim(0) * 2) * 3;
        assert_eq!(expr, AffineExpr::Mul(Box::new(AffineExpr::dim(0)), 6));

        let expr = AffineExpr::Const(2) + 3;
        assert_eq!(expr, AffineExpr::Const(5));
    }

    #[test]
    fn test_eval() {
        let expr = AffineExpr::dim(0) * 2 + AffineExpr::dim(1) * 3 - 1;
        assert_eq!(expr.eval(&[5, 7]), 30);
        assert_eq!(expr.eval(&[0, 0]), -1);
    }

    #[test]
    fn test_display() {
        assert_eq!(AffineMap::identity(2).to_string(), "(d0, d1) -> (d0, d1)");

        let expr = AffineExpr::dim(0) * 2 + AffineExpr::dim(1);
        assert_eq!(expr.to_string(), "d0 * 2 + d1");

        let expr = AffineExpr::dim(0) * 2 + AffineExpr::dim(1) - 1;
        assert_eq!(expr.to_string(), "d0 * 2 + d1 - 1");

        let expr = (AffineExpr::dim(0) + 1) * 2;
        assert_eq!(expr.to_string(), "(d0 + 1) * 2");
    }

    #[test]
    #[should_panic]
    fn test_out_of_domain_result() {
        AffineMap::new(1, vec![AffineExpr::dim(1)]);
    }

    #[test]
    fn test_serde() -> Result<(), serde_json::Error> {
        let map = AffineMap::new(2, vec![AffineExpr::dim(0) * 2 + AffineExpr::dim(1)]);
        let text = serde_json::to_string(&map)?;
        let back: AffineMap = serde_json::from_str(&text)?;
        assert_eq!(map, back);
        Ok(())
    }
}
