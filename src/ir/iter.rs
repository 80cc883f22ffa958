use std::sync::Arc;

use derive_more::{Deref, Display, From, Into};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// What one iteration-space dimension means for aliasing and accumulation order.
///
/// `Parallel` dimensions never alias the same output element and may execute in any
/// order. `Reduction` and `Window` dimensions accumulate into one output element and
/// must keep a fixed order unless the combiner is associative and commutative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum IteratorKind {
    #[display("parallel")]
    Parallel,
    #[display("reduction")]
    Reduction,
    #[display("window")]
    Window,
}

/// The ordered classification of every iteration-space dimension.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Deref, From, Into, Display, Serialize, Deserialize)]
#[display("[{}]", _0.iter().format(", "))]
pub struct Iterators(Arc<[IteratorKind]>);

impl From<Vec<IteratorKind>> for Iterators {
    #[inline]
    fn from(value: Vec<IteratorKind>) -> Self {
        Self(value.into())
    }
}

impl<const N: usize> From<[IteratorKind; N]> for Iterators {
    #[inline]
    fn from(value: [IteratorKind; N]) -> Self {
        Self(value.into())
    }
}

impl Iterators {
    /// An all-parallel iteration space of the given rank.
    #[inline]
    pub fn parallel(rank: usize) -> Self {
        Self(vec![IteratorKind::Parallel; rank].into())
    }

    /// The windowed layout: parallel dimensions, then reduction, then window, in order.
    pub fn windowed(parallel: usize, reduction: usize, window: usize) -> Self {
        let kinds: Vec<_> = std::iter::repeat_n(IteratorKind::Parallel, parallel)
            .chain(std::iter::repeat_n(IteratorKind::Reduction, reduction))
            .chain(std::iter::repeat_n(IteratorKind::Window, window))
            .collect();
        kinds.into()
    }

    #[inline]
    pub fn count(&self, kind: IteratorKind) -> usize {
        self.iter().filter(|&&k| k == kind).count()
    }

    #[inline]
    pub fn window_count(&self) -> usize {
        self.count(IteratorKind::Window)
    }

    /// Returns `true` if every dimension is parallel.
    #[inline]
    pub fn is_parallel(&self) -> bool {
        self.iter().all(|&kind| kind == IteratorKind::Parallel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windowed_layout() {
        let iterators = Iterators::windowed(4, 1, 2);
        assert_eq!(iterators.len(), 7);
        assert_eq!(iterators.count(IteratorKind::Parallel), 4);
        assert_eq!(iterators.count(IteratorKind::Reduction), 1);
        assert_eq!(iterators.window_count(), 2);
        assert_eq!(iterators[3], IteratorKind::Parallel);
        assert_eq!(iterators[4], IteratorKind::Reduction);
        assert_eq!(iterators[5], IteratorKind::Window);
    }

    #[test]
    fn test_parallel() {
        let iterators = Iterators::parallel(3);
        assert!(iterators.is_parallel());
        assert_eq!(iterators.window_count(), 0);

        assert!(!Iterators::windowed(1, 0, 1).is_parallel());
    }

    #[test]
    fn test_display() {
        let iterators = Iterators::windowed(1, 1, 1);
        assert_eq!(iterators.to_string(), "[parallel, reduction, window]");
    }
}
