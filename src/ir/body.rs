use std::sync::Arc;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// The associative combiner of a pooling-style reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum Combiner {
    #[display("max")]
    Max,
    #[display("min")]
    Min,
    #[display("sum")]
    Sum,
}

impl Combiner {
    /// The neutral element accumulators must be seeded with.
    #[inline]
    pub fn identity(&self) -> f32 {
        match self {
            Self::Max => f32::NEG_INFINITY,
            Self::Min => f32::INFINITY,
            Self::Sum => 0.0,
        }
    }

    #[inline]
    pub fn apply(&self, acc: f32, value: f32) -> f32 {
        match self {
            Self::Max => acc.max(value),
            Self::Min => acc.min(value),
            Self::Sum => acc + value,
        }
    }
}

/// An opaque per-element computation supplied by the caller.
///
/// Arguments are the input element values followed by the current output element
/// values; the callable returns one value per output.
#[derive(Clone)]
pub struct ScalarFn(Arc<dyn Fn(&[f32]) -> Vec<f32> + Send + Sync>);

impl ScalarFn {
    #[inline]
    pub fn new(f: impl Fn(&[f32]) -> Vec<f32> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[inline]
    pub fn call(&self, args: &[f32]) -> Vec<f32> {
        (self.0)(args)
    }
}

impl std::fmt::Debug for ScalarFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ScalarFn")
    }
}

/// A [`ScalarFn`] that additionally receives the current iteration-space coordinates.
#[derive(Clone)]
pub struct IndexedScalarFn(Arc<dyn Fn(&[i64], &[f32]) -> Vec<f32> + Send + Sync>);

impl IndexedScalarFn {
    #[inline]
    pub fn new(f: impl Fn(&[i64], &[f32]) -> Vec<f32> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[inline]
    pub fn call(&self, coords: &[i64], args: &[f32]) -> Vec<f32> {
        (self.0)(coords, args)
    }
}

impl std::fmt::Debug for IndexedScalarFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IndexedScalarFn")
    }
}

/// The per-element computation of a structured operation.
///
/// The canonical bodies are data-free recipes; `Scalar` and `IndexedScalar` carry
/// caller-supplied callables.
#[derive(Debug, Clone)]
pub enum Body {
    /// Forward the single input value to the single output.
    Forward,
    /// Broadcast the scalar input value to every output element.
    Broadcast,
    /// Multiply the two input values and accumulate into the output.
    MulAcc,
    /// Combine the first input value into the output accumulator.
    Reduce(Combiner),
    Scalar(ScalarFn),
    IndexedScalar(IndexedScalarFn),
}

impl Body {
    /// The value an out-of-shape windowed read yields, if the body admits padding.
    pub fn padding(&self) -> Option<f32> {
        match self {
            Self::MulAcc => Some(0.0),
            Self::Reduce(combiner) => Some(combiner.identity()),
            _ => None,
        }
    }

    /// Invokes the body at one iteration point.
    ///
    /// `inputs` and `outputs` hold the current element values in operand order; the
    /// returned vector holds the new value for each output.
    pub fn invoke(&self, coords: &[i64], inputs: &[f32], outputs: &[f32]) -> Vec<f32> {
        match self {
            Self::Forward | Self::Broadcast => vec![inputs[0]],
            Self::MulAcc => vec![outputs[0] + inputs[0] * inputs[1]],
            Self::Reduce(combiner) => vec![combiner.apply(outputs[0], inputs[0])],
            Self::Scalar(f) => {
                let args: Vec<f32> = inputs.iter().chain(outputs.iter()).copied().collect();
                f.call(&args)
            }
            Self::IndexedScalar(f) => {
                let args: Vec<f32> = inputs.iter().chain(outputs.iter()).copied().collect();
                f.call(coords, &args)
            }
        }
    }
}

impl std::fmt::Display for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forward => f.write_str("forward"),
            Self::Broadcast => f.write_str("broadcast"),
            Self::MulAcc => f.write_str("mul_acc"),
            Self::Reduce(combiner) => write!(f, "reduce_{combiner}"),
            Self::Scalar(_) => f.write_str("scalar"),
            Self::IndexedScalar(_) => f.write_str("indexed_scalar"),
        }
    }
}
