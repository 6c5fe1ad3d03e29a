//! The external evaluator callback surface.
//!
//! The driver batches freshly selected leaves and hands them to an
//! [`Evaluator`] in one synchronous call; the evaluator returns, per node,
//! seven rows of meta priors over the alphabet, a row of special priors,
//! and a scalar value. [`UniformEvaluator`] is the no-knowledge fallback
//! used by tests and benchmarks.

use rand::Rng;
use rand_distr::{Distribution, Gamma};

use crate::node::NodeRef;

/// Evaluator output for one batch, row `i` belonging to `nodes[i]`.
pub struct Evaluation {
    pub meta_priors: Vec<[Vec<f32>; 7]>,
    pub special_priors: Vec<Vec<f32>>,
    pub values: Vec<f32>,
}

/// A synchronous batch evaluator. The driver calls it between selection
/// and backup; implementations are expected to block until the whole
/// batch is scored.
pub trait Evaluator: Send + Sync {
    fn evaluate_batch(&self, nodes: &[NodeRef]) -> Evaluation;
}

/// Returns uniform priors and zero values for every node.
pub struct UniformEvaluator {
    alphabet_size: usize,
}

impl UniformEvaluator {
    pub fn new(alphabet_size: usize) -> Self {
        UniformEvaluator { alphabet_size }
    }
}

impl Evaluator for UniformEvaluator {
    fn evaluate_batch(&self, nodes: &[NodeRef]) -> Evaluation {
        let row = vec![1.0 / self.alphabet_size as f32; self.alphabet_size];
        let meta_priors = nodes
            .iter()
            .map(|_| std::array::from_fn(|_| row.clone()))
            .collect();
        let special_priors = nodes.iter().map(|_| row.clone()).collect();
        let values = vec![0.0; nodes.len()];
        Evaluation {
            meta_priors,
            special_priors,
            values,
        }
    }
}

/// Samples a Dirichlet-distributed noise vector by normalising gamma
/// draws, shaped for [`Node::add_noise`](crate::Node::add_noise).
pub fn dirichlet_noise<R: Rng + ?Sized>(rng: &mut R, alpha: f32, len: usize) -> Vec<f32> {
    if len == 0 {
        return Vec::new();
    }
    let uniform = vec![1.0 / len as f32; len];
    let Ok(gamma) = Gamma::new(alpha.max(f32::EPSILON), 1.0) else {
        return uniform;
    };
    let draws: Vec<f32> = (0..len).map(|_| gamma.sample(rng)).collect();
    let sum: f32 = draws.iter().sum();
    if sum <= 0.0 {
        return uniform;
    }
    draws.into_iter().map(|d| d / sum).collect()
}
