// projection.rs - UMAP-style manifold projection to 2D and 3D

use std::collections::BTreeMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use crate::error::{AnalysisError, Result};
use crate::output::finite_or_zero;

const SMOOTH_K_TOLERANCE: f64 = 1e-5;
const SMOOTH_K_ITERATIONS: usize = 64;
const MIN_K_DIST_SCALE: f64 = 1e-3;
const GRADIENT_CLIP: f64 = 4.0;
const INIT_RANGE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Upper bound on the neighbourhood size; the effective k is min(this, N-1)
    pub n_neighbors: usize,
    pub min_dist: f64,
    pub spread: f64,
    /// Optimisation epochs; `None` picks 500 for small inputs and 200 otherwise
    pub n_epochs: Option<usize>,
    pub negative_sample_rate: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            min_dist: 0.1,
            spread: 1.0,
            n_epochs: None,
            negative_sample_rate: 5,
            learning_rate: 1.0,
            seed: 42,
        }
    }
}

/// Low-dimensional coordinates of one sequence within its population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub sequence_id: String,
    pub coords_2d: [f64; 2],
    pub coords_3d: [f64; 3],
}

/// Directed edge of the fuzzy neighbour graph
#[derive(Debug, Clone, Copy)]
struct Edge {
    head: usize,
    tail: usize,
    weight: f64,
}

#[derive(Debug, Clone)]
pub struct ProjectionEngine {
    config: ProjectionConfig,
}

impl ProjectionEngine {
    pub fn new(config: ProjectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    /// Embed every row of `matrix` in both 2D and 3D
    pub fn project(&self, ids: &[String], matrix: &[Vec<f64>]) -> Result<Vec<Embedding>> {
        if ids.len() != matrix.len() {
            return Err(AnalysisError::Config(format!(
                "{} sequence ids for {} feature vectors",
                ids.len(),
                matrix.len()
            )));
        }
        let flat2 = self.embed(matrix, 2)?;
        let flat3 = self.embed(matrix, 3)?;

        Ok(ids
            .iter()
            .enumerate()
            .map(|(i, id)| Embedding {
                sequence_id: id.clone(),
                coords_2d: [flat2[i][0], flat2[i][1]],
                coords_3d: [flat3[i][0], flat3[i][1], flat3[i][2]],
            })
            .collect())
    }

    /// Embed into `dim` dimensions; every coordinate is finite
    pub fn embed(&self, matrix: &[Vec<f64>], dim: usize) -> Result<Vec<Vec<f64>>> {
        let n = matrix.len();
        if n < 2 {
            return Err(AnalysisError::InsufficientData { required: 2, actual: n });
        }
        let k = self.config.n_neighbors.max(1).min(n - 1);
        let n_epochs = self
            .config
            .n_epochs
            .unwrap_or(if n <= 10_000 { 500 } else { 200 })
            .max(1);

        info!("Projecting {} points to {}D (k = {}, {} epochs)", n, dim, k, n_epochs);

        let knn = nearest_neighbors(matrix, k);
        let edges = fuzzy_graph(&knn, k);
        let (a, b) = fit_curve_params(self.config.spread, self.config.min_dist);
        debug!("Curve parameters a = {:.4}, b = {:.4}, {} edges", a, b, edges.len());

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut embedding: Vec<f64> = (0..n * dim)
            .map(|_| rng.gen_range(-INIT_RANGE..INIT_RANGE))
            .collect();

        self.optimize(&mut embedding, dim, n, &edges, a, b, n_epochs, &mut rng);

        Ok(embedding
            .chunks(dim)
            .map(|c| c.iter().map(|&x| finite_or_zero(x)).collect())
            .collect())
    }

    #[allow(clippy::too_many_arguments)]
    fn optimize(
        &self,
        embedding: &mut [f64],
        dim: usize,
        n: usize,
        edges: &[Edge],
        a: f64,
        b: f64,
        n_epochs: usize,
        rng: &mut StdRng,
    ) {
        let max_weight = edges.iter().map(|e| e.weight).fold(0.0, f64::max);
        if max_weight <= 0.0 {
            return;
        }
        // edges too weak to be sampled even once are dropped
        let min_weight = max_weight / n_epochs as f64;
        let edges: Vec<Edge> = edges.iter().copied().filter(|e| e.weight >= min_weight).collect();

        let neg_rate = self.config.negative_sample_rate as f64;
        let epochs_per_sample: Vec<f64> = edges.iter().map(|e| max_weight / e.weight).collect();
        let epochs_per_negative: Vec<f64> = epochs_per_sample
            .iter()
            .map(|&e| if neg_rate > 0.0 { e / neg_rate } else { f64::INFINITY })
            .collect();
        let mut next_sample = epochs_per_sample.clone();
        let mut next_negative = epochs_per_negative.clone();

        for epoch in 0..n_epochs {
            let alpha = self.config.learning_rate * (1.0 - epoch as f64 / n_epochs as f64);
            let now = epoch as f64;

            for (e, edge) in edges.iter().enumerate() {
                if next_sample[e] > now {
                    continue;
                }
                let (j, k) = (edge.head, edge.tail);

                let dist2 = squared_distance(embedding, dim, j, k);
                let coeff = if dist2 > 0.0 {
                    -2.0 * a * b * dist2.powf(b - 1.0) / (a * dist2.powf(b) + 1.0)
                } else {
                    0.0
                };
                for d in 0..dim {
                    let diff = embedding[j * dim + d] - embedding[k * dim + d];
                    let grad = clip(coeff * diff);
                    embedding[j * dim + d] += grad * alpha;
                    embedding[k * dim + d] -= grad * alpha;
                }
                next_sample[e] += epochs_per_sample[e];

                let n_neg = ((now - next_negative[e]) / epochs_per_negative[e]).max(0.0) as usize;
                for _ in 0..n_neg {
                    let other = rng.gen_range(0..n);
                    if other == j {
                        continue;
                    }
                    let dist2 = squared_distance(embedding, dim, j, other);
                    let coeff = if dist2 > 0.0 {
                        2.0 * b / ((0.001 + dist2) * (a * dist2.powf(b) + 1.0))
                    } else {
                        0.0
                    };
                    for d in 0..dim {
                        let grad = if coeff > 0.0 {
                            clip(coeff * (embedding[j * dim + d] - embedding[other * dim + d]))
                        } else {
                            GRADIENT_CLIP
                        };
                        embedding[j * dim + d] += grad * alpha;
                    }
                }
                next_negative[e] += n_neg as f64 * epochs_per_negative[e];
            }
        }
    }
}

impl Default for ProjectionEngine {
    fn default() -> Self {
        Self::new(ProjectionConfig::default())
    }
}

#[inline]
fn clip(x: f64) -> f64 {
    x.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

#[inline]
fn squared_distance(embedding: &[f64], dim: usize, i: usize, j: usize) -> f64 {
    (0..dim)
        .map(|d| {
            let diff = embedding[i * dim + d] - embedding[j * dim + d];
            diff * diff
        })
        .sum()
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Exact k nearest neighbours (self excluded), sorted by distance then index
fn nearest_neighbors(matrix: &[Vec<f64>], k: usize) -> Vec<Vec<(usize, f64)>> {
    (0..matrix.len())
        .into_par_iter()
        .map(|i| {
            let mut dists: Vec<(usize, f64)> = matrix
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(j, row)| (j, euclidean(&matrix[i], row)))
                .collect();
            dists.sort_by(|x, y| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0)));
            dists.truncate(k);
            dists
        })
        .collect()
}

/// Local connectivity `rho` and bandwidth `sigma` for one neighbourhood
fn smooth_knn(distances: &[f64], target: f64, mean_all: f64) -> (f64, f64) {
    let rho = distances.iter().copied().find(|&d| d > 0.0).unwrap_or(0.0);

    let (mut lo, mut hi, mut mid) = (0.0, f64::INFINITY, 1.0);
    for _ in 0..SMOOTH_K_ITERATIONS {
        let psum: f64 = distances
            .iter()
            .map(|&d| {
                let d = d - rho;
                if d > 0.0 { (-d / mid).exp() } else { 1.0 }
            })
            .sum();
        if (psum - target).abs() < SMOOTH_K_TOLERANCE {
            break;
        }
        if psum > target {
            hi = mid;
            mid = (lo + hi) / 2.0;
        } else {
            lo = mid;
            mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
        }
    }

    let mean_local = distances.iter().sum::<f64>() / distances.len().max(1) as f64;
    let floor = if rho > 0.0 { mean_local } else { mean_all } * MIN_K_DIST_SCALE;
    (rho, mid.max(floor).max(f64::MIN_POSITIVE))
}

/// Membership strengths symmetrised with the probabilistic t-conorm
fn fuzzy_graph(knn: &[Vec<(usize, f64)>], k: usize) -> Vec<Edge> {
    let target = (k as f64).log2();
    let total: usize = knn.iter().map(|n| n.len()).sum();
    let mean_all = knn.iter().flatten().map(|&(_, d)| d).sum::<f64>() / total.max(1) as f64;

    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (i, neighbors) in knn.iter().enumerate() {
        let distances: Vec<f64> = neighbors.iter().map(|&(_, d)| d).collect();
        let (rho, sigma) = smooth_knn(&distances, target, mean_all);
        for &(j, d) in neighbors {
            let w = if d - rho <= 0.0 { 1.0 } else { (-(d - rho) / sigma).exp() };
            directed.insert((i, j), w);
        }
    }

    let mut edges = Vec::new();
    for (&(i, j), &w_ij) in &directed {
        let w_ji = directed.get(&(j, i)).copied().unwrap_or(0.0);
        let w = w_ij + w_ji - w_ij * w_ji;
        if w > 0.0 {
            edges.push(Edge { head: i, tail: j, weight: w });
            if !directed.contains_key(&(j, i)) {
                edges.push(Edge { head: j, tail: i, weight: w });
            }
        }
    }
    edges.sort_by(|x, y| (x.head, x.tail).cmp(&(y.head, y.tail)));
    edges
}

fn curve_error(a: f64, b: f64, xs: &[f64], ys: &[f64]) -> f64 {
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let r = 1.0 / (1.0 + a * x.powf(2.0 * b)) - y;
            r * r
        })
        .sum()
}

/// Least-squares fit of 1 / (1 + a x^(2b)) to the offset-exponential target
pub fn fit_curve_params(spread: f64, min_dist: f64) -> (f64, f64) {
    let xs: Vec<f64> = (0..300).map(|i| spread * 3.0 * i as f64 / 299.0).collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|&x| if x < min_dist { 1.0 } else { (-(x - min_dist) / spread).exp() })
        .collect();

    // grid search over (ln a, b), then repeatedly zoom in on the best cell
    let (mut ln_a_lo, mut ln_a_hi) = ((0.001f64).ln(), (100.0f64).ln());
    let (mut b_lo, mut b_hi) = (0.05, 3.0);
    let mut best = (1.0, 1.0, f64::INFINITY);
    const STEPS: usize = 40;

    for _ in 0..8 {
        for ia in 0..=STEPS {
            let ln_a = ln_a_lo + (ln_a_hi - ln_a_lo) * ia as f64 / STEPS as f64;
            for ib in 0..=STEPS {
                let b = b_lo + (b_hi - b_lo) * ib as f64 / STEPS as f64;
                let err = curve_error(ln_a.exp(), b, &xs, &ys);
                if err < best.2 {
                    best = (ln_a.exp(), b, err);
                }
            }
        }
        let (step_a, step_b) = ((ln_a_hi - ln_a_lo) / STEPS as f64, (b_hi - b_lo) / STEPS as f64);
        let ln_a = best.0.ln();
        ln_a_lo = ln_a - 2.0 * step_a;
        ln_a_hi = ln_a + 2.0 * step_a;
        b_lo = (best.1 - 2.0 * step_b).max(1e-3);
        b_hi = best.1 + 2.0 * step_b;
    }
    (best.0, best.1)
}
