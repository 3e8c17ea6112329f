// explain.rs - Per-feature attributions (TreeSHAP with a sampling fallback)

use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::core::forest::{DecisionTree, ProbabilisticClassifier, RandomForest, TreeNode};
use crate::error::{AnalysisError, Result};

/// Probability above which a sequence is picked as the representative example
pub const REPRESENTATIVE_THRESHOLD: f64 = 0.8;

/// How a set of attributions was obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributionMethod {
    /// Exact Shapley values from the tree structure
    TreeExact,
    /// Monte-Carlo estimate against a k-means background
    Sampled { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub feature_name: String,
    pub feature_index: usize,
    pub mean_abs_contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleAttribution {
    pub sequence_id: String,
    pub feature_name: String,
    pub feature_index: usize,
    pub signed_contribution: f64,
}

/// Impurity-based importance straight from the fitted forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature_name: String,
    pub feature_index: usize,
    pub importance: f64,
}

/// Raw contribution matrix, one row per input row
#[derive(Debug, Clone, PartialEq)]
pub struct ShapValues {
    pub base_value: f64,
    pub values: Vec<Vec<f64>>,
    pub method: AttributionMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalExplanation {
    pub base_value: f64,
    pub attributions: Vec<Attribution>,
    pub method: AttributionMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleExplanation {
    pub sequence_id: String,
    pub probability: f64,
    pub base_value: f64,
    pub attributions: Vec<ExampleAttribution>,
    pub method: AttributionMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainConfig {
    /// Maximum number of k-means centroids used as the sampling background
    pub background_size: usize,
    pub n_permutations: usize,
    pub seed: u64,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            background_size: 10,
            n_permutations: 32,
            seed: 42,
        }
    }
}

/// Index of the example to explain: first with P > 0.8, else the first maximum
pub fn select_representative(probabilities: &[f64]) -> Option<usize> {
    if let Some(i) = probabilities.iter().position(|&p| p > REPRESENTATIVE_THRESHOLD) {
        return Some(i);
    }
    let mut best: Option<usize> = None;
    for (i, &p) in probabilities.iter().enumerate() {
        if best.map_or(true, |b| p > probabilities[b]) {
            best = Some(i);
        }
    }
    best
}

fn feature_name(names: &[String], index: usize) -> String {
    names.get(index).cloned().unwrap_or_else(|| format!("feature_{}", index))
}

/// Descending magnitude, ties in canonical feature order
fn rank_by_magnitude(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].abs().total_cmp(&values[a].abs()).then(a.cmp(&b)));
    order
}

/// Impurity importances ranked like SHAP attributions
pub fn model_feature_importance(forest: &RandomForest, names: &[String]) -> Vec<FeatureImportance> {
    let values = forest.feature_importances();
    rank_by_magnitude(values)
        .into_iter()
        .map(|i| FeatureImportance {
            feature_name: feature_name(names, i),
            feature_index: i,
            importance: values[i],
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero: f64,
    one: f64,
    pweight: f64,
}

fn extend_path(path: &mut Vec<PathElement>, zero: f64, one: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero,
        one,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });
    for i in (0..depth).rev() {
        path[i + 1].pweight += one * path[i].pweight * (i + 1) as f64 / (depth + 1) as f64;
        path[i].pweight = zero * path[i].pweight * (depth - i) as f64 / (depth + 1) as f64;
    }
}

fn unwind_path(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let (one, zero) = (path[index].one, path[index].zero);
    let mut next_one = path[depth].pweight;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one * (depth + 1) as f64 / ((i + 1) as f64 * one);
            next_one = tmp - path[i].pweight * zero * (depth - i) as f64 / (depth + 1) as f64;
        } else {
            path[i].pweight = path[i].pweight * (depth + 1) as f64 / (zero * (depth - i) as f64);
        }
    }
    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero = path[i + 1].zero;
        path[i].one = path[i + 1].one;
    }
    path.pop();
}

fn unwound_path_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let (one, zero) = (path[index].one, path[index].zero);
    let mut next_one = path[depth].pweight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = next_one * (depth + 1) as f64 / ((i + 1) as f64 * one);
            total += tmp;
            next_one = path[i].pweight - tmp * zero * (depth - i) as f64 / (depth + 1) as f64;
        } else if zero != 0.0 {
            total += path[i].pweight / zero / ((depth - i) as f64 / (depth + 1) as f64);
        }
    }
    total
}

#[allow(clippy::too_many_arguments)]
fn tree_shap_recurse(
    nodes: &[TreeNode],
    node: usize,
    x: &[f64],
    phi: &mut [f64],
    parent_path: &[PathElement],
    zero: f64,
    one: f64,
    feature: Option<usize>,
) {
    let mut path = parent_path.to_vec();
    extend_path(&mut path, zero, one, feature);

    match &nodes[node] {
        TreeNode::Leaf { value, .. } => {
            for i in 1..path.len() {
                if let Some(f) = path[i].feature {
                    let w = unwound_path_sum(&path, i);
                    phi[f] += w * (path[i].one - path[i].zero) * value;
                }
            }
        }
        TreeNode::Split { feature: f, threshold, left, right, cover } => {
            let (hot, cold) = if x[*f] <= *threshold { (*left, *right) } else { (*right, *left) };

            let (mut incoming_zero, mut incoming_one) = (1.0, 1.0);
            if let Some(k) = (1..path.len()).find(|&k| path[k].feature == Some(*f)) {
                incoming_zero = path[k].zero;
                incoming_one = path[k].one;
                unwind_path(&mut path, k);
            }

            let fraction = |child: usize| {
                if *cover > 0.0 { nodes[child].cover() / cover } else { 0.0 }
            };
            tree_shap_recurse(nodes, hot, x, phi, &path, incoming_zero * fraction(hot), incoming_one, Some(*f));
            tree_shap_recurse(nodes, cold, x, phi, &path, incoming_zero * fraction(cold), 0.0, Some(*f));
        }
    }
}

/// Exact Shapley values of one tree for one row (path-dependent TreeSHAP)
pub fn tree_shap(tree: &DecisionTree, x: &[f64]) -> Vec<f64> {
    let mut phi = vec![0.0; x.len()];
    tree_shap_recurse(tree.nodes(), 0, x, &mut phi, &[], 1.0, 1.0, None);
    phi
}

/// Lloyd's k-means with seeded initial centroids; returns (centroids, weights)
fn kmeans(matrix: &[Vec<f64>], k: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<f64>) {
    let n = matrix.len();
    let k = k.min(n).max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids: Vec<Vec<f64>> = index::sample(&mut rng, n, k)
        .into_iter()
        .map(|i| matrix[i].clone())
        .collect();
    let mut assignment = vec![0usize; n];

    for _ in 0..50 {
        let mut changed = false;
        for (i, row) in matrix.iter().enumerate() {
            let nearest = (0..k)
                .min_by(|&a, &b| {
                    sq_dist(row, &centroids[a]).total_cmp(&sq_dist(row, &centroids[b]))
                })
                .unwrap_or(0);
            if nearest != assignment[i] {
                assignment[i] = nearest;
                changed = true;
            }
        }
        for (c, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&Vec<f64>> = matrix
                .iter()
                .zip(&assignment)
                .filter(|&(_, &a)| a == c)
                .map(|(row, _)| row)
                .collect();
            if members.is_empty() {
                continue;
            }
            for (d, v) in centroid.iter_mut().enumerate() {
                *v = members.iter().map(|r| r[d]).sum::<f64>() / members.len() as f64;
            }
        }
        if !changed {
            break;
        }
    }

    let mut weights = vec![0.0; k];
    for &a in &assignment {
        weights[a] += 1.0 / n as f64;
    }
    (centroids, weights)
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Computes contributions of each feature to P(bacteriocin)
#[derive(Debug, Clone, Default)]
pub struct ExplainabilityEngine {
    config: ExplainConfig,
}

impl ExplainabilityEngine {
    pub fn new(config: ExplainConfig) -> Self {
        Self { config }
    }

    /// Exact path when the classifier exposes trees, sampled estimate otherwise
    pub fn shap_values(
        &self,
        matrix: &[Vec<f64>],
        rows: &[usize],
        classifier: &dyn ProbabilisticClassifier,
    ) -> Result<ShapValues> {
        if matrix.is_empty() {
            return Err(AnalysisError::InsufficientData { required: 1, actual: 0 });
        }
        if let Some(&bad) = rows.iter().find(|&&r| r >= matrix.len()) {
            return Err(AnalysisError::Attribution(format!(
                "row {} out of range for {} feature vectors",
                bad,
                matrix.len()
            )));
        }
        match self.exact(matrix, rows, classifier) {
            Ok(values) => Ok(values),
            Err(e) => {
                warn!("Exact attribution unavailable, falling back to sampling: {}", e);
                self.sampled(matrix, rows, classifier, e.to_string())
            }
        }
    }

    fn exact(
        &self,
        matrix: &[Vec<f64>],
        rows: &[usize],
        classifier: &dyn ProbabilisticClassifier,
    ) -> Result<ShapValues> {
        let forest = classifier.tree_ensemble().ok_or_else(|| {
            AnalysisError::Attribution("classifier does not expose a tree ensemble".to_string())
        })?;
        let width = matrix[0].len();
        if matrix.iter().any(|r| r.len() != width) {
            return Err(AnalysisError::Attribution("feature matrix is ragged".to_string()));
        }
        let max_feature = forest
            .trees()
            .iter()
            .flat_map(|t| t.nodes())
            .filter_map(|n| match n {
                TreeNode::Split { feature, .. } => Some(*feature),
                TreeNode::Leaf { .. } => None,
            })
            .max();
        if max_feature.is_some_and(|f| f >= width) {
            return Err(AnalysisError::Attribution(format!(
                "forest splits on feature {:?} but rows have {} columns",
                max_feature, width
            )));
        }

        let n_trees = forest.trees().len() as f64;
        let values: Vec<Vec<f64>> = rows
            .par_iter()
            .map(|&r| {
                let mut total = vec![0.0; width];
                for tree in forest.trees() {
                    for (acc, v) in total.iter_mut().zip(tree_shap(tree, &matrix[r])) {
                        *acc += v;
                    }
                }
                total.iter_mut().for_each(|v| *v /= n_trees);
                total
            })
            .collect();

        if values.iter().flatten().any(|v| !v.is_finite()) {
            return Err(AnalysisError::Attribution("non-finite tree attribution".to_string()));
        }
        debug!("TreeSHAP over {} trees for {} rows", forest.trees().len(), rows.len());

        Ok(ShapValues {
            base_value: forest.expected_value(),
            values,
            method: AttributionMethod::TreeExact,
        })
    }

    /// Permutation Shapley estimate; additive by construction
    fn sampled(
        &self,
        matrix: &[Vec<f64>],
        rows: &[usize],
        classifier: &dyn ProbabilisticClassifier,
        reason: String,
    ) -> Result<ShapValues> {
        let width = matrix.iter().map(|r| r.len()).max().unwrap_or(0);
        let padded: Vec<Vec<f64>> = matrix
            .iter()
            .map(|r| {
                let mut r = r.clone();
                r.resize(width, 0.0);
                r
            })
            .collect();
        let (background, weights) = kmeans(&padded, self.config.background_size, self.config.seed);
        let base_value: f64 = background
            .iter()
            .zip(&weights)
            .map(|(b, w)| w * classifier.predict_proba(b))
            .sum();
        let n_perm = self.config.n_permutations.max(1);

        let values: Vec<Vec<f64>> = rows
            .par_iter()
            .map(|&r| {
                let x = &padded[r];
                let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(r as u64));
                let mut phi = vec![0.0; width];
                let mut order: Vec<usize> = (0..width).collect();
                for _ in 0..n_perm {
                    order.shuffle(&mut rng);
                    for (z, &w) in background.iter().zip(&weights) {
                        let mut current = z.clone();
                        let mut previous = classifier.predict_proba(&current);
                        for &f in &order {
                            current[f] = x[f];
                            let next = classifier.predict_proba(&current);
                            phi[f] += w * (next - previous);
                            previous = next;
                        }
                    }
                }
                phi.iter_mut().for_each(|v| *v /= n_perm as f64);
                phi
            })
            .collect();

        if values.iter().flatten().any(|v| !v.is_finite()) || !base_value.is_finite() {
            return Err(AnalysisError::Attribution("non-finite sampled attribution".to_string()));
        }

        Ok(ShapValues {
            base_value,
            values,
            method: AttributionMethod::Sampled { reason },
        })
    }

    /// Mean |contribution| per feature over the whole matrix, ranked
    pub fn global_importance(
        &self,
        matrix: &[Vec<f64>],
        classifier: &dyn ProbabilisticClassifier,
        feature_names: &[String],
    ) -> Result<GlobalExplanation> {
        let rows: Vec<usize> = (0..matrix.len()).collect();
        let shap = self.shap_values(matrix, &rows, classifier)?;
        Ok(summarize_global(&shap, feature_names))
    }

    /// Signed contributions for one row, ranked by magnitude
    pub fn explain_example(
        &self,
        matrix: &[Vec<f64>],
        classifier: &dyn ProbabilisticClassifier,
        feature_names: &[String],
        index: usize,
        sequence_id: &str,
    ) -> Result<ExampleExplanation> {
        let shap = self.shap_values(matrix, &[index], classifier)?;
        Ok(summarize_example(&shap, 0, feature_names, sequence_id, classifier.predict_proba(&matrix[index])))
    }
}

/// Rank mean absolute contributions of a contribution matrix
pub fn summarize_global(shap: &ShapValues, feature_names: &[String]) -> GlobalExplanation {
    let width = shap.values.first().map_or(0, |r| r.len());
    let n = shap.values.len().max(1) as f64;
    let mut mean_abs = vec![0.0; width];
    for row in &shap.values {
        for (acc, v) in mean_abs.iter_mut().zip(row) {
            *acc += v.abs();
        }
    }
    mean_abs.iter_mut().for_each(|v| *v /= n);

    let attributions = rank_by_magnitude(&mean_abs)
        .into_iter()
        .map(|i| Attribution {
            feature_name: feature_name(feature_names, i),
            feature_index: i,
            mean_abs_contribution: mean_abs[i],
        })
        .collect();

    GlobalExplanation {
        base_value: shap.base_value,
        attributions,
        method: shap.method.clone(),
    }
}

/// Ranked signed contributions of row `row` of a contribution matrix
pub fn summarize_example(
    shap: &ShapValues,
    row: usize,
    feature_names: &[String],
    sequence_id: &str,
    probability: f64,
) -> ExampleExplanation {
    let values = shap.values.get(row).map(|r| r.as_slice()).unwrap_or(&[]);
    let attributions = rank_by_magnitude(values)
        .into_iter()
        .map(|i| ExampleAttribution {
            sequence_id: sequence_id.to_string(),
            feature_name: feature_name(feature_names, i),
            feature_index: i,
            signed_contribution: values[i],
        })
        .collect();

    ExampleExplanation {
        sequence_id: sequence_id.to_string(),
        probability,
        base_value: shap.base_value,
        attributions,
        method: shap.method.clone(),
    }
}
