// forest.rs - Random forest classifier with exposed tree structure

use std::fmt::Debug;
use indicatif::ProgressBar;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
#[cfg(feature = "debug-stats")]
use tracing::debug;
use crate::error::{AnalysisError, Result};

/// Probabilistic binary decision function
///
/// `predict_proba` returns P(bacteriocin) for one scaled row.
pub trait ProbabilisticClassifier: Send + Sync + Debug {
    fn predict_proba(&self, row: &[f64]) -> f64;

    /// Number of input features the classifier was fitted on
    fn n_features(&self) -> usize;

    /// Tree structure, when the classifier is a tree ensemble
    fn tree_ensemble(&self) -> Option<&RandomForest> {
        None
    }
}

/// Forest hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split; `None` means sqrt(width)
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

/// Node of a fitted tree; `cover` is the number of training samples reaching it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        cover: f64,
    },
    Leaf {
        value: f64,
        cover: f64,
    },
}

impl TreeNode {
    pub fn cover(&self) -> f64 {
        match self {
            TreeNode::Split { cover, .. } | TreeNode::Leaf { cover, .. } => *cover,
        }
    }
}

/// CART tree with Gini impurity; root is node 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

/// Best split found for a node
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    weighted_impurity: f64,
}

#[inline]
fn gini(positive: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positive as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

impl DecisionTree {
    /// Build a tree from explicit parts (leaf values are P(class 1))
    pub fn from_nodes(nodes: Vec<TreeNode>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(AnalysisError::Training("tree has no nodes".to_string()));
        }
        for node in &nodes {
            if let TreeNode::Split { left, right, .. } = node {
                if *left >= nodes.len() || *right >= nodes.len() {
                    return Err(AnalysisError::Training("tree child index out of range".to_string()));
                }
            }
        }
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split { feature, threshold, left, right, .. } => {
                    let x = row.get(*feature).copied().unwrap_or(0.0);
                    index = if x <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Cover-weighted mean leaf value (the tree's expected output)
    pub fn expected_value(&self) -> f64 {
        let root_cover = self.nodes[0].cover();
        if root_cover <= 0.0 {
            return 0.0;
        }
        self.nodes
            .iter()
            .filter_map(|n| match n {
                TreeNode::Leaf { value, cover } => Some(value * cover),
                _ => None,
            })
            .sum::<f64>()
            / root_cover
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], index: usize) -> usize {
            match &nodes[index] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    fn fit(
        x: &[Vec<f64>],
        y: &[u8],
        samples: Vec<usize>,
        config: &ForestConfig,
        max_features: usize,
        rng: &mut StdRng,
        importances: &mut [f64],
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, y, samples, 0, config, max_features, rng, importances);
        tree
    }

    #[allow(clippy::too_many_arguments)]
    fn grow(
        &mut self,
        x: &[Vec<f64>],
        y: &[u8],
        samples: Vec<usize>,
        depth: usize,
        config: &ForestConfig,
        max_features: usize,
        rng: &mut StdRng,
        importances: &mut [f64],
    ) -> usize {
        let n = samples.len();
        let positive = samples.iter().filter(|&&i| y[i] == 1).count();
        let node_id = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            value: if n > 0 { positive as f64 / n as f64 } else { 0.0 },
            cover: n as f64,
        });

        let pure = positive == 0 || positive == n;
        let too_deep = config.max_depth.is_some_and(|d| depth >= d);
        if pure || too_deep || n < config.min_samples_split.max(2) {
            return node_id;
        }

        let Some(best) = Self::best_split(x, y, &samples, positive, config, max_features, rng) else {
            return node_id;
        };

        importances[best.feature] += n as f64 * gini(positive, n) - best.weighted_impurity;

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| x[i][best.feature] <= best.threshold);

        let left = self.grow(x, y, left_samples, depth + 1, config, max_features, rng, importances);
        let right = self.grow(x, y, right_samples, depth + 1, config, max_features, rng, importances);

        self.nodes[node_id] = TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
            cover: n as f64,
        };
        node_id
    }

    /// Scan features in random order until `max_features` non-constant ones were tried
    fn best_split(
        x: &[Vec<f64>],
        y: &[u8],
        samples: &[usize],
        positive: usize,
        config: &ForestConfig,
        max_features: usize,
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let width = x[samples[0]].len();
        let n = samples.len();
        let min_leaf = config.min_samples_leaf.max(1);

        let mut order: Vec<usize> = (0..width).collect();
        order.shuffle(rng);

        let mut best: Option<SplitCandidate> = None;
        let mut tried = 0;
        let mut values: Vec<(f64, u8)> = Vec::with_capacity(n);

        for feature in order {
            if tried >= max_features {
                break;
            }
            values.clear();
            values.extend(samples.iter().map(|&i| (x[i][feature], y[i])));
            values.sort_by(|a, b| a.0.total_cmp(&b.0));

            if values[0].0 == values[n - 1].0 {
                continue; // constant in this node
            }
            tried += 1;

            let mut left_pos = 0;
            for k in 0..n - 1 {
                if values[k].1 == 1 {
                    left_pos += 1;
                }
                let left_n = k + 1;
                let right_n = n - left_n;
                if values[k].0 == values[k + 1].0 || left_n < min_leaf || right_n < min_leaf {
                    continue;
                }
                let impurity = left_n as f64 * gini(left_pos, left_n)
                    + right_n as f64 * gini(positive - left_pos, right_n);

                if best.as_ref().map_or(true, |b| impurity < b.weighted_impurity) {
                    let (lo, hi) = (values[k].0, values[k + 1].0);
                    let mut threshold = lo + (hi - lo) / 2.0;
                    if threshold >= hi {
                        threshold = lo;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        weighted_impurity: impurity,
                    });
                }
            }
        }
        best
    }
}

/// Bagged ensemble of CART trees averaging leaf probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    /// Fit on a scaled matrix with 0/1 labels; trees are grown in parallel
    pub fn fit(
        x: &[Vec<f64>],
        y: &[u8],
        config: &ForestConfig,
        progress: Option<&ProgressBar>,
    ) -> Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(AnalysisError::Training(format!(
                "feature matrix has {} rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        if config.n_estimators == 0 {
            return Err(AnalysisError::Training("n_estimators must be positive".to_string()));
        }
        let width = x[0].len();
        let n = x.len();
        let max_features = config
            .max_features
            .unwrap_or_else(|| (width as f64).sqrt().round() as usize)
            .clamp(1, width.max(1));

        info!(
            "Training forest: {} trees, {} samples, {} features ({} per split)",
            config.n_estimators, n, width, max_features
        );

        let fitted: Vec<(DecisionTree, Vec<f64>)> = (0..config.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(t as u64));
                let samples: Vec<usize> = if config.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                let mut importances = vec![0.0; width];
                let tree = DecisionTree::fit(x, y, samples, config, max_features, &mut rng, &mut importances);

                #[cfg(feature = "debug-stats")]
                debug!("tree {}: depth {}, {} nodes", t, tree.depth(), tree.nodes().len());

                if let Some(pb) = progress {
                    pb.inc(1);
                }
                (tree, importances)
            })
            .collect();

        let mut feature_importances = vec![0.0; width];
        let mut trees = Vec::with_capacity(fitted.len());
        for (tree, importances) in fitted {
            let total: f64 = importances.iter().sum();
            if total > 0.0 {
                for (acc, v) in feature_importances.iter_mut().zip(&importances) {
                    *acc += v / total;
                }
            }
            trees.push(tree);
        }
        let total: f64 = feature_importances.iter().sum();
        if total > 0.0 {
            feature_importances.iter_mut().for_each(|v| *v /= total);
        }

        Ok(Self {
            trees,
            n_features: width,
            feature_importances,
        })
    }

    /// Assemble a forest from already-built trees
    pub fn from_trees(trees: Vec<DecisionTree>, n_features: usize) -> Result<Self> {
        if trees.is_empty() {
            return Err(AnalysisError::Training("forest has no trees".to_string()));
        }
        Ok(Self {
            trees,
            n_features,
            feature_importances: vec![0.0; n_features],
        })
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Normalised mean decrease in impurity per feature
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Mean of the trees' expected values
    pub fn expected_value(&self) -> f64 {
        self.trees.iter().map(|t| t.expected_value()).sum::<f64>() / self.trees.len() as f64
    }
}

impl ProbabilisticClassifier for RandomForest {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn tree_ensemble(&self) -> Option<&RandomForest> {
        Some(self)
    }
}
