// phylogeny.rs - Identity distances, UPGMA trees, Newick and dendrogram layout

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use crate::core::alignment::{Alignment, AlignmentEngine, AlignmentOutcome, GAP};
use crate::data::Sequence;
use crate::error::{AnalysisError, Result};

/// 1 - identical / compared columns; columns gapped in both rows are skipped
pub fn identity_distance(a: &[u8], b: &[u8]) -> f64 {
    let mut compared = 0usize;
    let mut identical = 0usize;
    for (&x, &y) in a.iter().zip(b) {
        if x == GAP && y == GAP {
            continue;
        }
        compared += 1;
        if x == y {
            identical += 1;
        }
    }
    if compared == 0 {
        1.0
    } else {
        1.0 - identical as f64 / compared as f64
    }
}

/// Replace characters that are structural in Newick
pub fn newick_safe(label: &str) -> String {
    label
        .chars()
        .map(|c| match c {
            ' ' | '(' | ')' | ':' | ';' | ',' | '[' | ']' | '\'' => '_',
            c => c,
        })
        .collect()
}

/// Symmetric, zero diagonal, entries in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    labels: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl DistanceMatrix {
    pub fn from_alignment(alignment: &Alignment) -> Self {
        let rows: Vec<&[u8]> = alignment.rows().iter().map(|r| r.gapped.as_bytes()).collect();
        let n = rows.len();

        // upper triangle in parallel, mirrored afterwards
        let upper: Vec<(usize, usize, f64)> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                let rows = &rows;
                ((i + 1)..n).map(move |j| (i, j, identity_distance(rows[i], rows[j])))
            })
            .collect();

        let mut values = vec![vec![0.0; n]; n];
        for (i, j, d) in upper {
            values[i][j] = d;
            values[j][i] = d;
        }
        let labels = alignment
            .rows()
            .iter()
            .map(|r| newick_safe(&r.label()))
            .collect();
        Self { labels, values }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i][j]
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// `row` indexes the alignment row the leaf stands for
    Leaf { row: usize, sequence_id: String, label: String },
    Internal { children: Vec<usize> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhyloNode {
    pub kind: NodeKind,
    pub height: f64,
    /// Length of the edge to the parent; zero at the root
    pub branch_length: f64,
    pub parent: Option<usize>,
}

/// Rooted tree stored as an arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhylogeneticTree {
    nodes: Vec<PhyloNode>,
    root: usize,
}

impl PhylogeneticTree {
    /// Average-linkage clustering weighted by cluster size
    pub fn upgma(matrix: &DistanceMatrix, sequence_ids: &[String]) -> Result<Self> {
        let n = matrix.len();
        if n == 0 {
            return Err(AnalysisError::InsufficientInput {
                operation: "Tree building",
                required: 1,
                actual: 0,
            });
        }

        let mut nodes: Vec<PhyloNode> = (0..n)
            .map(|i| PhyloNode {
                kind: NodeKind::Leaf {
                    row: i,
                    sequence_id: sequence_ids.get(i).cloned().unwrap_or_else(|| matrix.labels[i].clone()),
                    label: matrix.labels[i].clone(),
                },
                height: 0.0,
                branch_length: 0.0,
                parent: None,
            })
            .collect();

        let mut dist = matrix.values.clone();
        // slot -> (node index, cluster size)
        let mut slots: Vec<Option<(usize, usize)>> = (0..n).map(|i| Some((i, 1))).collect();
        let mut active = n;

        while active > 1 {
            let mut best: Option<(usize, usize, f64)> = None;
            for i in 0..n {
                if slots[i].is_none() {
                    continue;
                }
                for j in (i + 1)..n {
                    if slots[j].is_none() {
                        continue;
                    }
                    if best.map_or(true, |(_, _, d)| dist[i][j] < d) {
                        best = Some((i, j, dist[i][j]));
                    }
                }
            }
            let Some((i, j, d)) = best else { break };
            let (Some((node_i, size_i)), Some((node_j, size_j))) = (slots[i], slots[j]) else {
                break;
            };

            let height = d / 2.0;
            let parent = nodes.len();
            for child in [node_i, node_j] {
                nodes[child].branch_length = (height - nodes[child].height).max(0.0);
                nodes[child].parent = Some(parent);
            }
            nodes.push(PhyloNode {
                kind: NodeKind::Internal { children: vec![node_i, node_j] },
                height,
                branch_length: 0.0,
                parent: None,
            });

            for k in 0..n {
                if k == i || k == j || slots[k].is_none() {
                    continue;
                }
                let merged = (size_i as f64 * dist[i][k] + size_j as f64 * dist[j][k])
                    / (size_i + size_j) as f64;
                dist[i][k] = merged;
                dist[k][i] = merged;
            }
            slots[i] = Some((parent, size_i + size_j));
            slots[j] = None;
            active -= 1;
        }

        let root = nodes.len() - 1;
        Ok(Self { nodes, root })
    }

    pub fn nodes(&self) -> &[PhyloNode] {
        &self.nodes
    }

    pub fn root(&self) -> usize {
        self.root
    }

    /// Leaf node indices in depth-first order
    pub fn leaves(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            match &self.nodes[node].kind {
                NodeKind::Leaf { .. } => out.push(node),
                NodeKind::Internal { children } => stack.extend(children.iter().rev()),
            }
        }
        out
    }

    /// Newick string with five-decimal branch lengths
    pub fn to_newick(&self) -> String {
        let mut out = String::new();
        self.write_newick(self.root, &mut out);
        out.push(';');
        out
    }

    fn write_newick(&self, node: usize, out: &mut String) {
        match &self.nodes[node].kind {
            NodeKind::Leaf { label, .. } => out.push_str(label),
            NodeKind::Internal { children } => {
                out.push('(');
                for (k, &child) in children.iter().enumerate() {
                    if k > 0 {
                        out.push(',');
                    }
                    self.write_newick(child, out);
                }
                out.push(')');
            }
        }
        if node != self.root {
            out.push_str(&format!(":{:.5}", self.nodes[node].branch_length));
        }
    }

    /// Dendrogram coordinates: x is distance from the root, leaves take rows 0..n
    pub fn layout(&self) -> TreeLayout {
        let mut x = vec![0.0; self.nodes.len()];
        let mut y = vec![0.0; self.nodes.len()];
        let mut edges = Vec::new();
        let mut next_row = 0usize;
        self.place(self.root, 0.0, &mut x, &mut y, &mut next_row, &mut edges);

        let points = (0..self.nodes.len())
            .map(|i| LayoutPoint {
                node: i,
                x: x[i],
                y: y[i],
                label: match &self.nodes[i].kind {
                    NodeKind::Leaf { label, .. } => Some(label.clone()),
                    NodeKind::Internal { .. } => None,
                },
            })
            .collect();
        TreeLayout { points, edges }
    }

    fn place(
        &self,
        node: usize,
        depth: f64,
        x: &mut [f64],
        y: &mut [f64],
        next_row: &mut usize,
        edges: &mut Vec<LayoutEdge>,
    ) {
        x[node] = depth;
        match &self.nodes[node].kind {
            NodeKind::Leaf { .. } => {
                y[node] = *next_row as f64;
                *next_row += 1;
            }
            NodeKind::Internal { children } => {
                let mut sum = 0.0;
                for &child in children {
                    edges.push(LayoutEdge { parent: node, child });
                    self.place(child, depth + self.nodes[child].branch_length, x, y, next_row, edges);
                    sum += y[child];
                }
                y[node] = sum / children.len().max(1) as f64;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutPoint {
    pub node: usize,
    pub x: f64,
    pub y: f64,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEdge {
    pub parent: usize,
    pub child: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeLayout {
    pub points: Vec<LayoutPoint>,
    pub edges: Vec<LayoutEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhylogenyResult {
    pub alignment: AlignmentOutcome,
    pub distances: DistanceMatrix,
    pub tree: PhylogeneticTree,
    pub newick: String,
    pub layout: TreeLayout,
}

#[derive(Debug, Clone, Default)]
pub struct PhylogenyEngine {
    aligner: AlignmentEngine,
}

impl PhylogenyEngine {
    pub fn new(aligner: AlignmentEngine) -> Self {
        Self { aligner }
    }

    /// Align, compute identity distances, cluster and lay out
    pub fn build_tree(&self, sequences: &[Sequence]) -> Result<PhylogenyResult> {
        if sequences.len() < 3 {
            return Err(AnalysisError::InsufficientInput {
                operation: "Phylogeny",
                required: 3,
                actual: sequences.len(),
            });
        }
        let alignment = self.aligner.align(sequences)?;
        let distances = DistanceMatrix::from_alignment(&alignment.alignment);
        let ids: Vec<String> = alignment
            .alignment
            .rows()
            .iter()
            .map(|r| r.sequence_id.clone())
            .collect();
        let tree = PhylogeneticTree::upgma(&distances, &ids)?;
        let newick = tree.to_newick();
        let layout = tree.layout();

        info!("Built UPGMA tree over {} sequences", sequences.len());
        Ok(PhylogenyResult {
            alignment,
            distances,
            tree,
            newick,
            layout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alignment::{AlignedRow, AlignmentConfig};

    fn alignment(rows: &[(&str, &str)]) -> Alignment {
        Alignment::new(
            rows.iter()
                .map(|(id, g)| AlignedRow {
                    sequence_id: id.to_string(),
                    name: id.to_string(),
                    gapped: g.to_string(),
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_identity_distance() {
        assert_eq!(identity_distance(b"MKAIS", b"MKAIS"), 0.0);
        assert!((identity_distance(b"MKAIS", b"MKAIT") - 0.2).abs() < 1e-12);
        // double gaps skipped, gap vs residue counts
        assert!((identity_distance(b"MK--", b"MK-A") - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(identity_distance(b"---", b"---"), 1.0);
    }

    #[test]
    fn test_distance_matrix_properties() {
        let aln = alignment(&[("a", "MKAIS"), ("b", "MKAIT"), ("c", "WWWWW")]);
        let dm = DistanceMatrix::from_alignment(&aln);
        for i in 0..3 {
            assert_eq!(dm.get(i, i), 0.0);
            for j in 0..3 {
                assert_eq!(dm.get(i, j), dm.get(j, i));
                assert!((0.0..=1.0).contains(&dm.get(i, j)));
            }
        }
        assert_eq!(dm.labels(), &["a", "b", "c"]);
    }

    #[test]
    fn test_upgma_and_newick() {
        let aln = alignment(&[("A", "MKAIS"), ("B", "MKAIT"), ("C", "WWWWW")]);
        let dm = DistanceMatrix::from_alignment(&aln);
        let tree = PhylogeneticTree::upgma(&dm, &[]).unwrap();
        assert_eq!(tree.to_newick(), "((A:0.10000,B:0.10000):0.40000,C:0.50000);");
        assert_eq!(tree.nodes().len(), 5);
        assert_eq!(tree.nodes()[tree.root()].parent, None);
    }

    #[test]
    fn test_upgma_ties_merge_lowest_indices() {
        let aln = alignment(&[("A", "AAAA"), ("B", "AAAA"), ("C", "AAAA")]);
        let dm = DistanceMatrix::from_alignment(&aln);
        let tree = PhylogeneticTree::upgma(&dm, &[]).unwrap();
        assert_eq!(tree.to_newick(), "((A:0.00000,B:0.00000):0.00000,C:0.00000);");
    }

    #[test]
    fn test_layout() {
        let aln = alignment(&[("A", "MKAIS"), ("B", "MKAIT"), ("C", "WWWWW")]);
        let tree = PhylogeneticTree::upgma(&DistanceMatrix::from_alignment(&aln), &[]).unwrap();
        let layout = tree.layout();
        assert_eq!(layout.edges.len(), 4);

        let leaf = |name: &str| {
            layout
                .points
                .iter()
                .find(|p| p.label.as_deref() == Some(name))
                .unwrap()
                .clone()
        };
        assert_eq!(leaf("A").y, 0.0);
        assert_eq!(leaf("B").y, 1.0);
        assert_eq!(leaf("C").y, 2.0);
        assert!((leaf("A").x - 0.5).abs() < 1e-12);
        assert!((leaf("C").x - 0.5).abs() < 1e-12);

        let root = &layout.points[tree.root()];
        assert_eq!(root.x, 0.0);
        // root row is the mean of the (A,B) node at 0.5 and C at 2
        assert!((root.y - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_build_tree_groups_similar_sequences() {
        let engine = PhylogenyEngine::new(AlignmentEngine::new(AlignmentConfig::default(), None));
        let seqs = vec![
            Sequence::candidate("A", "MKAIS"),
            Sequence::candidate("B", "MKAIT"),
            Sequence::candidate("C", "WWWWW"),
        ];
        let result = engine.build_tree(&seqs).unwrap();
        assert!(result.newick.starts_with("((A:"));
        assert!(result.newick.contains(",B:"));
        assert!(result.newick.ends_with(";"));
        assert_eq!(result.tree.leaves().len(), 3);

        let err = engine.build_tree(&seqs[..2]).unwrap_err();
        assert_eq!(err.kind(), "insufficient_input");
    }
}
