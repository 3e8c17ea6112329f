// chart.rs - Renderer-agnostic chart descriptions

use serde::{Deserialize, Serialize};
use crate::core::alignment::Alignment;
use crate::core::explain::{ExampleExplanation, GlobalExplanation};
use crate::core::phylogeny::{NodeKind, PhylogeneticTree, TreeLayout};
use crate::core::projection::Embedding;
use crate::data::Origin;

/// Bars in the global importance chart
pub const TOP_GLOBAL_FEATURES: usize = 20;
/// Steps in the single-example waterfall chart
pub const TOP_EXAMPLE_FEATURES: usize = 15;

/// Map NaN and infinities to zero before serialization
#[inline]
pub fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub sequence_id: String,
    pub coords: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterSeries {
    pub name: String,
    pub points: Vec<ScatterPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallStep {
    pub label: String,
    pub value: f64,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafMark {
    pub label: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartSpec {
    Scatter {
        title: String,
        dimensions: usize,
        series: Vec<ScatterSeries>,
    },
    Bar {
        title: String,
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Waterfall {
        title: String,
        base_value: f64,
        steps: Vec<WaterfallStep>,
        final_value: f64,
    },
    Dendrogram {
        title: String,
        segments: Vec<Segment>,
        leaves: Vec<LeafMark>,
    },
    AlignmentGrid {
        title: String,
        row_labels: Vec<String>,
        rows: Vec<String>,
        conservation: Vec<f64>,
    },
}

/// 2D or 3D scatter with one series per origin
pub fn scatter_chart(embeddings: &[Embedding], origins: &[Origin], dimensions: usize) -> ChartSpec {
    let series = [Origin::Reference, Origin::Candidate]
        .into_iter()
        .map(|origin| ScatterSeries {
            name: origin.as_str().to_string(),
            points: embeddings
                .iter()
                .zip(origins)
                .filter(|&(_, &o)| o == origin)
                .map(|(e, _)| ScatterPoint {
                    sequence_id: e.sequence_id.clone(),
                    coords: if dimensions == 3 {
                        e.coords_3d.iter().map(|&v| finite_or_zero(v)).collect()
                    } else {
                        e.coords_2d.iter().map(|&v| finite_or_zero(v)).collect()
                    },
                })
                .collect(),
        })
        .filter(|s| !s.points.is_empty())
        .collect();

    ChartSpec::Scatter {
        title: format!("Sequence space ({}D)", dimensions),
        dimensions,
        series,
    }
}

pub fn importance_chart(global: &GlobalExplanation) -> ChartSpec {
    let top = global.attributions.iter().take(TOP_GLOBAL_FEATURES);
    ChartSpec::Bar {
        title: format!("Top {} features by mean |contribution|", TOP_GLOBAL_FEATURES),
        labels: top.clone().map(|a| a.feature_name.clone()).collect(),
        values: top.map(|a| finite_or_zero(a.mean_abs_contribution)).collect(),
    }
}

/// Waterfall from the base value to the example's prediction
///
/// Features beyond the top ones are folded into a single trailing step so
/// the chart still ends at the prediction.
pub fn waterfall_chart(example: &ExampleExplanation) -> ChartSpec {
    let base = finite_or_zero(example.base_value);
    let mut running = base;
    let mut steps = Vec::new();

    for attr in example.attributions.iter().take(TOP_EXAMPLE_FEATURES) {
        let value = finite_or_zero(attr.signed_contribution);
        steps.push(WaterfallStep {
            label: attr.feature_name.clone(),
            value,
            start: running,
            end: running + value,
        });
        running += value;
    }

    let rest = example.attributions.len().saturating_sub(TOP_EXAMPLE_FEATURES);
    if rest > 0 {
        let value: f64 = example
            .attributions
            .iter()
            .skip(TOP_EXAMPLE_FEATURES)
            .map(|a| finite_or_zero(a.signed_contribution))
            .sum();
        steps.push(WaterfallStep {
            label: format!("{} other features", rest),
            value,
            start: running,
            end: running + value,
        });
        running += value;
    }

    ChartSpec::Waterfall {
        title: format!("Feature contributions for {}", example.sequence_id),
        base_value: base,
        steps,
        final_value: running,
    }
}

/// Rectangular dendrogram: a horizontal segment per edge, a vertical one per internal node
pub fn dendrogram_chart(tree: &PhylogeneticTree, layout: &TreeLayout) -> ChartSpec {
    let mut segments = Vec::new();
    for (i, node) in tree.nodes().iter().enumerate() {
        if let NodeKind::Internal { children } = &node.kind {
            let px = layout.points[i].x;
            let ys: Vec<f64> = children.iter().map(|&c| layout.points[c].y).collect();
            let (lo, hi) = ys
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &y| (lo.min(y), hi.max(y)));
            segments.push(Segment { x0: px, y0: finite_or_zero(lo), x1: px, y1: finite_or_zero(hi) });
        }
    }
    for edge in &layout.edges {
        let parent = &layout.points[edge.parent];
        let child = &layout.points[edge.child];
        segments.push(Segment { x0: parent.x, y0: child.y, x1: child.x, y1: child.y });
    }

    let leaves = layout
        .points
        .iter()
        .filter_map(|p| {
            p.label.as_ref().map(|label| LeafMark {
                label: label.clone(),
                x: finite_or_zero(p.x),
                y: finite_or_zero(p.y),
            })
        })
        .collect();

    ChartSpec::Dendrogram {
        title: "UPGMA tree (identity distance)".to_string(),
        segments,
        leaves,
    }
}

pub fn alignment_chart(alignment: &Alignment) -> ChartSpec {
    let stats = alignment.stats();
    ChartSpec::AlignmentGrid {
        title: format!(
            "Multiple sequence alignment ({} sequences, {:.1}% identical columns)",
            stats.n_rows,
            finite_or_zero(stats.percent_identity)
        ),
        row_labels: alignment.rows().iter().map(|r| r.label()).collect(),
        rows: alignment.rows().iter().map(|r| r.gapped.clone()).collect(),
        conservation: stats.conservation.into_iter().map(finite_or_zero).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::explain::{AttributionMethod, ExampleAttribution};

    #[test]
    fn test_finite_or_zero() {
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(f64::INFINITY), 0.0);
        assert_eq!(finite_or_zero(-2.5), -2.5);
    }

    #[test]
    fn test_scatter_split_by_origin() {
        let e = |id: &str| Embedding {
            sequence_id: id.to_string(),
            coords_2d: [1.0, f64::NAN],
            coords_3d: [1.0, 2.0, 3.0],
        };
        let chart = scatter_chart(
            &[e("r1"), e("c1"), e("c2")],
            &[Origin::Reference, Origin::Candidate, Origin::Candidate],
            2,
        );
        let ChartSpec::Scatter { series, .. } = chart else { panic!("not a scatter") };
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].name, "reference");
        assert_eq!(series[1].points.len(), 2);
        assert_eq!(series[0].points[0].coords, vec![1.0, 0.0]);
    }

    #[test]
    fn test_waterfall_ends_at_prediction() {
        let attributions: Vec<ExampleAttribution> = (0..20)
            .map(|i| ExampleAttribution {
                sequence_id: "x".into(),
                feature_name: format!("f{}", i),
                feature_index: i,
                signed_contribution: 0.01,
            })
            .collect();
        let example = ExampleExplanation {
            sequence_id: "x".into(),
            probability: 0.7,
            base_value: 0.5,
            attributions,
            method: AttributionMethod::TreeExact,
        };
        let ChartSpec::Waterfall { steps, final_value, .. } = waterfall_chart(&example) else {
            panic!("not a waterfall")
        };
        assert_eq!(steps.len(), TOP_EXAMPLE_FEATURES + 1);
        assert_eq!(steps.last().unwrap().label, "5 other features");
        assert!((final_value - 0.7).abs() < 1e-9);
    }
}
