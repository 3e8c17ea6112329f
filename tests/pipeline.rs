// pipeline.rs - End-to-end runs of the analysis orchestrator

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use bacscope::core::alignment::AlignmentMethod;
use bacscope::core::explain::AttributionMethod;
use bacscope::core::model::{NEGATIVE_CORPUS, POSITIVE_CORPUS};
use bacscope::output::write_matrix;
use bacscope::prelude::*;
use tempfile::TempDir;

const POSITIVES: &[&str] = &[
    "KYYGNGVTCGKHSCSVDWGKATTCIINNGAMAWATGGHQGNHKC",
    "ITSISLCTPGCKTGALMGCNMKTATCHCSIHVSK",
    "KYYGNGLSCSKKGCTVNWGQAFSCGVNRVATAGHGK",
    "GSSGSCGSCGSCCGSCG",
    "KYYGNGVSCNKKGCSVDWGKAIGIIGNNSAANLATGGAAGWKS",
];

const NEGATIVES: &[&str] = &[
    "MSDEEKLLEQAEELLKRAEELLKEAEKRGD",
    "MTEYKLVVVGAGGVGKSALTIQLIQNHFVDEYDPT",
    "MDPNLEEAWKKAHEELLKDPELAEEIAR",
    "MAEEEQKRLEELLRKAQE",
    "MSEEQLKELAEKLLEEAKRLEEEG",
];

fn write_fasta(path: &Path, prefix: &str, residues: &[&str]) {
    let mut f = std::fs::File::create(path).unwrap();
    for (i, s) in residues.iter().enumerate() {
        writeln!(f, ">{}{} {} sequence {}\n{}", prefix, i, prefix, i, s).unwrap();
    }
}

struct Fixture {
    dir: TempDir,
    orchestrator: AnalysisOrchestrator,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        write_fasta(&data.join(POSITIVE_CORPUS), "pos", POSITIVES);
        write_fasta(&data.join(NEGATIVE_CORPUS), "neg", NEGATIVES);

        let encoder: Arc<dyn SequenceEncoder> = Arc::new(BacteriocinEncoder);
        let store = Arc::new(
            ModelStore::new(Arc::clone(&encoder))
                .with_model_path(dir.path().join("models").join("model.lz4"))
                .with_data_dir(&data)
                .with_forest_config(ForestConfig {
                    n_estimators: 15,
                    ..ForestConfig::default()
                }),
        );
        // A program that cannot exist forces the star alignment
        let aligner = AlignmentEngine::new(
            AlignmentConfig::default(),
            Some(ExternalAligner::new(
                dir.path().join("no-such-aligner"),
                Duration::from_secs(5),
            )),
        );
        let orchestrator =
            AnalysisOrchestrator::new(encoder, store, aligner, OrchestratorConfig::default())
                .unwrap();
        Self { dir, orchestrator }
    }

    fn references(&self) -> Vec<Sequence> {
        let data = self.dir.path().join("data");
        let mut refs = load_fasta(&data.join(POSITIVE_CORPUS), Origin::Reference).unwrap();
        refs.extend(load_fasta(&data.join(NEGATIVE_CORPUS), Origin::Reference).unwrap());
        refs
    }
}

#[test]
fn classify_trains_on_demand_and_skips_malformed() {
    let fx = Fixture::new();
    let candidates = vec![
        Sequence::candidate("c1", "KYYGNGVTCGKHSCSVDWGKATTCIINNGAMAWATGGHQGNHKC"),
        Sequence::candidate("c2", "MSDEEKLLEQAEELLKRAEELLKEAEKRGD"),
        Sequence::candidate("bad", "MK12##"),
    ];

    let response = fx.orchestrator.classify(&candidates);
    let predictions = response.payload().expect("classification succeeds");
    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].sequence_id, "c1");
    assert_eq!(predictions[1].sequence_id, "c2");
    for p in predictions {
        assert!((0.0..=1.0).contains(&p.probability));
        assert_eq!(p.label, Label::from_probability(p.probability));
    }
    assert_eq!(response.notes().len(), 1);

    // training persisted the model for the next process
    assert!(fx.dir.path().join("models").join("model.lz4").exists());
}

#[test]
fn projection_reports_population_and_explanations() {
    let fx = Fixture::new();
    let references = fx.references();
    let candidates = vec![
        Sequence::candidate("cand1", "KYYGNGVSCNKKGCSVDWGKAIGIIGNNSAANLATGG"),
        Sequence::candidate("cand2", "MAEEEQKRLEELLRKAQEGK"),
        Sequence::candidate("tiny", "MKA"),
    ];

    let response = fx.orchestrator.project(&references, &candidates);
    let report = response.payload().expect("projection succeeds");

    assert_eq!(report.summary.total_points, 12);
    assert_eq!(report.summary.reference_count, 10);
    assert_eq!(report.summary.candidate_count, 2);
    assert!(response.notes().iter().any(|n| n.contains("shorter than 5")));

    assert_eq!(report.embeddings.len(), 12);
    for e in &report.embeddings {
        assert!(e.coords_2d.iter().chain(e.coords_3d.iter()).all(|v| v.is_finite()));
    }
    assert_eq!(report.probabilities.as_ref().map(Vec::len), Some(12));
    assert!(!report.model_importance.is_empty());

    let global = report.global_importance.as_ref().expect("a trained model explains the population");
    assert_eq!(global.method, AttributionMethod::TreeExact);
    assert_eq!(global.attributions.len(), 433);
    let ranked = &global.attributions;
    assert!(ranked.windows(2).all(|w| w[0].mean_abs_contribution >= w[1].mean_abs_contribution));

    let example = report.representative.as_ref().expect("a representative example");
    let total: f64 = example.attributions.iter().map(|a| a.signed_contribution).sum();
    assert!((example.base_value + total - example.probability).abs() < 1e-6);

    // 2D scatter, 3D scatter, importance bars, waterfall
    assert_eq!(report.charts.len(), 4);
    assert!(matches!(report.charts[1], ChartSpec::Scatter { dimensions: 3, .. }));
    assert!(matches!(report.charts[3], ChartSpec::Waterfall { .. }));

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"status\":\"success\""));
}

#[test]
fn alignment_and_phylogeny_fall_back_to_star_alignment() {
    let fx = Fixture::new();
    let sequences = vec![
        Sequence::candidate("a", "KYYGNGVTCGKHSCSVDWGKA"),
        Sequence::candidate("b", "KYYGNGLSCSKKGCTVNWGQA"),
        Sequence::candidate("c", "MSDEEKLLEQAEELLKRAEEL"),
    ];

    let aligned = fx.orchestrator.align(&sequences);
    let report = aligned.payload().expect("alignment succeeds");
    assert!(matches!(report.outcome.method, AlignmentMethod::Fallback { .. }));
    assert_eq!(report.stats.n_rows, 3);
    let width = report.outcome.alignment.length();
    assert!(report.outcome.alignment.rows().iter().all(|r| r.gapped.len() == width));
    assert!(!aligned.notes().is_empty());

    let tree = fx.orchestrator.phylogeny(&sequences);
    let report = tree.payload().expect("phylogeny succeeds");
    assert!(report.result.newick.ends_with(';'));
    assert_eq!(report.result.tree.leaves().len(), 3);
    assert!(matches!(report.chart, ChartSpec::Dendrogram { .. }));

    // the two pediocin-like sequences are merged first
    let distances = &report.result.distances;
    assert!(distances.get(0, 1) < distances.get(0, 2));

    let out = fx.dir.path().join("out").join("distances.phylip");
    write_matrix(&out, "phylip", distances, "bacscope phylogeny").unwrap();
    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.starts_with("    3\n"));
}

#[test]
fn too_few_sequences_is_a_failure_envelope() {
    let fx = Fixture::new();
    let response = fx.orchestrator.phylogeny(&[
        Sequence::candidate("a", "KYYGNGV"),
        Sequence::candidate("b", "KYYGNGL"),
    ]);
    match response {
        AnalysisResponse::Failure { kind, message } => {
            assert_eq!(kind, "insufficient_input");
            assert!(message.contains("at least 3"));
        }
        AnalysisResponse::Success { .. } => panic!("phylogeny of two sequences must fail"),
    }
}

#[test]
fn motif_scan_reports_positions() {
    let fx = Fixture::new();
    let response = fx.orchestrator.motifs(&[
        Sequence::candidate("pedA", "KYYGNGVTCGKHSC"),
        Sequence::candidate("plain", "AAAA"),
    ]);
    let scans = response.payload().unwrap();
    let hit = scans[0].hits.iter().find(|h| h.matched == "YGNGV").unwrap();
    assert_eq!((hit.start, hit.end), (2, 7));
    assert!(scans[1].hits.is_empty());
}
