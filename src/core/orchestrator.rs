// orchestrator.rs - Request-level composition of the analysis engines

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use crate::core::alignment::{AlignmentEngine, AlignmentMethod, AlignmentOutcome, AlignmentStats};
use crate::core::classifier::{
    encode_batch, prepare_matrix, reconcile_width, ClassifierService, PredictionResult,
};
use crate::core::explain::{
    model_feature_importance, select_representative, summarize_example, summarize_global,
    AttributionMethod, ExampleExplanation, ExplainConfig, ExplainabilityEngine, FeatureImportance,
    GlobalExplanation, ShapValues,
};
use crate::core::forest::ProbabilisticClassifier;
use crate::core::model::ModelStore;
use crate::core::motifs::{MotifScan, MotifScanner};
use crate::core::phylogeny::{PhylogenyEngine, PhylogenyResult};
use crate::core::projection::{Embedding, ProjectionConfig, ProjectionEngine};
use crate::data::{Origin, Sequence};
use crate::encoders::SequenceEncoder;
use crate::error::{AnalysisError, Result};
use crate::output::chart::{
    alignment_chart, dendrogram_chart, importance_chart, scatter_chart, waterfall_chart,
    TOP_GLOBAL_FEATURES,
};
use crate::output::ChartSpec;

/// Uniform result envelope returned to the outer layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisResponse<T> {
    Success { payload: T, notes: Vec<String> },
    Failure { kind: String, message: String },
}

impl<T> AnalysisResponse<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisResponse::Success { .. })
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            AnalysisResponse::Success { payload, .. } => Some(payload),
            AnalysisResponse::Failure { .. } => None,
        }
    }

    pub fn notes(&self) -> &[String] {
        match self {
            AnalysisResponse::Success { notes, .. } => notes,
            AnalysisResponse::Failure { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Sequences shorter than this are left out of projections
    pub min_projection_length: usize,
    pub projection: ProjectionConfig,
    pub explain: ExplainConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_projection_length: 5,
            projection: ProjectionConfig::default(),
            explain: ExplainConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSummary {
    pub total_points: usize,
    pub reference_count: usize,
    pub candidate_count: usize,
    pub generated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionReport {
    pub summary: PopulationSummary,
    pub embeddings: Vec<Embedding>,
    /// Present when a model was available
    pub probabilities: Option<Vec<f64>>,
    pub global_importance: Option<GlobalExplanation>,
    pub representative: Option<ExampleExplanation>,
    pub model_importance: Vec<FeatureImportance>,
    pub charts: Vec<ChartSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    pub outcome: AlignmentOutcome,
    pub stats: AlignmentStats,
    pub chart: ChartSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhylogenyReport {
    pub result: PhylogenyResult,
    pub chart: ChartSpec,
}

/// Entry point for every analysis request
///
/// Engines are built once from injected dependencies; the orchestrator
/// itself holds no request state and can be shared across threads.
#[derive(Debug)]
pub struct AnalysisOrchestrator {
    encoder: Arc<dyn SequenceEncoder>,
    store: Arc<ModelStore>,
    classifier: ClassifierService,
    projection: ProjectionEngine,
    explainer: ExplainabilityEngine,
    aligner: AlignmentEngine,
    phylogeny: PhylogenyEngine,
    motifs: MotifScanner,
    config: OrchestratorConfig,
}

impl AnalysisOrchestrator {
    pub fn new(
        encoder: Arc<dyn SequenceEncoder>,
        store: Arc<ModelStore>,
        aligner: AlignmentEngine,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        Ok(Self {
            classifier: ClassifierService::new(Arc::clone(&encoder), Arc::clone(&store)),
            projection: ProjectionEngine::new(config.projection.clone()),
            explainer: ExplainabilityEngine::new(config.explain.clone()),
            phylogeny: PhylogenyEngine::new(aligner.clone()),
            aligner,
            motifs: MotifScanner::new()?,
            encoder,
            store,
            config,
        })
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    /// Run one operation, turning errors and panics into `Failure`
    fn run<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut Vec<String>) -> Result<T>,
    ) -> AnalysisResponse<T> {
        let start = Instant::now();
        let mut notes = Vec::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&mut notes)));

        match outcome {
            Ok(Ok(payload)) => {
                info!("{} completed in {:.2}s", operation, start.elapsed().as_secs_f64());
                AnalysisResponse::Success { payload, notes }
            }
            Ok(Err(e)) => {
                error!("{} failed: {}", operation, e);
                AnalysisResponse::Failure {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown cause".to_string());
                error!("{} panicked: {}", operation, detail);
                AnalysisResponse::Failure {
                    kind: "internal".to_string(),
                    message: format!("{} failed unexpectedly", operation),
                }
            }
        }
    }

    pub fn classify(&self, sequences: &[Sequence]) -> AnalysisResponse<Vec<PredictionResult>> {
        self.run("Classification", |notes| {
            let results = self.classifier.predict(sequences)?;
            if results.len() < sequences.len() {
                notes.push(format!(
                    "{} sequences could not be encoded and were skipped",
                    sequences.len() - results.len()
                ));
            }
            Ok(results)
        })
    }

    /// Embed references and candidates together and explain the model on them
    ///
    /// Explanations are best effort: without a model, or when attribution
    /// fails, the embedding is still returned with a note.
    pub fn project(
        &self,
        references: &[Sequence],
        candidates: &[Sequence],
    ) -> AnalysisResponse<ProjectionReport> {
        self.run("Projection", |notes| {
            let min_len = self.config.min_projection_length;
            let population: Vec<Sequence> = references
                .iter()
                .chain(candidates)
                .filter(|s| s.len() >= min_len)
                .cloned()
                .collect();
            let dropped = references.len() + candidates.len() - population.len();
            if dropped > 0 {
                notes.push(format!(
                    "{} sequences shorter than {} residues were left out",
                    dropped, min_len
                ));
            }

            let (kept, raw) = encode_batch(self.encoder.as_ref(), &population);
            if kept.len() < population.len() {
                notes.push(format!(
                    "{} sequences could not be encoded and were skipped",
                    population.len() - kept.len()
                ));
            }
            if kept.len() < 2 {
                return Err(AnalysisError::InsufficientData {
                    required: 2,
                    actual: kept.len(),
                });
            }
            let kept: Vec<&Sequence> = kept.iter().map(|&i| &population[i]).collect();
            let ids: Vec<String> = kept.iter().map(|s| s.id().to_string()).collect();
            let origins: Vec<Origin> = kept.iter().map(|s| s.origin()).collect();

            // The embedding only needs encoder output; the model adds scaling and explanations
            let model = match self.store.ensure_ready() {
                Ok(model) => Some(model),
                Err(e) => {
                    warn!("Projecting unscaled features: {}", e);
                    notes.push(format!("No model available, explanations omitted: {}", e));
                    None
                }
            };
            let matrix = match &model {
                Some(model) => prepare_matrix(model, raw),
                None => {
                    let mut raw = raw;
                    reconcile_width(&mut raw, self.encoder.width());
                    raw
                }
            };

            let embeddings = self.projection.project(&ids, &matrix)?;
            let mut charts = vec![
                scatter_chart(&embeddings, &origins, 2),
                scatter_chart(&embeddings, &origins, 3),
            ];

            let mut probabilities = None;
            let mut global_importance = None;
            let mut representative = None;
            let mut model_importance = Vec::new();

            if let Some(model) = &model {
                let forest = model.classifier();
                let names = model.feature_names();
                let probs: Vec<f64> = matrix.iter().map(|row| forest.predict_proba(row)).collect();
                model_importance = model_feature_importance(forest, names);
                model_importance.truncate(TOP_GLOBAL_FEATURES);

                let rows: Vec<usize> = (0..matrix.len()).collect();
                let shap = self.explainer.shap_values(&matrix, &rows, forest);
                let explained = explain_population(shap, names, &ids, &probs, notes);
                charts.extend(explained.charts);
                global_importance = explained.global;
                representative = explained.representative;
                probabilities = Some(probs);
            }

            let reference_count = origins.iter().filter(|&&o| o == Origin::Reference).count();
            let summary = PopulationSummary {
                total_points: embeddings.len(),
                reference_count,
                candidate_count: embeddings.len() - reference_count,
                generated_at: chrono::Utc::now().to_rfc3339(),
            };

            Ok(ProjectionReport {
                summary,
                embeddings,
                probabilities,
                global_importance,
                representative,
                model_importance,
                charts,
            })
        })
    }

    pub fn align(&self, sequences: &[Sequence]) -> AnalysisResponse<AlignmentReport> {
        self.run("Alignment", |notes| {
            let outcome = self.aligner.align(sequences)?;
            if let AlignmentMethod::Fallback { reason } = &outcome.method {
                notes.push(format!("Star alignment used: {}", reason));
            }
            let stats = outcome.alignment.stats();
            let chart = alignment_chart(&outcome.alignment);
            Ok(AlignmentReport { outcome, stats, chart })
        })
    }

    pub fn phylogeny(&self, sequences: &[Sequence]) -> AnalysisResponse<PhylogenyReport> {
        self.run("Phylogeny", |notes| {
            let result = self.phylogeny.build_tree(sequences)?;
            if let AlignmentMethod::Fallback { reason } = &result.alignment.method {
                notes.push(format!("Star alignment used: {}", reason));
            }
            let chart = dendrogram_chart(&result.tree, &result.layout);
            Ok(PhylogenyReport { result, chart })
        })
    }

    pub fn motifs(&self, sequences: &[Sequence]) -> AnalysisResponse<Vec<MotifScan>> {
        self.run("Motif scan", |_| Ok(self.motifs.scan_sequences(sequences)))
    }
}

/// Explanation artefacts attached to a projection
#[derive(Debug, Default)]
struct PopulationExplanation {
    global: Option<GlobalExplanation>,
    representative: Option<ExampleExplanation>,
    charts: Vec<ChartSpec>,
}

/// Summarize attributions; a failed attribution leaves only a note
fn explain_population(
    shap: Result<ShapValues>,
    names: &[String],
    ids: &[String],
    probabilities: &[f64],
    notes: &mut Vec<String>,
) -> PopulationExplanation {
    let shap = match shap {
        Ok(shap) => shap,
        Err(e) => {
            warn!("Attribution failed, projection kept: {}", e);
            notes.push(format!("Explanations omitted: {}", e));
            return PopulationExplanation::default();
        }
    };
    if let AttributionMethod::Sampled { reason } = &shap.method {
        notes.push(format!("Attributions are sampled estimates: {}", reason));
    }

    let global = summarize_global(&shap, names);
    let mut charts = vec![importance_chart(&global)];
    let representative = select_representative(probabilities)
        .map(|i| summarize_example(&shap, i, names, &ids[i], probabilities[i]));
    if let Some(example) = &representative {
        charts.push(waterfall_chart(example));
    }
    PopulationExplanation {
        global: Some(global),
        representative,
        charts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoders::BacteriocinEncoder;

    fn orchestrator_without_model() -> AnalysisOrchestrator {
        let encoder: Arc<dyn SequenceEncoder> = Arc::new(BacteriocinEncoder);
        let store = Arc::new(ModelStore::new(Arc::clone(&encoder)));
        AnalysisOrchestrator::new(
            encoder,
            store,
            AlignmentEngine::new(Default::default(), None),
            OrchestratorConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_failure_envelope() {
        let orch = orchestrator_without_model();
        let response = orch.classify(&[Sequence::candidate("a", "MKAIS")]);
        match response {
            AnalysisResponse::Failure { kind, message } => {
                assert_eq!(kind, "model_not_ready");
                assert!(!message.is_empty());
            }
            _ => panic!("expected failure"),
        }

        let response = orch.align(&[Sequence::candidate("a", "MKAIS")]);
        assert!(!response.is_success());
        assert!(response.notes().is_empty());
    }

    #[test]
    fn test_panic_becomes_failure() {
        let orch = orchestrator_without_model();
        let response: AnalysisResponse<()> = orch.run("Exploding", |_| panic!("boom"));
        assert_eq!(
            response,
            AnalysisResponse::Failure {
                kind: "internal".to_string(),
                message: "Exploding failed unexpectedly".to_string()
            }
        );
    }

    #[test]
    fn test_alignment_notes_fallback() {
        let orch = orchestrator_without_model();
        let response = orch.align(&[
            Sequence::candidate("a", "MKAISLL"),
            Sequence::candidate("b", "MKAIS"),
        ]);
        assert!(response.is_success());
        assert!(response.notes()[0].starts_with("Star alignment used"));
    }

    fn population() -> Vec<Sequence> {
        vec![
            Sequence::reference("pedA", "KYYGNGVTCGKHSCSVDWGKATTCIINNGAMAWATGGHQGNHKC"),
            Sequence::reference("nisA", "ITSISLCTPGCKTGALMGCNMKTATCHCSIHVSK"),
            Sequence::candidate("c1", "MSDEEKLLEQAEELLKRAEELLKEAEKRGD"),
        ]
    }

    #[test]
    fn test_projection_without_model() {
        let orch = orchestrator_without_model();
        let population = population();
        let response = orch.project(&population[..2], &population[2..]);
        let report = response.payload().expect("projection needs no model");

        assert_eq!(report.embeddings.len(), 3);
        assert_eq!(report.embeddings[2].sequence_id, "c1");
        assert_eq!(report.summary.reference_count, 2);
        assert_eq!(report.summary.candidate_count, 1);
        assert!(report.probabilities.is_none());
        assert!(report.global_importance.is_none());
        assert!(report.representative.is_none());
        assert!(report.model_importance.is_empty());
        assert_eq!(report.charts.len(), 2);
        assert!(response.notes().iter().any(|n| n.contains("No model available")));
    }

    #[test]
    fn test_single_sequence_projection_is_insufficient() {
        let orch = orchestrator_without_model();
        let response = orch.project(&[], &population()[2..]);
        match response {
            AnalysisResponse::Failure { kind, .. } => assert_eq!(kind, "insufficient_data"),
            _ => panic!("one sequence cannot be projected"),
        }
    }

    #[derive(Debug)]
    struct Undefined;

    impl ProbabilisticClassifier for Undefined {
        fn predict_proba(&self, _row: &[f64]) -> f64 {
            f64::NAN
        }

        fn n_features(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_attribution_failure_leaves_a_note() {
        let matrix = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let shap = ExplainabilityEngine::default().shap_values(&matrix, &[0, 1], &Undefined);
        assert!(shap.is_err());

        let names = vec!["f0".to_string(), "f1".to_string()];
        let ids = vec!["a".to_string(), "b".to_string()];
        let mut notes = Vec::new();
        let explained = explain_population(shap, &names, &ids, &[0.2, 0.9], &mut notes);
        assert!(explained.global.is_none());
        assert!(explained.representative.is_none());
        assert!(explained.charts.is_empty());
        assert!(notes[0].starts_with("Explanations omitted"));
    }

    #[test]
    fn test_motifs_never_need_a_model() {
        let orch = orchestrator_without_model();
        let response = orch.motifs(&[Sequence::candidate("a", "KYYGNGV")]);
        assert_eq!(response.payload().unwrap()[0].hits.len(), 1);
    }
}
