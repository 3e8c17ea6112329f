// model.rs - Trained model bundle and its persistent store

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use crate::core::forest::{ForestConfig, RandomForest};
use crate::core::scaler::StandardScaler;
use crate::data::{load_fasta, Origin, Sequence};
use crate::encoders::SequenceEncoder;
use crate::error::{AnalysisError, Result};

/// On-disk layout version of a persisted model
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Default training corpus file names inside the data directory
pub const POSITIVE_CORPUS: &str = "positive_datasets.fasta";
pub const NEGATIVE_CORPUS: &str = "negative_datasets.fasta";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub version: String,
    pub created: String,
    pub encoder: String,
    pub expected_width: usize,
    pub positive_count: usize,
    pub negative_count: usize,
    pub skipped_count: usize,
    pub n_trees: usize,
    pub seed: u64,
    /// CRC32 over both training corpora
    pub corpus_fingerprint: u32,
    pub format_version: u32,
}

/// Scaler, forest and the feature layout they were fitted on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    scaler: StandardScaler,
    classifier: RandomForest,
    expected_width: usize,
    feature_names: Vec<String>,
    metadata: ModelMetadata,
}

impl TrainedModel {
    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn classifier(&self) -> &RandomForest {
        &self.classifier
    }

    /// Width of the feature vectors the model was trained on
    pub fn expected_width(&self) -> usize {
        self.expected_width
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Encode, scale and fit a forest on labelled corpora
    pub fn fit(
        encoder: &dyn SequenceEncoder,
        positives: &[Sequence],
        negatives: &[Sequence],
        config: &ForestConfig,
        show_progress: bool,
    ) -> Result<Self> {
        if positives.is_empty() || negatives.is_empty() {
            return Err(AnalysisError::Training(format!(
                "both corpora must be non-empty ({} positive, {} negative)",
                positives.len(),
                negatives.len()
            )));
        }

        let mut matrix = Vec::with_capacity(positives.len() + negatives.len());
        let mut labels = Vec::with_capacity(positives.len() + negatives.len());
        let mut skipped = 0;
        let mut counts = [0usize; 2];

        for (corpus, label) in [(positives, 1u8), (negatives, 0u8)] {
            for seq in corpus {
                match encoder.try_encode(seq) {
                    Ok(v) => {
                        matrix.push(v.into_inner());
                        labels.push(label);
                        counts[label as usize] += 1;
                    }
                    Err(e) => {
                        warn!("Skipping training sequence: {}", e);
                        skipped += 1;
                    }
                }
            }
        }
        if counts[0] == 0 || counts[1] == 0 {
            return Err(AnalysisError::Training(format!(
                "no encodable sequences left ({} positive, {} negative)",
                counts[1], counts[0]
            )));
        }

        let scaler = StandardScaler::fit(&matrix)?;
        let scaled = scaler.transform(&matrix);

        let pb = if show_progress {
            let pb = ProgressBar::new(config.n_estimators as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} trees ({percent}%) ETA: {eta}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            Some(pb)
        } else {
            None
        };
        let classifier = RandomForest::fit(&scaled, &labels, config, pb.as_ref())?;
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        let metadata = ModelMetadata {
            version: crate::VERSION.to_string(),
            created: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            encoder: encoder.name().to_string(),
            expected_width: encoder.width(),
            positive_count: counts[1],
            negative_count: counts[0],
            skipped_count: skipped,
            n_trees: config.n_estimators,
            seed: config.seed,
            corpus_fingerprint: corpus_fingerprint(positives, negatives),
            format_version: MODEL_FORMAT_VERSION,
        };

        Ok(Self {
            scaler,
            classifier,
            expected_width: encoder.width(),
            feature_names: encoder.feature_names(),
            metadata,
        })
    }

    /// Write as LZ4-compressed JSON; the file is replaced atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec(self)
            .map_err(|e| AnalysisError::Persistence(format!("failed to serialize model: {}", e)))?;
        let compressed = lz4_flex::compress_prepend_size(&data);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AnalysisError::Persistence(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, &compressed)
            .and_then(|_| fs::rename(&tmp, path))
            .map_err(|e| {
                let _ = fs::remove_file(&tmp);
                AnalysisError::Persistence(format!("failed to write {}: {}", path.display(), e))
            })?;

        info!("Model saved to {} ({} KB)", path.display(), compressed.len() / 1024);
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let compressed = fs::read(path)?;
        let data = lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| AnalysisError::Persistence(format!("failed to decompress model: {}", e)))?;
        let model: TrainedModel = serde_json::from_slice(&data)?;

        if model.metadata.format_version != MODEL_FORMAT_VERSION {
            return Err(AnalysisError::Persistence(format!(
                "unsupported model format version {} (expected {})",
                model.metadata.format_version, MODEL_FORMAT_VERSION
            )));
        }
        if model.scaler.width() != model.expected_width
            || model.feature_names.len() != model.expected_width
        {
            return Err(AnalysisError::Persistence(
                "model feature layout is inconsistent".to_string(),
            ));
        }
        Ok(model)
    }
}

/// CRC32 fingerprint of the corpora, order- and label-sensitive
pub fn corpus_fingerprint(positives: &[Sequence], negatives: &[Sequence]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for (tag, corpus) in [(b'+', positives), (b'-', negatives)] {
        for seq in corpus {
            hasher.update(&[tag]);
            hasher.update(seq.residues().as_bytes());
            hasher.update(b"\n");
        }
    }
    hasher.finalize()
}

/// Positive and negative corpora from a training data directory
pub fn load_training_corpora(dir: &Path) -> Result<(Vec<Sequence>, Vec<Sequence>)> {
    let (pos_path, neg_path) = (dir.join(POSITIVE_CORPUS), dir.join(NEGATIVE_CORPUS));
    if !pos_path.is_file() || !neg_path.is_file() {
        return Err(AnalysisError::ModelNotReady(format!(
            "no training corpus in {}",
            dir.display()
        )));
    }
    let positives = load_fasta(&pos_path, Origin::Reference)?;
    let negatives = load_fasta(&neg_path, Origin::Reference)?;
    Ok((positives, negatives))
}

/// Holds the current model and swaps it atomically on (re)training
///
/// Readers get an `Arc` snapshot; a retrain never disturbs a prediction in
/// flight.
#[derive(Debug)]
pub struct ModelStore {
    encoder: Arc<dyn SequenceEncoder>,
    model_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    forest_config: ForestConfig,
    show_progress: bool,
    current: RwLock<Option<Arc<TrainedModel>>>,
    training: Mutex<()>,
}

impl ModelStore {
    pub fn new(encoder: Arc<dyn SequenceEncoder>) -> Self {
        Self {
            encoder,
            model_path: None,
            data_dir: None,
            forest_config: ForestConfig::default(),
            show_progress: false,
            current: RwLock::new(None),
            training: Mutex::new(()),
        }
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Directory holding the default training corpora
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_forest_config(mut self, config: ForestConfig) -> Self {
        self.forest_config = config;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn encoder(&self) -> &Arc<dyn SequenceEncoder> {
        &self.encoder
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    /// Snapshot of the installed model, if any
    pub fn current(&self) -> Option<Arc<TrainedModel>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Make `model` the current one
    pub fn install(&self, model: Arc<TrainedModel>) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(model);
    }

    /// Train, persist when a model path is configured, then install
    pub fn train(&self, positives: &[Sequence], negatives: &[Sequence]) -> Result<Arc<TrainedModel>> {
        let start = Instant::now();
        let model = TrainedModel::fit(
            self.encoder.as_ref(),
            positives,
            negatives,
            &self.forest_config,
            self.show_progress,
        )?;
        info!(
            "Model trained in {:.2}s ({} positive, {} negative, width {})",
            start.elapsed().as_secs_f64(),
            model.metadata.positive_count,
            model.metadata.negative_count,
            model.expected_width
        );

        if let Some(path) = &self.model_path {
            model.save(path)?;
        }
        let model = Arc::new(model);
        self.install(Arc::clone(&model));
        Ok(model)
    }

    /// Load the persisted model; a missing file is not an error
    pub fn load(&self) -> Result<Option<Arc<TrainedModel>>> {
        let Some(path) = &self.model_path else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let model = TrainedModel::read(path)?;
        if model.metadata.encoder != self.encoder.name() {
            warn!(
                "Model at {} was trained with encoder '{}', current encoder is '{}'",
                path.display(),
                model.metadata.encoder,
                self.encoder.name()
            );
        }
        info!(
            "Loaded model from {} (created {}, {} trees, width {})",
            path.display(),
            model.metadata.created,
            model.metadata.n_trees,
            model.expected_width
        );
        let model = Arc::new(model);
        self.install(Arc::clone(&model));
        Ok(Some(model))
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Current model, else the persisted one, else one trained from the data directory
    pub fn ensure_ready(&self) -> Result<Arc<TrainedModel>> {
        if let Some(model) = self.current() {
            return Ok(model);
        }
        let _guard = self
            .training
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(model) = self.current() {
            return Ok(model);
        }
        if let Some(model) = self.load()? {
            return Ok(model);
        }

        let Some(dir) = &self.data_dir else {
            return Err(AnalysisError::ModelNotReady(
                "no trained model and no training data directory configured".to_string(),
            ));
        };
        let (positives, negatives) = load_training_corpora(dir)?;
        info!("No model available, training from {}", dir.display());
        self.train(&positives, &negatives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoders::{BacteriocinEncoder, CompositionEncoder};
    use std::io::Write;
    use tempfile::TempDir;

    fn corpora() -> (Vec<Sequence>, Vec<Sequence>) {
        let positives = [
            "KYYGNGVTCGKHSCSVDWGKATTCIINNGAMAWATGGHQGNHKC",
            "ITSISLCTPGCKTGALMGCNMKTATCHCSIHVSK",
            "KYYGNGLSCSKKGCTVNWGQAFSCGVNRVATAGHGK",
            "GSSGSCGSCGSCCGSCG",
        ];
        let negatives = [
            "MSDEEKLLEQAEELLKRAEELLKEAEKRGD",
            "MTEYKLVVVGAGGVGKSALTIQLIQNHFVDEYDPT",
            "MDPNLEEAWKKAHEELLKDPELAEEIAR",
            "MAEEEQKRLEELLRKAQE",
        ];
        (
            positives.iter().enumerate().map(|(i, s)| Sequence::reference(&format!("pos{}", i), s)).collect(),
            negatives.iter().enumerate().map(|(i, s)| Sequence::reference(&format!("neg{}", i), s)).collect(),
        )
    }

    fn small_config() -> ForestConfig {
        ForestConfig {
            n_estimators: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_train_requires_both_corpora() {
        let store = ModelStore::new(Arc::new(BacteriocinEncoder));
        let (pos, _) = corpora();
        let err = store.train(&pos, &[]).unwrap_err();
        assert_eq!(err.kind(), "training");
        assert!(store.current().is_none());
    }

    #[test]
    fn test_train_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models").join("model.lz4");
        let store = ModelStore::new(Arc::new(BacteriocinEncoder))
            .with_model_path(&path)
            .with_forest_config(small_config());
        let (pos, neg) = corpora();
        let trained = store.train(&pos, &neg).unwrap();
        assert_eq!(trained.expected_width(), 433);
        assert_eq!(trained.metadata().n_trees, 10);
        assert_eq!(trained.metadata().positive_count, 4);
        assert!(path.exists());

        let fresh = ModelStore::new(Arc::new(BacteriocinEncoder)).with_model_path(&path);
        let loaded = fresh.load().unwrap().unwrap();
        assert_eq!(*loaded, *trained);
        assert!(fresh.current().is_some());
    }

    #[test]
    fn test_load_absent_and_corrupted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.lz4");
        let store = ModelStore::new(Arc::new(BacteriocinEncoder)).with_model_path(&path);
        assert!(store.load().unwrap().is_none());

        std::fs::write(&path, b"xy").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn test_ensure_ready_without_sources() {
        let store = ModelStore::new(Arc::new(BacteriocinEncoder));
        assert_eq!(store.ensure_ready().unwrap_err().kind(), "model_not_ready");

        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(Arc::new(BacteriocinEncoder)).with_data_dir(dir.path());
        assert_eq!(store.ensure_ready().unwrap_err().kind(), "model_not_ready");
    }

    #[test]
    fn test_ensure_ready_trains_from_data_dir() {
        let dir = TempDir::new().unwrap();
        let (pos, neg) = corpora();
        for (name, corpus) in [(POSITIVE_CORPUS, &pos), (NEGATIVE_CORPUS, &neg)] {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            for s in corpus.iter() {
                writeln!(f, ">{}\n{}", s.id(), s.residues()).unwrap();
            }
        }
        let store = ModelStore::new(Arc::new(CompositionEncoder))
            .with_data_dir(dir.path())
            .with_forest_config(small_config());
        let model = store.ensure_ready().unwrap();
        assert_eq!(model.expected_width(), 420);
        assert_eq!(model.metadata().encoder, "composition");
        // second call reuses the installed model
        assert!(Arc::ptr_eq(&model, &store.ensure_ready().unwrap()));
    }

    #[test]
    fn test_fingerprint_is_label_sensitive() {
        let (pos, neg) = corpora();
        assert_eq!(corpus_fingerprint(&pos, &neg), corpus_fingerprint(&pos, &neg));
        assert_ne!(corpus_fingerprint(&pos, &neg), corpus_fingerprint(&neg, &pos));
    }
}
