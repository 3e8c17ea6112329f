// merge.rs - Merge configuration file with CLI arguments

use crate::cli::args::{AlignmentFlags, Args, Command};
use crate::cli::Config;

pub const DEFAULT_MODEL_PATH: &str = "models/bacteriocin_model.lz4";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_ENCODER: &str = "bacpred";
pub const DEFAULT_FORMAT: &str = "tsv";

/// Settings after layering CLI arguments over the configuration file
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model: String,
    pub data_dir: String,
    pub encoder: String,
    pub threads: Option<usize>,
    pub verbose: bool,

    pub n_trees: Option<usize>,
    pub max_depth: Option<usize>,
    pub seed: Option<u64>,
    pub show_progress: bool,

    pub min_projection_length: Option<usize>,
    pub n_neighbors: Option<usize>,
    pub min_dist: Option<f64>,
    pub n_epochs: Option<usize>,

    pub alignment: AlignmentFlags,
    pub format: String,
}

impl Args {
    /// Merge with configuration from file
    /// CLI arguments take precedence over config file values
    pub fn merge_with_config(&self, config: Config) -> Settings {
        let mut settings = Settings {
            model: self
                .model
                .clone()
                .or(config.model)
                .unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string()),
            data_dir: self
                .data_dir
                .clone()
                .or(config.data_dir)
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            encoder: self
                .encoder
                .clone()
                .or(config.encoder)
                .unwrap_or_else(|| DEFAULT_ENCODER.to_string()),
            threads: self.threads.or(config.threads),
            verbose: self.verbose,
            n_trees: config.n_trees,
            max_depth: config.max_depth,
            seed: config.seed,
            show_progress: true,
            min_projection_length: config.min_projection_length,
            n_neighbors: config.n_neighbors,
            min_dist: config.min_dist,
            n_epochs: config.n_epochs,
            alignment: AlignmentFlags {
                alignment_mode: config.alignment_mode,
                match_score: config.match_score,
                mismatch_penalty: config.mismatch_penalty,
                gap_open: config.gap_open,
                gap_extend: config.gap_extend,
                aligner: config.aligner,
                aligner_timeout: config.aligner_timeout,
                no_external: config.no_external.unwrap_or(false),
            },
            format: config.format.unwrap_or_else(|| DEFAULT_FORMAT.to_string()),
        };

        match &self.command {
            Command::Train(train) => {
                settings.n_trees = train.n_trees.or(settings.n_trees);
                settings.max_depth = train.max_depth.or(settings.max_depth);
                settings.seed = train.seed.or(settings.seed);
                settings.show_progress = !train.no_progress;
            }
            Command::Project(project) => {
                settings.min_projection_length =
                    project.min_length.or(settings.min_projection_length);
                settings.n_neighbors = project.n_neighbors.or(settings.n_neighbors);
                settings.min_dist = project.min_dist.or(settings.min_dist);
                settings.n_epochs = project.n_epochs.or(settings.n_epochs);
                settings.seed = project.seed.or(settings.seed);
            }
            Command::Align(align) => {
                settings.alignment = layer_alignment(align.alignment_flags(), settings.alignment);
            }
            Command::Phylogeny(phylogeny) => {
                settings.alignment =
                    layer_alignment(phylogeny.alignment_flags(), settings.alignment);
                if let Some(format) = &phylogeny.format {
                    settings.format = format.clone();
                }
            }
            Command::Predict(_) | Command::Motifs(_) | Command::GenerateConfig(_) => {}
        }

        settings
    }
}

fn layer_alignment(cli: AlignmentFlags, file: AlignmentFlags) -> AlignmentFlags {
    AlignmentFlags {
        alignment_mode: cli.alignment_mode.or(file.alignment_mode),
        match_score: cli.match_score.or(file.match_score),
        mismatch_penalty: cli.mismatch_penalty.or(file.mismatch_penalty),
        gap_open: cli.gap_open.or(file.gap_open),
        gap_extend: cli.gap_extend.or(file.gap_extend),
        aligner: cli.aligner.or(file.aligner),
        aligner_timeout: cli.aligner_timeout.or(file.aligner_timeout),
        no_external: cli.no_external || file.no_external,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argh::FromArgs;

    fn parse(args: &[&str]) -> Args {
        Args::from_args(&["bacscope"], args).unwrap()
    }

    #[test]
    fn test_defaults_without_config() {
        let settings = parse(&["motifs"]).merge_with_config(Config::default());
        assert_eq!(settings.model, DEFAULT_MODEL_PATH);
        assert_eq!(settings.data_dir, DEFAULT_DATA_DIR);
        assert_eq!(settings.encoder, DEFAULT_ENCODER);
        assert_eq!(settings.format, DEFAULT_FORMAT);
        assert!(settings.show_progress);
    }

    #[test]
    fn test_cli_overrides_config() {
        let config = Config {
            encoder: Some("composition".to_string()),
            n_trees: Some(10),
            seed: Some(1),
            gap_open: Some(8),
            alignment_mode: Some("protein-strict".to_string()),
            ..Config::default()
        };

        let args = parse(&["--encoder", "bacpred", "train", "--seed", "9", "--no-progress"]);
        let settings = args.merge_with_config(config.clone());
        assert_eq!(settings.encoder, "bacpred");
        assert_eq!(settings.n_trees, Some(10));
        assert_eq!(settings.seed, Some(9));
        assert!(!settings.show_progress);

        let args = parse(&["phylogeny", "--candidates", "c.fa", "--gap-open", "3", "--format", "nexus"]);
        let settings = args.merge_with_config(config);
        assert_eq!(settings.alignment.gap_open, Some(3));
        assert_eq!(settings.alignment.alignment_mode.as_deref(), Some("protein-strict"));
        assert_eq!(settings.format, "nexus");
    }
}
