// args.rs - Command line arguments definition

use argh::FromArgs;

#[derive(FromArgs)]
/// bacscope - Bacteriocin sequence classification and exploration
pub struct Args {
    /// path to TOML configuration file
    #[argh(option)]
    pub config: Option<String>,

    /// path of the persisted model (default: models/bacteriocin_model.lz4)
    #[argh(option)]
    pub model: Option<String>,

    /// directory holding the training corpora (default: data)
    #[argh(option)]
    pub data_dir: Option<String>,

    /// feature encoder: bacpred, composition (default: bacpred)
    #[argh(option)]
    pub encoder: Option<String>,

    /// number of threads (default: auto-detect)
    #[argh(option)]
    pub threads: Option<usize>,

    /// enable debug logging
    #[argh(switch, short = 'v')]
    pub verbose: bool,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
pub enum Command {
    Train(TrainArgs),
    Predict(PredictArgs),
    Project(ProjectArgs),
    Align(AlignArgs),
    Phylogeny(PhylogenyArgs),
    Motifs(MotifsArgs),
    GenerateConfig(GenerateConfigArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "train")]
/// train a classifier from the positive and negative corpora
pub struct TrainArgs {
    /// number of trees in the forest (default: 100)
    #[argh(option)]
    pub n_trees: Option<usize>,

    /// maximum tree depth (default: unlimited)
    #[argh(option)]
    pub max_depth: Option<usize>,

    /// random seed for bootstrap and feature sampling (default: 42)
    #[argh(option)]
    pub seed: Option<u64>,

    /// hide the training progress bar
    #[argh(switch)]
    pub no_progress: bool,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "predict")]
/// classify candidate sequences
pub struct PredictArgs {
    /// FASTA file of candidate sequences
    #[argh(option)]
    pub candidates: String,

    /// output JSON file (default: stdout)
    #[argh(option)]
    pub output: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "project")]
/// embed references and candidates and explain the model on them
pub struct ProjectArgs {
    /// FASTA file of reference sequences
    #[argh(option)]
    pub references: Option<String>,

    /// FASTA file of candidate sequences
    #[argh(option)]
    pub candidates: Option<String>,

    /// output JSON file (default: stdout)
    #[argh(option)]
    pub output: Option<String>,

    /// shortest sequence kept in the projection (default: 5)
    #[argh(option)]
    pub min_length: Option<usize>,

    /// neighbourhood size of the embedding graph (default: 15)
    #[argh(option)]
    pub n_neighbors: Option<usize>,

    /// minimum distance between embedded points (default: 0.1)
    #[argh(option)]
    pub min_dist: Option<f64>,

    /// optimisation epochs (default: chosen from the population size)
    #[argh(option)]
    pub n_epochs: Option<usize>,

    /// random seed for the embedding (default: 42)
    #[argh(option)]
    pub seed: Option<u64>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "align")]
/// multiple sequence alignment
pub struct AlignArgs {
    /// FASTA file of reference sequences
    #[argh(option)]
    pub references: Option<String>,

    /// FASTA file of candidate sequences
    #[argh(option)]
    pub candidates: Option<String>,

    /// output JSON file (default: stdout)
    #[argh(option)]
    pub output: Option<String>,

    /// also write the gapped rows as FASTA
    #[argh(option)]
    pub fasta: Option<String>,

    /// alignment mode: protein, protein-strict, protein-permissive (default: protein)
    #[argh(option)]
    pub alignment_mode: Option<String>,

    /// custom match score (overrides preset mode)
    #[argh(option)]
    pub match_score: Option<i32>,

    /// custom mismatch penalty (overrides preset mode)
    #[argh(option)]
    pub mismatch_penalty: Option<i32>,

    /// custom gap open penalty (overrides preset mode)
    #[argh(option)]
    pub gap_open: Option<i32>,

    /// custom gap extend penalty (overrides preset mode)
    #[argh(option)]
    pub gap_extend: Option<i32>,

    /// external aligner program (default: clustalo)
    #[argh(option)]
    pub aligner: Option<String>,

    /// external aligner timeout in seconds (default: 120)
    #[argh(option)]
    pub aligner_timeout: Option<u64>,

    /// always use the built-in star alignment
    #[argh(switch)]
    pub no_external: bool,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "phylogeny")]
/// UPGMA tree from a multiple sequence alignment
pub struct PhylogenyArgs {
    /// FASTA file of reference sequences
    #[argh(option)]
    pub references: Option<String>,

    /// FASTA file of candidate sequences
    #[argh(option)]
    pub candidates: Option<String>,

    /// output JSON file (default: stdout)
    #[argh(option)]
    pub output: Option<String>,

    /// distance matrix output file
    #[argh(option)]
    pub matrix: Option<String>,

    /// distance matrix format: tsv, csv, phylip, nexus (default: tsv)
    #[argh(option)]
    pub format: Option<String>,

    /// newick tree output file
    #[argh(option)]
    pub newick: Option<String>,

    /// alignment mode: protein, protein-strict, protein-permissive (default: protein)
    #[argh(option)]
    pub alignment_mode: Option<String>,

    /// custom match score (overrides preset mode)
    #[argh(option)]
    pub match_score: Option<i32>,

    /// custom mismatch penalty (overrides preset mode)
    #[argh(option)]
    pub mismatch_penalty: Option<i32>,

    /// custom gap open penalty (overrides preset mode)
    #[argh(option)]
    pub gap_open: Option<i32>,

    /// custom gap extend penalty (overrides preset mode)
    #[argh(option)]
    pub gap_extend: Option<i32>,

    /// external aligner program (default: clustalo)
    #[argh(option)]
    pub aligner: Option<String>,

    /// external aligner timeout in seconds (default: 120)
    #[argh(option)]
    pub aligner_timeout: Option<u64>,

    /// always use the built-in star alignment
    #[argh(switch)]
    pub no_external: bool,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "motifs")]
/// scan sequences for known bacteriocin motifs
pub struct MotifsArgs {
    /// FASTA file of reference sequences
    #[argh(option)]
    pub references: Option<String>,

    /// FASTA file of candidate sequences
    #[argh(option)]
    pub candidates: Option<String>,

    /// output JSON file (default: stdout)
    #[argh(option)]
    pub output: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "generate-config")]
/// print a sample configuration file
pub struct GenerateConfigArgs {}

/// Alignment flags shared by `align` and `phylogeny`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentFlags {
    pub alignment_mode: Option<String>,
    pub match_score: Option<i32>,
    pub mismatch_penalty: Option<i32>,
    pub gap_open: Option<i32>,
    pub gap_extend: Option<i32>,
    pub aligner: Option<String>,
    pub aligner_timeout: Option<u64>,
    pub no_external: bool,
}

impl AlignArgs {
    pub fn alignment_flags(&self) -> AlignmentFlags {
        AlignmentFlags {
            alignment_mode: self.alignment_mode.clone(),
            match_score: self.match_score,
            mismatch_penalty: self.mismatch_penalty,
            gap_open: self.gap_open,
            gap_extend: self.gap_extend,
            aligner: self.aligner.clone(),
            aligner_timeout: self.aligner_timeout,
            no_external: self.no_external,
        }
    }
}

impl PhylogenyArgs {
    pub fn alignment_flags(&self) -> AlignmentFlags {
        AlignmentFlags {
            alignment_mode: self.alignment_mode.clone(),
            match_score: self.match_score,
            mismatch_penalty: self.mismatch_penalty,
            gap_open: self.gap_open,
            gap_extend: self.gap_extend,
            aligner: self.aligner.clone(),
            aligner_timeout: self.aligner_timeout,
            no_external: self.no_external,
        }
    }
}
