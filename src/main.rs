// main.rs - CLI entry point

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use bacscope::cli::args::{AlignArgs, PhylogenyArgs};
use bacscope::cli::{validate_settings, Args, Command, Config};
use bacscope::core::model::load_training_corpora;
use bacscope::output::{write_json, write_matrix, write_newick};
use bacscope::prelude::*;

fn main() {
    let args: Args = argh::from_env();
    init_logging(args.verbose);

    match run_main(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr so JSON on stdout stays clean; `RUST_LOG` wins when set
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("bacscope=debug,info")
        } else {
            EnvFilter::new("bacscope=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns whether the requested analysis succeeded
fn run_main(args: Args) -> Result<bool> {
    let command_line = std::env::args().collect::<Vec<String>>().join(" ");

    // Handle generate config first
    if let Command::GenerateConfig(_) = args.command {
        println!("{}", Config::generate_sample());
        return Ok(true);
    }

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let settings = args.merge_with_config(config);
    let validated = validate_settings(&settings)?;

    info!("{}", bacscope::get_info());

    // Configure thread pool
    if let Some(n) = settings.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .map_err(|e| AnalysisError::Config(format!("Failed to configure thread pool: {}", e)))?;
        info!("Threads: {}", n);
    } else {
        info!("Threads: {} (auto-detected)", rayon::current_num_threads());
    }

    let store = Arc::new(
        ModelStore::new(Arc::clone(&validated.encoder))
            .with_model_path(&validated.model_path)
            .with_data_dir(&validated.data_dir)
            .with_forest_config(validated.forest.clone())
            .with_progress(settings.show_progress),
    );
    let orchestrator = AnalysisOrchestrator::new(
        Arc::clone(&validated.encoder),
        Arc::clone(&store),
        validated.aligner.clone(),
        validated.orchestrator.clone(),
    )?;

    let start = Instant::now();
    let succeeded = match &args.command {
        Command::Train(_) => {
            let (positives, negatives) = load_training_corpora(&validated.data_dir)?;
            let model = store.train(&positives, &negatives)?;
            write_json(None, model.metadata())?;
            true
        }
        Command::Predict(predict) => {
            let candidates = load_fasta(Path::new(&predict.candidates), Origin::Candidate)?;
            respond(orchestrator.classify(&candidates), predict.output.as_deref())?
        }
        Command::Project(project) => {
            let references = load_optional(project.references.as_deref(), Origin::Reference)?;
            let candidates = load_optional(project.candidates.as_deref(), Origin::Candidate)?;
            respond(
                orchestrator.project(&references, &candidates),
                project.output.as_deref(),
            )?
        }
        Command::Align(align) => run_align(&orchestrator, align)?,
        Command::Phylogeny(phylogeny) => {
            run_phylogeny(&orchestrator, phylogeny, &settings.format, &command_line)?
        }
        Command::Motifs(motifs) => {
            let sequences = load_inputs(motifs.references.as_deref(), motifs.candidates.as_deref())?;
            respond(orchestrator.motifs(&sequences), motifs.output.as_deref())?
        }
        Command::GenerateConfig(_) => true,
    };

    info!("Total time: {:.2}s", start.elapsed().as_secs_f64());
    Ok(succeeded)
}

fn load_optional(path: Option<&str>, origin: Origin) -> Result<Vec<Sequence>> {
    match path {
        Some(p) => load_fasta(Path::new(p), origin),
        None => Ok(Vec::new()),
    }
}

/// References followed by candidates; at least one file is required
fn load_inputs(references: Option<&str>, candidates: Option<&str>) -> Result<Vec<Sequence>> {
    if references.is_none() && candidates.is_none() {
        return Err(AnalysisError::Config(
            "--references or --candidates is required".to_string(),
        ));
    }
    let mut sequences = load_optional(references, Origin::Reference)?;
    sequences.extend(load_optional(candidates, Origin::Candidate)?);
    Ok(sequences)
}

/// Write the response envelope and report whether it carries a payload
fn respond<T: Serialize>(response: AnalysisResponse<T>, output: Option<&str>) -> Result<bool> {
    write_json(output.map(Path::new), &response)?;
    match &response {
        AnalysisResponse::Success { notes, .. } => {
            for note in notes {
                info!("{}", note);
            }
            Ok(true)
        }
        AnalysisResponse::Failure { kind, message } => {
            error!("{} ({})", message, kind);
            Ok(false)
        }
    }
}

fn run_align(orchestrator: &AnalysisOrchestrator, args: &AlignArgs) -> Result<bool> {
    let sequences = load_inputs(args.references.as_deref(), args.candidates.as_deref())?;
    let response = orchestrator.align(&sequences);

    if let (Some(path), Some(report)) = (&args.fasta, response.payload()) {
        std::fs::write(path, report.outcome.alignment.to_fasta())?;
        info!("Aligned FASTA written to: {}", path);
    }
    respond(response, args.output.as_deref())
}

fn run_phylogeny(
    orchestrator: &AnalysisOrchestrator,
    args: &PhylogenyArgs,
    format: &str,
    command_line: &str,
) -> Result<bool> {
    let sequences = load_inputs(args.references.as_deref(), args.candidates.as_deref())?;
    let response = orchestrator.phylogeny(&sequences);

    if let Some(report) = response.payload() {
        if let Some(path) = &args.matrix {
            write_matrix(Path::new(path), format, &report.result.distances, command_line)?;
        }
        if let Some(path) = &args.newick {
            write_newick(Path::new(path), &report.result.newick)?;
        }
    }
    respond(response, args.output.as_deref())
}
