use std::path::PathBuf;
use std::process::exit;
use std::time;

use clap::Parser;
use log::{error, info};

use mzsubmit::pipeline::{run_batch, BatchConfig, Converter, LocalFileRetriever, ProcessConverter};
use mzsubmit::run::RunContext;

/// Prepare search engine results for submission to a public proteomics repository
#[derive(Parser)]
#[command(name = "mzsubmit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The batch configuration, a JSON file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Write outputs here instead of the configured directory
    #[arg(short, long)]
    output_directory: Option<PathBuf>,

    /// How many failed jobs to tolerate before aborting
    #[arg(short, long)]
    max_failures: Option<usize>,

    /// The manifest's file name within the output directory
    #[arg(long)]
    manifest: Option<String>,
}

fn main() {
    env_logger::init();
    let args = Cli::parse();

    let mut config = match BatchConfig::from_path(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Could not load {}: {e}", args.config.display());
            exit(2)
        }
    };
    if let Some(output_directory) = args.output_directory {
        config.output_directory = output_directory;
    }
    if let Some(max_failures) = args.max_failures {
        config.max_failures = max_failures;
    }
    if let Some(manifest) = args.manifest {
        config.manifest_name = manifest;
    }

    let start = time::Instant::now();
    let mut context = RunContext::new(config.compute_checksums);
    let converter = ProcessConverter;
    let converter = config.converter.as_ref().map(|_| &converter as &dyn Converter);
    match run_batch(&config, &mut context, &LocalFileRetriever, converter) {
        Ok(summary) => {
            let elapsed = time::Instant::now() - start;
            info!(
                "Processed {} jobs in {:0.2} seconds",
                summary.jobs_seen(),
                elapsed.as_secs_f64()
            );
            if let (Some(manifest), Some(status)) = (summary.manifest, summary.status) {
                println!("{status}\t{}", manifest.display());
            }
            if !summary.failures.is_empty() {
                exit(1)
            }
        }
        Err(e) => {
            error!("{e}");
            exit(1)
        }
    }
}
