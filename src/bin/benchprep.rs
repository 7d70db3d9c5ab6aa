//! Prepares a database for a benchmark run.
//!
//! Usage:
//!   benchprep --benchmark-dir benchmarks/htap --dsn postgres://localhost/htap \
//!             --schema postgres_native --scale-factor 10 --max-jobs 8

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use benchprep::{
    application::{Dsn, Pipeline, RunConfig},
    extras::manifest::ManifestBenchmark,
};
use clap::Parser;
use env_logger::Env;

#[derive(Parser, Debug)]
#[command(
    name = "benchprep",
    version = env!("CARGO_PKG_VERSION"),
    about = "(Re)creates a benchmark database, loads it in parallel, and finalizes statistics"
)]
struct Args {
    /// Directory holding `benchmark.json` and the `schemas/` tree
    #[arg(long, value_name = "DIR", default_value = ".")]
    benchmark_dir: PathBuf,

    /// Target database, as scheme://host[:port]/dbname
    #[arg(long, env = "DATABASE_CONN_STRING")]
    dsn: String,

    /// Schema variant, a directory under `schemas/`
    #[arg(long)]
    schema: String,

    #[arg(long, default_value_t = 1)]
    scale_factor: u32,

    /// Maximum number of tasks running at once
    #[arg(long, default_value_t = 1)]
    max_jobs: usize,

    /// Fail early if this directory lacks room for the dataset
    #[arg(long, value_name = "DIR")]
    check_diskspace_of_directory: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load in the current `.env` file, if it exists. If it fails, the rest of the ENV should be set.
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let benchmark = ManifestBenchmark::load(&args.benchmark_dir)
        .with_context(|| format!("Loading benchmark from {}", args.benchmark_dir.display()))?;
    let aliases = benchmark.kind_aliases();

    let mut config = RunConfig::new(args.scale_factor, Dsn::parse(&args.dsn)?, args.max_jobs)?;
    if let Some(dir) = args.check_diskspace_of_directory {
        config = config.with_diskspace_check(dir);
    }

    let mut pipeline = Pipeline::builder(Arc::new(benchmark), config, &args.schema)
        .with_kind_aliases(aliases)
        .build()?;

    let result = pipeline.run().await?;
    log::info!(
        "Benchmark {} prepared in {:.2?} ({:?})",
        pipeline.descriptor().name,
        result.total_elapsed(),
        result.final_state
    );
    Ok(())
}
