use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use heart_snr::{load_stage_tables, run_comparison, StudyConfig};

#[derive(Parser)]
#[command(name = "snr_stats", about = "Pairwise permutation tests between denoising stages")]
struct Args {
    /// Study configuration (JSON); study defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Random sign flips per test (overrides the configuration)
    #[arg(long)]
    n_permutations: Option<usize>,

    /// Seed of the sign-flip streams (overrides the configuration)
    #[arg(long)]
    seed: Option<u64>,

    /// Report directory (default: <root>/<stats_output>)
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => StudyConfig::load(path)?,
        None => StudyConfig::default(),
    };
    if let Some(n) = args.n_permutations {
        cfg.permutation.n_permutations = n;
    }
    if let Some(seed) = args.seed {
        cfg.permutation.seed = seed;
    }
    cfg.validate()?;
    let output = args
        .output
        .unwrap_or_else(|| cfg.paths.resolve(&cfg.paths.stats_output));

    for table in load_stage_tables(&cfg)? {
        println!("── {} ──", table.condition);
        println!("{}", table.describe());
        for anchor in &cfg.compare.anchors {
            let diffs = table.differences(anchor)?;
            println!("{}", diffs.describe());
            let report = run_comparison(&table, anchor, &cfg.permutation)?;
            println!("{report}");
            let path = report.write(&output)?;
            println!("Written → {}", path.display());
        }
    }
    Ok(())
}
