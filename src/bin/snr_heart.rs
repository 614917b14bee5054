use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use heart_snr::{run_and_save, Condition, FifSource, RunOptions, StageKind, StageSpec, StudyConfig};

#[derive(Parser)]
#[command(name = "snr_heart", about = "QRS-artefact SNR of one ESG denoising stage")]
struct Args {
    /// Study configuration (JSON); study defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stage to measure: prep, pca, ica, post-ica or ssp
    #[arg(long)]
    stage: StageKind,

    /// Search the peak in the reduced QRS window
    #[arg(long)]
    reduced_window: bool,

    /// Use anteriorly re-referenced recordings
    #[arg(long)]
    anterior_reference: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => StudyConfig::load(path)?,
        None => StudyConfig::default(),
    };
    let options = RunOptions {
        anterior_reference: args.anterior_reference,
        reduced_window: args.reduced_window || cfg.snr.reduced_window,
    };
    let spec = StageSpec::new(args.stage, &cfg, options);
    let source = FifSource::new(&cfg.event_name);

    let (record, path) = run_and_save(&spec, &source, &cfg)?;

    for condition in Condition::ALL {
        let m = record.get(condition);
        let [ok, undefined, failed, missing] = m.status_counts();
        println!(
            "{condition:<7} {ok:>4} ok  {undefined:>3} undefined  {failed:>3} failed  {missing:>3} missing"
        );
    }
    println!("Written → {}", path.display());
    Ok(())
}
