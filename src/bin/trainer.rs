use anyhow::Result;
use clap::Parser;
use movierec::services::pipeline::{self, IdIndexStage, RecommendationStage};
use movierec::utils::metrics::TracingMetrics;
use movierec::{init_tracing, Config};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Train the movie recommender and pre-compute recommendations", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Overrides `data.dataset_dir`.
    #[arg(short, long)]
    dataset_dir: Option<PathBuf>,

    /// Overrides `training.epochs`.
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Fixes every random draw of the run.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing();

    let mut config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };
    if let Some(dir) = args.dataset_dir {
        config.data.dataset_dir = dir;
    }
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }
    if args.seed.is_some() {
        config.training.seed = args.seed;
    }

    info!("Training configuration: {:?}", config.training);

    let mut metrics = TracingMetrics::new(config.training.experiment_name.clone());
    let report = pipeline::run(&config, &mut metrics)?;

    info!(
        "Trained {} users x {} movies for {} epochs (best loss {:.6})",
        report.num_users, report.num_movies, report.training.epochs_run, report.training.best_loss
    );
    if let IdIndexStage::Failed(reason) = &report.id_index {
        warn!("No id index written, serving will not start: {}", reason);
    }
    match &report.recommendations {
        RecommendationStage::Written { path, users } => {
            info!("Recommendations for {} users at {}", users, path.display())
        }
        RecommendationStage::Failed(reason) => warn!("No recommendations written: {}", reason),
    }
    if !report.artifacts.all_present() {
        warn!("Run finished with missing artifacts");
    }

    Ok(())
}
