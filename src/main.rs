//! Episodic evaluation CLI
//!
//! Samples test episodes, adapts the configured learner on each and prints
//! mean accuracy with 90% and 95% confidence intervals.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use rand_chacha::ChaCha8Rng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use episodic_eval::prelude::*;

#[derive(Parser)]
#[command(name = "episodic-eval")]
#[command(about = "Few-shot episodic evaluation with confidence intervals", long_about = None)]
struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    /// Benchmark name, used for the run name
    #[arg(long)]
    dataset_name: Option<DatasetName>,

    /// CSV file with features and an integer label column
    #[arg(long)]
    data: Option<PathBuf>,

    /// Zero-based column holding the label (defaults to the last column)
    #[arg(long)]
    label_column: Option<usize>,

    /// Skip the first line of the CSV file
    #[arg(long)]
    has_header: bool,

    /// Field delimiter of the CSV file
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Classes in the synthetic dataset used when no --data is given
    #[arg(long, default_value_t = 20)]
    synthetic_classes: usize,

    /// Examples per synthetic class
    #[arg(long, default_value_t = 40)]
    synthetic_per_class: usize,

    /// Feature width of the synthetic dataset
    #[arg(long, default_value_t = 32)]
    synthetic_dim: usize,

    #[arg(long)]
    train_way: Option<usize>,
    #[arg(long)]
    train_shot: Option<usize>,
    #[arg(long)]
    train_query: Option<usize>,

    #[arg(long)]
    test_way: Option<usize>,
    #[arg(long)]
    test_shot: Option<usize>,
    #[arg(long)]
    test_query: Option<usize>,

    #[arg(long)]
    adapt_lr: Option<f64>,
    #[arg(long)]
    train_adapt_steps: Option<usize>,
    #[arg(long)]
    test_adapt_steps: Option<usize>,

    /// Number of test episodes
    #[arg(long)]
    task_batch_size: Option<usize>,

    /// -1 samples fresh tasks forever, N draws from a fixed pool of N tasks
    #[arg(long, allow_hyphen_values = true)]
    num_tasks: Option<i64>,

    /// maml or metasgd
    #[arg(long)]
    meta_wrapping: Option<MetaWrapping>,

    /// Hidden layer widths of the backbone, comma separated
    #[arg(long, value_delimiter = ',')]
    hidden: Option<Vec<usize>>,

    /// Evaluate episodes on all cores
    #[arg(long)]
    parallel: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn apply(&self, mut config: EvaluationConfig) -> EvaluationConfig {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut config.seed, &self.seed);
        set(&mut config.dataset_name, &self.dataset_name);
        set(&mut config.train.way, &self.train_way);
        set(&mut config.train.shot, &self.train_shot);
        set(&mut config.train.query, &self.train_query);
        set(&mut config.test.way, &self.test_way);
        set(&mut config.test.shot, &self.test_shot);
        set(&mut config.test.query, &self.test_query);
        set(&mut config.adapt_lr, &self.adapt_lr);
        set(&mut config.train.adapt_steps, &self.train_adapt_steps);
        set(&mut config.test.adapt_steps, &self.test_adapt_steps);
        set(&mut config.total_episodes, &self.task_batch_size);
        set(&mut config.num_tasks, &self.num_tasks);
        set(&mut config.meta_wrapping, &self.meta_wrapping);
        set(&mut config.hidden_layers, &self.hidden);
        config
    }

    fn load_dataset(&self, rng: &mut ChaCha8Rng) -> Result<LabeledDataset> {
        let Some(path) = &self.data else {
            info!(
                classes = self.synthetic_classes,
                per_class = self.synthetic_per_class,
                dim = self.synthetic_dim,
                "no --data given, using synthetic clusters"
            );
            return Ok(LabeledDataset::synthetic(
                self.synthetic_classes,
                self.synthetic_per_class,
                self.synthetic_dim,
                0.5,
                rng,
            ));
        };

        let width = count_columns(path, self.delimiter)?;
        let label_column = self.label_column.unwrap_or(width.saturating_sub(1));
        let feature_columns: Vec<usize> = (0..width).filter(|&c| c != label_column).collect();

        let mut dataset =
            LabeledDataset::from_csv(path, self.has_header, &feature_columns, label_column, self.delimiter)
                .with_context(|| format!("loading {}", path.display()))?;
        dataset.normalize_z_score();

        info!(
            rows = dataset.len(),
            classes = dataset.num_classes(),
            features = dataset.feature_dim(),
            "loaded {}",
            path.display()
        );
        Ok(dataset)
    }
}

fn count_columns(path: &Path, delimiter: char) -> Result<usize> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let first = text
        .lines()
        .find(|line| !line.trim().is_empty())
        .with_context(|| format!("{} is empty", path.display()))?;
    Ok(first.split(delimiter).count())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let base_config = match &cli.config {
        Some(path) => EvaluationConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EvaluationConfig::default(),
    };
    let config = cli.apply(base_config).resolve()?;

    info!("Run: {} ({}, seed {})", config.run_name(), config.meta_wrapping, config.seed);

    let mut rng = config.model_rng();
    let dataset = cli.load_dataset(&mut rng)?;

    let shape = config.test.shape()?;
    let feature_dim = dataset.feature_dim();
    info!("Making test tasksets ({})...", shape);
    let sampler = EpisodicSampler::seeded(dataset, shape, config.task_budget()?, config.seed)?;

    let backbone = FeedForwardNN::new(feature_dim, config.hidden_layers.clone(), config.num_classes(), &mut rng);
    info!(
        architecture = %backbone.architecture(),
        parameters = backbone.parameter_count(),
        "backbone ready"
    );
    let learner = config.meta_wrapping.wrap(backbone, config.adapt_lr);
    let criterion = SoftmaxCrossEntropy;

    let mut runner = EpisodeRunner::new(&learner, &criterion, sampler, config.test.adapt_steps)?;
    let outcome = if cli.parallel {
        runner.run_parallel(config.total_episodes, config.seed)?
    } else {
        runner.run(config.total_episodes)?
    };

    let summary = outcome.summary()?;
    info!(
        episodes = summary.episodes,
        accuracy = summary.mean_accuracy,
        loss = summary.mean_loss,
        "evaluation finished"
    );
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", summary);
    }

    Ok(())
}
