use alphamat::{CriticMode, Experiment, ExperimentConfig};
use alphamat_core::record::{AggregateRecorder, BufferedRecorder};
use alphamat_tensorboard::TensorboardRecorder;
use anyhow::Result;
use clap::Parser;
use log::error;
use std::process::ExitCode;

const N_EPISODES: usize = 500;

/// Train an actor-critic agent discovering matrix multiplication algorithms
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Critic implementation, classical or quantum
    #[arg(short, long, default_value = "classical")]
    mode: CriticMode,

    /// Environment id, matmul-<n>x<n> optionally followed by -outer, -scalar or -strassen
    #[arg(long, default_value = "matmul-2x2-strassen")]
    env_id: String,

    /// Number of training episodes [default: 500, or the value of --config]
    #[arg(short = 'n', long)]
    episodes: Option<usize>,

    /// YAML file of an experiment configuration, overriding mode and env id
    #[arg(short, long)]
    config: Option<String>,

    /// Directory of checkpoints, the best model and TensorBoard logs
    #[arg(long)]
    model_dir: Option<String>,

    /// Checkpoint directory to resume from
    #[arg(long)]
    resume: Option<String>,

    /// Random seed [default: 42, or the value of --config]
    #[arg(short, long)]
    seed: Option<u64>,
}

fn experiment_config(args: &Args) -> Result<ExperimentConfig> {
    let mut config = match &args.config {
        Some(path) => ExperimentConfig::load(path)?,
        None => ExperimentConfig::new(args.mode, &args.env_id)?.n_episodes(N_EPISODES),
    };
    if let Some(n) = args.episodes {
        config = config.n_episodes(n);
    }
    if let Some(seed) = args.seed {
        config = config.seed(seed);
    }
    Ok(match &args.model_dir {
        Some(dir) => config.model_dir(dir.as_str()),
        None => config,
    })
}

fn create_recorder(model_dir: Option<&str>) -> Box<dyn AggregateRecorder> {
    match model_dir {
        Some(dir) => Box::new(TensorboardRecorder::new(dir)),
        None => Box::new(BufferedRecorder::new()),
    }
}

fn train(args: &Args) -> Result<()> {
    let config = experiment_config(args)?;
    if let Some(dir) = &args.model_dir {
        std::fs::create_dir_all(dir)?;
        config.save(format!("{}/experiment.yaml", dir))?;
    }
    let mut recorder = create_recorder(args.model_dir.as_deref());
    let mut experiment = Experiment::build(config)?;
    let summary = match &args.resume {
        Some(checkpoint) => experiment.resume(&mut *recorder, checkpoint)?,
        None => experiment.train(&mut *recorder)?,
    };
    print!("{}", serde_yaml::to_string(&summary)?);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match train(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:?}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_config_file_keeps_its_values() -> Result<()> {
        let tmp = TempDir::new("alphamat_cli")?;
        let path = tmp.path().join("experiment.yaml");
        ExperimentConfig::new(CriticMode::Quantum, "matmul-2x2")?
            .n_episodes(7)
            .seed(3)
            .save(&path)?;
        let path = path.to_string_lossy().to_string();

        let args = Args::try_parse_from(["alphamat", "--config", path.as_str()])?;
        let config = experiment_config(&args)?;
        assert_eq!(config.trainer_config.max_episodes, 7);
        assert_eq!(config.seed, 3);
        assert_eq!(config.critic_mode, CriticMode::Quantum);

        let args = Args::try_parse_from(["alphamat", "--config", path.as_str(), "-n", "9", "-s", "5"])?;
        let config = experiment_config(&args)?;
        assert_eq!(config.trainer_config.max_episodes, 9);
        assert_eq!(config.seed, 5);
        Ok(())
    }

    #[test]
    fn test_defaults_without_config_file() -> Result<()> {
        let args = Args::try_parse_from(["alphamat", "--mode", "quantum"])?;
        let config = experiment_config(&args)?;
        assert_eq!(config.trainer_config.max_episodes, N_EPISODES);
        assert_eq!(config.seed, 42);
        assert_eq!(config.critic_mode, CriticMode::Quantum);
        Ok(())
    }
}
