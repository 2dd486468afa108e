mod common;
use alphamat_core::{
    error::{as_alphamat_error, AlphamatError},
    record::{BufferedRecorder, NullRecorder, RecordValue},
    replay_buffer::{SimpleReplayBufferConfig, SimpleStepProcessorConfig},
    DefaultEvaluator, ExperienceBufferBase, ReplayBufferBase, Trainer, TrainerConfig,
    TrainerState, REPLAY_BUFFER_FILE,
};
use anyhow::Result;
use common::{Buffer, ScriptedAgent, StepProc, Walk, WalkConfig};
use tempdir::TempDir;

fn env_config() -> WalkConfig {
    WalkConfig {
        target: 3,
        max_steps: 10,
        diverging_episodes: vec![],
    }
}

fn trainer(config: TrainerConfig) -> Result<Trainer<Walk, StepProc, Buffer>> {
    Trainer::build(
        config,
        env_config(),
        SimpleStepProcessorConfig::default(),
        SimpleReplayBufferConfig::default().capacity(1000),
    )
}

fn evaluator() -> Result<DefaultEvaluator<Walk>> {
    DefaultEvaluator::new(&env_config(), 0, 2)
}

#[test_log::test]
fn test_train_episodes() -> Result<()> {
    let mut trainer = trainer(TrainerConfig::default().max_episodes(4).warmup_period(2))?;
    let mut agent = ScriptedAgent::new(vec![0], 2);
    let mut recorder = BufferedRecorder::new();
    let summary = trainer.train(&mut agent, &mut recorder, &mut evaluator()?)?;

    assert_eq!(summary.episodes, 4);
    assert_eq!(summary.env_steps, 12);
    assert_eq!(summary.opt_steps, 11);
    assert_eq!(agent.n_opts, 11);
    assert!(!summary.stopped);
    assert!(summary.recoverable.is_empty());
    assert_eq!(recorder.scalars("episode_return"), vec![-3.0; 4]);
    assert_eq!(recorder.scalars("episode_length"), vec![3.0; 4]);
    assert_eq!(recorder.scalars("episode"), vec![1.0, 2.0, 3.0, 4.0]);
    assert!(recorder
        .iter()
        .all(|r| matches!(r.get("datetime"), Some(RecordValue::DateTime(_)))));
    Ok(())
}

#[test]
fn test_env_step_budget() -> Result<()> {
    let config = TrainerConfig::default()
        .max_episodes(100)
        .max_env_steps(Some(7));
    let mut trainer = trainer(config)?;
    let mut agent = ScriptedAgent::new(vec![0], 1);
    let summary = trainer.train(&mut agent, &mut BufferedRecorder::new(), &mut evaluator()?)?;

    // Checked at episode boundaries, so the third episode completes.
    assert_eq!(summary.episodes, 3);
    assert_eq!(summary.env_steps, 9);
    Ok(())
}

#[test_log::test]
fn test_insufficient_data_is_recovered() -> Result<()> {
    let mut trainer = trainer(TrainerConfig::default().max_episodes(4))?;
    let mut agent = ScriptedAgent::new(vec![0], 4);
    let mut recorder = BufferedRecorder::new();
    let summary = trainer.train(&mut agent, &mut recorder, &mut evaluator()?)?;

    assert_eq!(summary.recoverable.get("insufficient_data"), Some(&3));
    assert_eq!(summary.opt_steps, 9);
    assert_eq!(
        recorder.scalars("recoverable/insufficient_data"),
        vec![1.0, 2.0, 3.0]
    );
    Ok(())
}

#[test_log::test]
fn test_divergence_ends_episode() -> Result<()> {
    let dir = TempDir::new("trainer_divergence")?;
    let config = TrainerConfig::default()
        .max_episodes(3)
        .warmup_period(100)
        .divergence_penalty(-10.0)
        .save_interval(3)
        .model_dir(dir.path().to_string_lossy());
    let mut trainer = trainer(config)?;
    let mut agent = ScriptedAgent::new(vec![0, 2], 1);
    let mut recorder = BufferedRecorder::new();
    let summary = trainer.train(&mut agent, &mut recorder, &mut evaluator()?)?;

    assert_eq!(summary.episodes, 3);
    assert_eq!(summary.env_steps, 6);
    assert_eq!(summary.recoverable.get("numeric_divergence"), Some(&3));
    assert_eq!(recorder.scalars("diverged"), vec![1.0; 3]);
    assert_eq!(recorder.scalars("episode_return"), vec![-12.0; 3]);

    let mut buffer = Buffer::build(&SimpleReplayBufferConfig::default().capacity(1000))?;
    buffer.load(&dir.path().join("3").join(REPLAY_BUFFER_FILE))?;
    assert_eq!(buffer.len(), 6);
    let transitions = buffer.whole_transitions();
    assert_eq!(transitions.reward, vec![-2.0, -10.0, -2.0, -10.0, -2.0, -10.0]);
    assert_eq!(transitions.is_terminated, vec![0, 1, 0, 1, 0, 1]);
    // A diverged transition stays in its last observation.
    assert_eq!(transitions.obs.0[1], transitions.next_obs.0[1]);
    Ok(())
}

#[test]
fn test_invalid_action_is_fatal() -> Result<()> {
    let mut trainer = trainer(TrainerConfig::default().max_episodes(2))?;
    let mut agent = ScriptedAgent::new(vec![7], 1);
    let err = trainer
        .train(&mut agent, &mut BufferedRecorder::new(), &mut evaluator()?)
        .unwrap_err();
    assert_eq!(
        as_alphamat_error(&err).map(AlphamatError::kind),
        Some("invalid_action")
    );
    Ok(())
}

#[test]
fn test_stop_signal() -> Result<()> {
    let mut trainer = trainer(TrainerConfig::default().max_episodes(10))?;
    trainer.stop_signal().stop();
    let mut agent = ScriptedAgent::new(vec![0], 1);
    let summary = trainer.train(&mut agent, &mut NullRecorder::default(), &mut evaluator()?)?;
    assert!(summary.stopped);
    assert_eq!(summary.episodes, 0);
    assert_eq!(summary.env_steps, 0);
    Ok(())
}

#[test]
fn test_invalid_config_is_rejected() {
    let res = trainer(TrainerConfig::default().opt_interval(0));
    assert_eq!(
        res.err()
            .as_ref()
            .and_then(as_alphamat_error)
            .map(AlphamatError::kind),
        Some("config")
    );
}

#[test_log::test]
fn test_evaluation_saves_best_model() -> Result<()> {
    let dir = TempDir::new("trainer_eval")?;
    let config = TrainerConfig::default()
        .max_episodes(4)
        .eval_interval(2)
        .model_dir(dir.path().to_string_lossy());
    let mut trainer = trainer(config)?;
    let mut agent = ScriptedAgent::new(vec![0], 1);
    let mut recorder = BufferedRecorder::new();
    let summary = trainer.train(&mut agent, &mut recorder, &mut evaluator()?)?;

    assert_eq!(summary.best_eval_score, Some(-3.0));
    assert!(dir.path().join("best").join("agent.yaml").exists());
    assert_eq!(recorder.scalars("eval/episode_return"), vec![-3.0, -3.0]);
    Ok(())
}

#[test_log::test]
fn test_resume_from_checkpoint() -> Result<()> {
    let dir = TempDir::new("trainer_resume")?;
    let model_dir = dir.path().to_string_lossy().to_string();
    let config = TrainerConfig::default()
        .max_episodes(4)
        .warmup_period(2)
        .save_interval(2)
        .model_dir(model_dir.clone());
    let mut agent = ScriptedAgent::new(vec![0], 2);
    trainer(config.clone())?.train(&mut agent, &mut BufferedRecorder::new(), &mut evaluator()?)?;
    assert_eq!(agent.n_opts, 11);

    let checkpoint = dir.path().join("4");
    let state = TrainerState::load(&checkpoint)?;
    assert_eq!(state.episodes, 4);
    assert_eq!(state.env_steps, 12);
    assert!(dir.path().join("2").exists());

    let mut agent = ScriptedAgent::new(vec![0], 2);
    let summary = trainer(config.max_episodes(6))?.resume(
        &mut agent,
        &mut BufferedRecorder::new(),
        &mut evaluator()?,
        &checkpoint,
    )?;
    assert_eq!(summary.episodes, 6);
    assert_eq!(summary.env_steps, 18);
    assert_eq!(summary.opt_steps, 17);
    assert_eq!(agent.n_opts, 17);
    Ok(())
}

#[test_log::test]
fn test_divergence_at_reset_ends_episode() -> Result<()> {
    let env_config = WalkConfig {
        diverging_episodes: vec![1, 2],
        ..env_config()
    };
    let mut trainer: Trainer<Walk, StepProc, Buffer> = Trainer::build(
        TrainerConfig::default().max_episodes(4).warmup_period(100),
        env_config,
        SimpleStepProcessorConfig::default(),
        SimpleReplayBufferConfig::default().capacity(1000),
    )?;
    let mut agent = ScriptedAgent::new(vec![0], 1);
    let mut recorder = BufferedRecorder::new();
    let summary = trainer.train(&mut agent, &mut recorder, &mut evaluator()?)?;

    assert_eq!(summary.episodes, 4);
    assert_eq!(summary.env_steps, 6);
    assert_eq!(summary.recoverable.get("numeric_divergence"), Some(&2));
    assert_eq!(recorder.scalars("diverged"), vec![1.0; 2]);
    assert_eq!(recorder.scalars("episode_return"), vec![-3.0, 0.0, 0.0, -3.0]);
    assert_eq!(recorder.scalars("episode_length"), vec![3.0, 0.0, 0.0, 3.0]);
    Ok(())
}

#[test_log::test]
fn test_circuit_evaluation_error_skips_update() -> Result<()> {
    let mut trainer = trainer(TrainerConfig::default().max_episodes(3))?;
    let mut agent = ScriptedAgent::new(vec![0], 1);
    agent.failing_circuit = true;
    let mut recorder = BufferedRecorder::new();
    let summary = trainer.train(&mut agent, &mut recorder, &mut evaluator()?)?;

    assert_eq!(summary.episodes, 3);
    assert_eq!(summary.env_steps, 9);
    assert_eq!(summary.opt_steps, 0);
    assert_eq!(summary.recoverable.get("circuit_evaluation"), Some(&9));
    assert_eq!(
        recorder.scalars("recoverable/circuit_evaluation"),
        (1..=9).map(|n| n as f32).collect::<Vec<_>>()
    );
    Ok(())
}
