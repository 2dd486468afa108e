use alphamat_candle_agent::{
    mlp::MlpConfig,
    opt::OptimizerConfig,
    quantum::QuantumCriticConfig,
    ActorConfig, ActorCritic, ActorCriticConfig, CriticConfig, EntCoefMode, QNetConfig,
};
use alphamat_core::{
    error::as_alphamat_error,
    replay_buffer::{
        SimpleReplayBuffer, SimpleReplayBufferConfig, SimpleStepProcessor,
        SimpleStepProcessorConfig,
    },
    Agent, Configurable, Env, ExperienceBufferBase, Policy, ReplayBufferBase, StepProcessor,
};
use alphamat_env::{
    DiscoveryEnv, DiscoveryEnvConfig, MatmulAct, MatmulActBatch, MatmulObsBatch,
};
use anyhow::Result;
use tempdir::TempDir;

type Buffer = SimpleReplayBuffer<MatmulObsBatch, MatmulActBatch>;
type StepProc = SimpleStepProcessor<DiscoveryEnv, MatmulObsBatch, MatmulActBatch>;
type Ac = ActorCritic<DiscoveryEnv, Buffer>;

const N: usize = 2;

fn env_config() -> DiscoveryEnvConfig {
    DiscoveryEnvConfig::default().n(N).max_steps(4)
}

fn agent_config(quantum: bool) -> ActorCriticConfig {
    let obs_dim = env_config().obs_dim();
    let n_actions = N;
    let q_config = match quantum {
        false => QNetConfig::Classical(MlpConfig::new(obs_dim + n_actions, vec![16], 1, false)),
        true => QNetConfig::Quantum(QuantumCriticConfig::new(obs_dim + n_actions, 3, 2)),
    };
    ActorCriticConfig::default()
        .actor_config(
            ActorConfig::default()
                .pi_config(MlpConfig::new(obs_dim, vec![16], n_actions, false))
                .opt_config(OptimizerConfig::default().learning_rate(1e-3)),
        )
        .critic_config(
            CriticConfig::default()
                .q_config(q_config)
                .opt_config(OptimizerConfig::default().learning_rate(1e-3)),
        )
        .ent_coef_mode(EntCoefMode::Auto(0.3, 1e-3))
        .batch_size(8)
        .n_updates_per_opt(2)
        .gamma(0.9)
        .tau(0.1)
}

/// Collects `n_episodes` episodes with the agent's policy.
fn collect(agent: &mut Ac, buffer: &mut Buffer, n_episodes: usize) -> Result<()> {
    let mut env = DiscoveryEnv::build(&env_config(), 0)?;
    let mut step_proc = StepProc::build(&SimpleStepProcessorConfig::default());
    for ix in 0..n_episodes {
        let obs = env.reset_with_index(ix)?;
        step_proc.reset(obs.clone());
        let mut obs = obs;
        loop {
            let act = agent.sample(&obs)?;
            let (step, _) = env.step(&act)?;
            let done = step.is_done();
            obs = step.obs.clone();
            buffer.push(step_proc.process(step)?)?;
            if done {
                break;
            }
        }
    }
    Ok(())
}

fn buffer() -> Result<Buffer> {
    Buffer::build(&SimpleReplayBufferConfig::default().capacity(100).seed(3))
}

fn optimizes(quantum: bool) -> Result<()> {
    let mut agent = Ac::build(agent_config(quantum))?;
    agent.train();
    let mut buffer = buffer()?;
    collect(&mut agent, &mut buffer, 6)?;
    assert!(buffer.len() >= 8);

    for _ in 0..3 {
        let record = agent.opt_with_record(&mut buffer)?;
        for key in ["loss_critic", "loss_actor", "ent_coef"] {
            assert!(record.get_scalar(key)?.is_finite());
        }
    }
    assert_eq!(agent.n_opts(), 6);
    Ok(())
}

#[test_log::test]
fn test_classical_agent_optimizes() -> Result<()> {
    optimizes(false)
}

#[test_log::test]
fn test_quantum_agent_optimizes() -> Result<()> {
    optimizes(true)
}

#[test]
fn test_insufficient_data() -> Result<()> {
    let mut agent = Ac::build(agent_config(false))?;
    let mut buffer = buffer()?;
    collect(&mut agent, &mut buffer, 1)?;
    assert!(buffer.len() < 8);

    let err = agent.opt_with_record(&mut buffer).unwrap_err();
    assert_eq!(
        as_alphamat_error(&err).map(|e| e.kind()),
        Some("insufficient_data")
    );
    assert_eq!(agent.n_opts(), 0);
    Ok(())
}

#[test]
fn test_masked_actions_are_avoided() -> Result<()> {
    let config = env_config().max_action_uses(Some(1));
    let mut env = DiscoveryEnv::build(&config, 0)?;
    for train in [true, false] {
        let mut agent = Ac::build(agent_config(false))?;
        if train {
            agent.train();
        }
        for ix in 0..5 {
            let obs = env.reset_with_index(ix)?;
            let MatmulAct(first) = agent.sample(&obs)?;
            let (step, _) = env.step(&MatmulAct(first))?;
            let MatmulAct(second) = agent.sample(&step.obs)?;
            assert_ne!(first, second);
            env.step(&MatmulAct(second))?;
        }
    }
    Ok(())
}

#[test]
fn test_save_and_load() -> Result<()> {
    let tmp = TempDir::new("agent")?;
    let mut agent = Ac::build(agent_config(true))?;
    agent.train();
    let mut buffer = buffer()?;
    collect(&mut agent, &mut buffer, 6)?;
    agent.opt(&mut buffer)?;
    agent.save_params(tmp.path())?;

    let mut restored = Ac::build(agent_config(true))?;
    restored.load_params(tmp.path())?;
    assert_eq!(restored.n_opts(), agent.n_opts());

    let batch = buffer.batch(8)?;
    let (obs, _) = alphamat_candle_agent::util::masked_features(&batch.obs, &candle_core::Device::Cpu)?;
    let q1 = agent.critic().q_values_all(&obs)?.to_vec2::<f32>()?;
    let q2 = restored.critic().q_values_all(&obs)?.to_vec2::<f32>()?;
    assert_eq!(q1, q2);

    // the sampling sequence continues where it stopped
    restored.train();
    let mut env = DiscoveryEnv::build(&env_config(), 5)?;
    let obs = env.reset_with_index(0)?;
    for _ in 0..10 {
        assert_eq!(agent.sample(&obs)?, restored.sample(&obs)?);
    }
    Ok(())
}

fn var_values(varmap: &candle_nn::VarMap) -> Result<Vec<Vec<f32>>> {
    let mut values = vec![];
    for var in varmap.all_vars() {
        values.push(var.flatten_all()?.to_vec1::<f32>()?);
    }
    Ok(values)
}

#[test]
fn test_circuit_failure_leaves_agent_unchanged() -> Result<()> {
    let obs_dim = env_config().obs_dim();
    let mut config = agent_config(true);
    config.critic_config = config.critic_config.q_config(QNetConfig::Quantum(
        QuantumCriticConfig::new(obs_dim + N, 3, 2).max_angle(1e-6),
    ));
    let mut agent = Ac::build(config)?;
    agent.train();
    let mut buffer = buffer()?;
    collect(&mut agent, &mut buffer, 6)?;

    let actor = var_values(agent.actor().get_varmap())?;
    let critic = var_values(agent.critic().get_varmap())?;
    let err = agent.opt_with_record(&mut buffer).err().unwrap();
    assert_eq!(
        as_alphamat_error(&err).map(|e| e.kind()),
        Some("circuit_evaluation")
    );
    assert_eq!(agent.n_opts(), 0);
    assert_eq!(var_values(agent.actor().get_varmap())?, actor);
    assert_eq!(var_values(agent.critic().get_varmap())?, critic);
    Ok(())
}
