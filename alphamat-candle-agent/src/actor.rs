//! Actor of the actor-critic agent.
use crate::{
    mlp::{Mlp, MlpConfig},
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
    util::{mask_logits, named_vars, track},
};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{ops::log_softmax, VarBuilder, VarMap};
use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
/// Configuration of [`Actor`].
pub struct ActorConfig {
    /// Configuration of the network mapping observations to logits.
    pub pi_config: Option<MlpConfig>,

    /// Configuration of the optimizer.
    pub opt_config: OptimizerConfig,
}

impl ActorConfig {
    /// Sets the configuration of the policy network.
    pub fn pi_config(mut self, v: MlpConfig) -> Self {
        self.pi_config = Some(v);
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Constructs [`ActorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ActorConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Categorical policy over a finite action set, with a target network.
///
/// Illegal actions get their logits shifted far below the legal ones, so their
/// probability vanishes.
pub struct Actor {
    n_actions: usize,
    varmap: VarMap,
    varmap_tgt: VarMap,
    pi: Mlp,
    pi_tgt: Mlp,
    opt: Optimizer,
}

impl Actor {
    /// Constructs [`Actor`].
    pub fn build(config: ActorConfig, device: Device) -> Result<Self> {
        let pi_config = config.pi_config.context("pi_config is not set.")?;
        let n_actions = pi_config.out_dim();

        let varmap = VarMap::new();
        let pi = Mlp::build(
            VarBuilder::from_varmap(&varmap, DType::F32, &device),
            pi_config.clone(),
        )?;
        let varmap_tgt = VarMap::new();
        let pi_tgt = Mlp::build(
            VarBuilder::from_varmap(&varmap_tgt, DType::F32, &device),
            pi_config,
        )?;
        track(&varmap_tgt, &varmap, 1.0)?;
        let opt = config.opt_config.build(named_vars(&varmap)?)?;

        Ok(Self {
            n_actions,
            varmap,
            varmap_tgt,
            pi,
            pi_tgt,
            opt,
        })
    }

    /// Returns the number of actions.
    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    /// Returns `log π(a|s)` for every action, shape `(batch_size, n_actions)`.
    pub fn log_probs(&self, obs: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let logits = mask_logits(&self.pi.forward(obs)?, mask)?;
        Ok(log_softmax(&logits, D::Minus1)?)
    }

    /// Returns the greedy actions of the target network, as indices.
    pub fn greedy_tgt(&self, obs: &Tensor, mask: &Tensor) -> Result<Vec<u32>> {
        let logits = mask_logits(&self.pi_tgt.forward(obs)?, mask)?;
        Ok(logits.argmax(D::Minus1)?.to_vec1::<u32>()?)
    }

    /// Selects an action for a single observation.
    ///
    /// With `explore`, samples from the policy, otherwise returns the most
    /// probable legal action.
    pub fn act<R: Rng>(&self, obs: &Tensor, mask: &Tensor, explore: bool, rng: &mut R) -> Result<usize> {
        let probs = self
            .log_probs(obs, mask)?
            .exp()?
            .flatten_all()?
            .to_vec1::<f32>()?;
        let legal = mask.flatten_all()?.to_vec1::<f32>()?;

        if explore {
            let u: f32 = rng.gen();
            let mut acc = 0f32;
            let mut last_legal = 0;
            for (a, (p, m)) in probs.iter().zip(legal.iter()).enumerate() {
                if *m == 0.0 {
                    continue;
                }
                acc += p;
                last_legal = a;
                if u < acc {
                    return Ok(a);
                }
            }
            Ok(last_legal)
        } else {
            let best = probs
                .iter()
                .zip(legal.iter())
                .enumerate()
                .filter(|(_, (_, m))| **m != 0.0)
                .fold(None, |best: Option<(usize, f32)>, (a, (p, _))| match best {
                    Some((_, q)) if q >= *p => best,
                    _ => Some((a, *p)),
                });
            Ok(best.map(|(a, _)| a).unwrap_or(0))
        }
    }

    /// Applies an optimizer step on the given loss.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Moves the target network towards the actor.
    pub fn soft_update(&self, tau: f64) -> Result<()> {
        track(&self.varmap_tgt, &self.varmap, tau)
    }

    /// Returns the variables of the actor.
    pub fn get_varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Saves the parameters, the target parameters and the optimizer state in `dir`.
    pub fn save<T: AsRef<Path>>(&self, dir: T) -> Result<()> {
        let dir = dir.as_ref();
        self.varmap.save(dir.join("actor.safetensors"))?;
        self.varmap_tgt.save(dir.join("actor_tgt.safetensors"))?;
        self.opt.save(dir.join("actor_opt.safetensors"))?;
        info!("Save actor to {:?}", dir);
        Ok(())
    }

    /// Loads what [`Actor::save`] wrote.
    pub fn load<T: AsRef<Path>>(&mut self, dir: T) -> Result<()> {
        let dir = dir.as_ref();
        self.varmap.load(dir.join("actor.safetensors"))?;
        self.varmap_tgt.load(dir.join("actor_tgt.safetensors"))?;
        self.opt.load(dir.join("actor_opt.safetensors"))?;
        info!("Load actor from {:?}", dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn actor() -> Result<Actor> {
        let config = ActorConfig::default().pi_config(MlpConfig::new(2, vec![8], 3, false));
        Actor::build(config, Device::Cpu)
    }

    #[test]
    fn test_masked_actions_are_never_selected() -> Result<()> {
        let actor = actor()?;
        let obs = Tensor::new(&[[0.5f32, -1.0]], &Device::Cpu)?;
        let mask = Tensor::new(&[[0f32, 1.0, 0.0]], &Device::Cpu)?;
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..50 {
            assert_eq!(actor.act(&obs, &mask, true, &mut rng)?, 1);
        }
        assert_eq!(actor.act(&obs, &mask, false, &mut rng)?, 1);

        let p = actor.log_probs(&obs, &mask)?.exp()?.to_vec2::<f32>()?;
        assert!(p[0][0] < 1e-6 && p[0][2] < 1e-6);
        assert!((p[0][1] - 1.0).abs() < 1e-6);
        assert_eq!(actor.greedy_tgt(&obs, &mask)?, vec![1]);
        Ok(())
    }

    #[test]
    fn test_greedy_is_most_probable() -> Result<()> {
        let actor = actor()?;
        let obs = Tensor::new(&[[0.3f32, 0.7]], &Device::Cpu)?;
        let mask = Tensor::new(&[[1f32, 1.0, 1.0]], &Device::Cpu)?;
        let p = actor.log_probs(&obs, &mask)?.to_vec2::<f32>()?;
        let a = actor.act(&obs, &mask, false, &mut StdRng::seed_from_u64(0))?;
        assert!(p[0].iter().all(|v| *v <= p[0][a]));
        Ok(())
    }
}
