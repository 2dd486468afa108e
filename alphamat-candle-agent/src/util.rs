//! Utilities.
use alphamat_core::MaskedFeatures;
use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::VarMap;
use log::trace;
use serde::{Deserialize, Serialize};

/// Shift added to the logits of illegal actions.
pub const MASK_SHIFT: f64 = 1e9;

/// Critic loss type.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy, Default)]
pub enum CriticLoss {
    /// Mean squared error.
    #[default]
    Mse,

    /// Smooth L1 loss.
    SmoothL1,
}

impl CriticLoss {
    /// Computes the loss between predictions and targets.
    pub fn loss(&self, pred: &Tensor, tgt: &Tensor) -> Result<Tensor> {
        match self {
            Self::Mse => Ok(candle_nn::loss::mse(pred, tgt)?),
            Self::SmoothL1 => Ok(smooth_l1_loss(pred, tgt)?),
        }
    }
}

/// Returns the variables of a [`VarMap`] sorted by name.
pub fn named_vars(varmap: &VarMap) -> Result<Vec<(String, Var)>> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("the variables are locked by a panicked thread"))?;
    let mut vars: Vec<_> = data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(vars)
}

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    trace!("track(tau = {})", tau);
    let src = named_vars(src)?;
    let dest = named_vars(dest)?;

    for ((k_dest, v_dest), (k_src, v_src)) in dest.iter().zip(src.iter()) {
        if k_dest != k_src {
            return Err(anyhow!("variable {} has no counterpart {}", k_src, k_dest));
        }
        let t = ((tau * v_src.as_tensor())? + ((1.0 - tau) * v_dest.as_tensor())?)?;
        v_dest.set(&t)?;
    }
    Ok(())
}

/// See <https://pytorch.org/docs/stable/generated/torch.nn.SmoothL1Loss.html>.
pub fn smooth_l1_loss(x: &Tensor, y: &Tensor) -> Result<Tensor, candle_core::Error> {
    let d = (x - y)?.abs()?;
    let m1 = d.lt(1.0)?.to_dtype(DType::F32)?;
    let m2 = (1.0 - &m1)?;
    (((0.5 * m1)? * d.powf(2.0))? + m2 * (d - 0.5))?.mean_all()
}

/// Returns `gamma * (1 - done)`, where `done` is `is_terminated | is_truncated`.
pub fn gamma_not_done(
    gamma: f32,
    is_terminated: &[i8],
    is_truncated: &[i8],
    device: &Device,
) -> Result<Tensor> {
    let batch_size = is_terminated.len();
    let v = is_terminated
        .iter()
        .zip(is_truncated.iter())
        .map(|(e1, e2)| gamma * (1f32 - (*e1 | *e2) as f32))
        .collect::<Vec<_>>();
    Ok(Tensor::from_slice(&v[..], (batch_size,), device)?)
}

/// Converts rewards to a tensor of shape `(batch_size,)`.
pub fn reward(reward: &[f32], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_slice(reward, (reward.len(),), device)?)
}

/// Returns features of shape `(n_rows, dim)` and the action mask of shape
/// `(n_rows, n_actions)`.
pub fn masked_features(x: &impl MaskedFeatures, device: &Device) -> Result<(Tensor, Tensor)> {
    let n_rows = x.n_rows();
    let features = Tensor::from_slice(x.features(), (n_rows, x.dim()), device)
        .context("features do not match their declared width")?;
    let mask = Tensor::from_slice(x.action_mask(), (n_rows, x.n_actions()), device)
        .context("action mask does not match the number of actions")?;
    Ok((features, mask))
}

/// One-hot encoding of action indices, shape `(batch_size, n_actions)`.
pub fn one_hot(ixs: &[u32], n_actions: usize, device: &Device) -> Result<Tensor> {
    let mut v = vec![0f32; ixs.len() * n_actions];
    for (row, &ix) in ixs.iter().enumerate() {
        let ix = ix as usize;
        if ix >= n_actions {
            return Err(anyhow!("action {} out of {} actions", ix, n_actions));
        }
        v[row * n_actions + ix] = 1.0;
    }
    Ok(Tensor::from_vec(v, (ixs.len(), n_actions), device)?)
}

/// Shifts the logits of illegal actions by [`MASK_SHIFT`] downwards.
pub fn mask_logits(logits: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let shift = ((mask * MASK_SHIFT)? - MASK_SHIFT)?;
    Ok((logits + shift)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::Init;

    fn varmap(name: &str, v: &[f32]) -> Result<VarMap> {
        let vm = VarMap::new();
        vm.get((v.len(),), name, Init::Const(0.0), DType::F32, &Device::Cpu)?;
        vm.data()
            .lock()
            .unwrap()
            .get(name)
            .unwrap()
            .set(&Tensor::from_slice(v, (v.len(),), &Device::Cpu)?)?;
        Ok(vm)
    }

    fn values(vm: &VarMap, name: &str) -> Vec<f32> {
        let data = vm.data().lock().unwrap();
        data.get(name).unwrap().as_tensor().to_vec1().unwrap()
    }

    #[test]
    fn test_track() -> Result<()> {
        let src = varmap("var1", &[1.0, 2.0, 3.0])?;
        let dest = varmap("var1", &[4.0, 5.0, 6.0])?;
        track(&dest, &src, 0.5)?;
        assert_eq!(values(&dest, "var1"), vec![2.5, 3.5, 4.5]);
        Ok(())
    }

    #[test]
    fn test_track_converges() -> Result<()> {
        for tau in [0.1, 0.5, 1.0] {
            let src = varmap("w", &[1.0, -2.0])?;
            let dest = varmap("w", &[10.0, 10.0])?;
            for _ in 0..200 {
                track(&dest, &src, tau)?;
            }
            let v = values(&dest, "w");
            assert!((v[0] - 1.0).abs() < 1e-4);
            assert!((v[1] + 2.0).abs() < 1e-4);
        }
        Ok(())
    }

    #[test]
    fn test_track_rejects_other_names() -> Result<()> {
        let src = varmap("a", &[1.0])?;
        let dest = varmap("b", &[1.0])?;
        assert!(track(&dest, &src, 0.5).is_err());
        Ok(())
    }

    #[test]
    fn test_gamma_not_done() -> Result<()> {
        let t = gamma_not_done(0.5, &[0, 1, 0], &[0, 0, 1], &Device::Cpu)?;
        assert_eq!(t.to_vec1::<f32>()?, vec![0.5, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_one_hot_and_mask() -> Result<()> {
        let t = one_hot(&[2, 0], 3, &Device::Cpu)?;
        assert_eq!(
            t.to_vec2::<f32>()?,
            vec![vec![0.0, 0.0, 1.0], vec![1.0, 0.0, 0.0]]
        );
        assert!(one_hot(&[3], 3, &Device::Cpu).is_err());

        let logits = Tensor::new(&[[1.0f32, 2.0, 3.0]], &Device::Cpu)?;
        let mask = Tensor::new(&[[1.0f32, 0.0, 1.0]], &Device::Cpu)?;
        let masked = mask_logits(&logits, &mask)?.to_vec2::<f32>()?;
        assert_eq!(masked[0][0], 1.0);
        assert!(masked[0][1] < -1e8);
        assert_eq!(masked[0][2], 3.0);
        Ok(())
    }

    #[test]
    fn test_smooth_l1_loss() -> Result<()> {
        let x = Tensor::new(&[0.0f32, 0.0], &Device::Cpu)?;
        let y = Tensor::new(&[0.5f32, 3.0], &Device::Cpu)?;
        let loss = smooth_l1_loss(&x, &y)?.to_scalar::<f32>()?;
        // (0.5 * 0.25 + 2.5) / 2
        assert!((loss - 1.3125).abs() < 1e-6);
        Ok(())
    }
}
