//! State-vector simulation of the variational circuit.
//!
//! Amplitudes stay real because the circuit only applies RY rotations and CZ
//! gates to `|0...0>`. Basis states are indexed little-endian, bit `j` of the
//! index is the state of qubit `j`.
use anyhow::Result;
use candle_core::{Device, Tensor};

/// A circuit of `n_layers` layers on `n_qubits` qubits.
///
/// The input angles are encoded as RY rotations. Each layer then applies
/// trainable RY rotations to every qubit followed by a ring of CZ gates. With
/// re-uploading, layers after the first encode the input angles again before
/// their trainable rotations.
pub struct Circuit {
    n_qubits: usize,
    n_layers: usize,
    reupload: bool,
    cz_signs: Tensor,
    z_signs: Tensor,
}

fn bit(index: usize, j: usize) -> bool {
    (index >> j) & 1 == 1
}

impl Circuit {
    /// Builds the circuit.
    pub fn new(n_qubits: usize, n_layers: usize, reupload: bool, device: &Device) -> Result<Self> {
        let dim = 1 << n_qubits;

        let edges: Vec<(usize, usize)> = match n_qubits {
            0 | 1 => vec![],
            2 => vec![(0, 1)],
            _ => (0..n_qubits).map(|j| (j, (j + 1) % n_qubits)).collect(),
        };
        let cz_signs = (0..dim)
            .map(|ix| {
                let n_flips = edges
                    .iter()
                    .filter(|(j, k)| bit(ix, *j) && bit(ix, *k))
                    .count();
                if n_flips % 2 == 0 {
                    1f32
                } else {
                    -1f32
                }
            })
            .collect::<Vec<_>>();
        let cz_signs = Tensor::from_vec(cz_signs, (1, dim), device)?;

        let z_signs = (0..dim)
            .flat_map(|ix| (0..n_qubits).map(move |j| if bit(ix, j) { -1f32 } else { 1f32 }))
            .collect::<Vec<_>>();
        let z_signs = Tensor::from_vec(z_signs, (dim, n_qubits), device)?;

        Ok(Self {
            n_qubits,
            n_layers,
            reupload,
            cz_signs,
            z_signs,
        })
    }

    /// Returns the number of qubits.
    pub fn n_qubits(&self) -> usize {
        self.n_qubits
    }

    fn initial_state(&self, batch_size: usize, device: &Device) -> Result<Tensor> {
        let dim = 1 << self.n_qubits;
        let mut v = vec![0f32; batch_size * dim];
        for b in 0..batch_size {
            v[b * dim] = 1.0;
        }
        Ok(Tensor::from_vec(v, (batch_size, dim), device)?)
    }

    /// Applies RY(theta) to qubit `j`. `theta` broadcasts to `(batch_size, 1, 1, 1)`.
    fn ry(&self, state: &Tensor, j: usize, theta: &Tensor) -> Result<Tensor> {
        let batch_size = state.dims()[0];
        let dim = 1 << self.n_qubits;
        let s = state.reshape((batch_size, dim >> (j + 1), 2, 1 << j))?;
        let a0 = s.narrow(2, 0, 1)?;
        let a1 = s.narrow(2, 1, 1)?;
        let half = (theta * 0.5)?;
        let cos = half.cos()?;
        let sin = half.sin()?;
        let b0 = (a0.broadcast_mul(&cos)? - a1.broadcast_mul(&sin)?)?;
        let b1 = (a0.broadcast_mul(&sin)? + a1.broadcast_mul(&cos)?)?;
        Ok(Tensor::cat(&[b0, b1], 2)?.reshape((batch_size, dim))?)
    }

    fn encode(&self, state: Tensor, angles: &Tensor) -> Result<Tensor> {
        let batch_size = angles.dims()[0];
        let mut state = state;
        for j in 0..self.n_qubits {
            let theta = angles.narrow(1, j, 1)?.reshape((batch_size, 1, 1, 1))?;
            state = self.ry(&state, j, &theta)?;
        }
        Ok(state)
    }

    /// Returns `<Z_j>` for every qubit, shape `(batch_size, n_qubits)`.
    ///
    /// `angles` has shape `(batch_size, n_qubits)` and `weights` has shape
    /// `(n_layers, n_qubits)`. Gradients flow to both.
    pub fn expectations(&self, angles: &Tensor, weights: &Tensor) -> Result<Tensor> {
        let batch_size = angles.dims()[0];
        let state = self.initial_state(batch_size, angles.device())?;
        let mut state = self.encode(state, angles)?;

        for l in 0..self.n_layers {
            if self.reupload && l > 0 {
                state = self.encode(state, angles)?;
            }
            for j in 0..self.n_qubits {
                let theta = weights.narrow(0, l, 1)?.narrow(1, j, 1)?.reshape((1, 1, 1, 1))?;
                state = self.ry(&state, j, &theta)?;
            }
            state = state.broadcast_mul(&self.cz_signs)?;
        }

        Ok(state.sqr()?.matmul(&self.z_signs)?)
    }

    /// Gradient of `mean_b sum_j <Z_j>` with respect to the weights, computed with
    /// the parameter-shift rule.
    ///
    /// Each weight drives a single RY gate, so shifting it by `±π/2` gives the
    /// exact derivative `(f(w + π/2) - f(w - π/2)) / 2`.
    pub fn parameter_shift(&self, angles: &Tensor, weights: &Tensor) -> Result<Tensor> {
        let angles = angles.detach();
        let shape = weights.dims().to_vec();
        let w = weights.detach().flatten_all()?.to_vec1::<f32>()?;
        let shift = std::f32::consts::FRAC_PI_2;

        let objective = |w: &[f32]| -> Result<f32> {
            let w = Tensor::from_slice(w, shape.as_slice(), weights.device())?;
            let e = self.expectations(&angles, &w)?;
            Ok(e.sum(1)?.mean(0)?.to_scalar::<f32>()?)
        };

        let mut grad = Vec::with_capacity(w.len());
        for i in 0..w.len() {
            let mut w_plus = w.clone();
            w_plus[i] += shift;
            let mut w_minus = w.clone();
            w_minus[i] -= shift;
            grad.push(0.5 * (objective(&w_plus)? - objective(&w_minus)?));
        }
        Ok(Tensor::from_vec(grad, shape, weights.device())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Var;

    fn cpu() -> Device {
        Device::Cpu
    }

    #[test]
    fn test_single_qubit_rotation() -> Result<()> {
        let circuit = Circuit::new(1, 1, false, &cpu())?;
        let angles = Tensor::new(&[[0.3f32], [1.2]], &cpu())?;
        let weights = Tensor::new(&[[0.5f32]], &cpu())?;
        let e = circuit.expectations(&angles, &weights)?.to_vec2::<f32>()?;
        // RY rotations about the same axis add up
        assert!((e[0][0] - 0.8f32.cos()).abs() < 1e-5);
        assert!((e[1][0] - 1.7f32.cos()).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_state_stays_normalized() -> Result<()> {
        let circuit = Circuit::new(3, 2, true, &cpu())?;
        let angles = Tensor::new(&[[0.1f32, -2.0, 0.7], [3.0, 0.4, -1.1]], &cpu())?;
        let weights = Tensor::new(&[[0.2f32, 0.9, -0.4], [1.5, -0.3, 2.2]], &cpu())?;
        let e = circuit.expectations(&angles, &weights)?;
        assert_eq!(e.dims(), [2, 3]);
        for row in e.to_vec2::<f32>()? {
            for z in row {
                assert!(z.abs() <= 1.0 + 1e-5);
            }
        }
        Ok(())
    }

    #[test]
    fn test_cz_ring_signs() -> Result<()> {
        let circuit = Circuit::new(3, 1, false, &cpu())?;
        let signs = circuit.cz_signs.flatten_all()?.to_vec1::<f32>()?;
        // |111> has three adjacent pairs in the ring
        assert_eq!(signs[0b111], -1.0);
        assert_eq!(signs[0b011], -1.0);
        assert_eq!(signs[0b101], -1.0);
        assert_eq!(signs[0b001], 1.0);
        Ok(())
    }

    #[test]
    fn test_parameter_shift_matches_autograd() -> Result<()> {
        let circuit = Circuit::new(3, 2, true, &cpu())?;
        let angles = Tensor::new(&[[0.1f32, -2.0, 0.7], [3.0, 0.4, -1.1]], &cpu())?;
        let weights = Var::from_tensor(&Tensor::new(
            &[[0.2f32, 0.9, -0.4], [1.5, -0.3, 2.2]],
            &cpu(),
        )?)?;

        let loss = circuit
            .expectations(&angles, weights.as_tensor())?
            .sum(1)?
            .mean(0)?;
        let grads = loss.backward()?;
        let autograd = grads
            .get(weights.as_tensor())
            .expect("no gradient for the weights")
            .to_vec2::<f32>()?;
        let shifted = circuit
            .parameter_shift(&angles, weights.as_tensor())?
            .to_vec2::<f32>()?;

        for (r1, r2) in autograd.iter().zip(shifted.iter()) {
            for (g1, g2) in r1.iter().zip(r2.iter()) {
                assert!((g1 - g2).abs() < 1e-4, "{} != {}", g1, g2);
            }
        }
        Ok(())
    }
}
