//! Dense batched backend implementing the accelerator offload contract.
//!
//! The contract (host perspective): upload T and R_i as dense arrays indexed
//! by `(s, a, s')`, upload the state mask for the partition and the candidate
//! action mask, run bounded Bellman iterations to an internal τ, and get back
//! V_i restricted to the partition plus the argmax action per state. The
//! call blocks; cancellation is not supported; any device-side failure
//! surfaces as `AcceleratorFault`. The K-layer nesting and all pruning stay
//! host-side, which is what preserves the lexicographic ordering guarantees.
//!
//! This implementation emulates the device on the host with the same dense
//! SoA layout a GPU kernel would consume, so a real device backend can
//! replace it behind [`PartitionBackend`] without touching the solver.
//! Upload of T is performed once per backend instance and each R_i on first
//! use (the solver creates one instance per solve, so the cache key is just
//! the factor index).

use crate::backend::{LayerRequest, PartitionBackend};
use crate::error::SolveError;
use crate::types::LexModel;

/// Device allocation budget for the dense T and R tensors.
const DEVICE_BUDGET_BYTES: usize = 256 * 1024 * 1024;

/// Hard cap on device-side sweeps regardless of the horizon bound.
const DEVICE_MAX_SWEEPS: u32 = 100_000;

/// Dense accelerator-contract backend.
pub struct BatchedBackend {
    budget_bytes: usize,
    /// Cached dims of the uploaded model; a fresh instance is used per solve.
    dims: Option<(usize, usize)>,
    /// Dense T: `probs[(s * A + a) * n + s']`.
    probs: Vec<f64>,
    /// Dense R for the currently uploaded factor, same layout.
    rewards: Vec<f64>,
    rewards_factor: Option<usize>,
    /// Candidate-action mask for the current layer, `(s, a)` indexed.
    astar_mask: Vec<bool>,
    v_dev: Vec<f64>,
    v_next: Vec<f64>,
}

impl Default for BatchedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchedBackend {
    pub fn new() -> Self {
        Self::with_budget(DEVICE_BUDGET_BYTES)
    }

    /// Construct with an explicit allocation budget (tests use a small one).
    pub fn with_budget(budget_bytes: usize) -> Self {
        BatchedBackend {
            budget_bytes,
            dims: None,
            probs: Vec::new(),
            rewards: Vec::new(),
            rewards_factor: None,
            astar_mask: Vec::new(),
            v_dev: Vec::new(),
            v_next: Vec::new(),
        }
    }

    /// Densify T (once) and R_i (once per factor). Fails before allocating
    /// when the dense tensors exceed the device budget.
    fn upload(&mut self, model: &LexModel, reward: usize) -> Result<(), SolveError> {
        let n = model.num_states();
        let na = model.num_actions();
        let tensor_len = n * na * n;
        let required = 2 * tensor_len * std::mem::size_of::<f64>();
        if required > self.budget_bytes {
            return Err(SolveError::AcceleratorFault(format!(
                "dense upload needs {} bytes, device budget is {}",
                required, self.budget_bytes
            )));
        }

        if self.dims != Some((n, na)) {
            self.dims = Some((n, na));
            self.rewards_factor = None;
            self.probs.clear();
            self.probs.resize(tensor_len, 0.0);
            for s in 0..n {
                for a in 0..na {
                    let base = (s * na + a) * n;
                    for e in model.succ_range(s, a) {
                        self.probs[base + model.succ_state(e)] = model.succ_prob(e);
                    }
                }
            }
            self.astar_mask.resize(n * na, false);
            self.v_dev.resize(n, 0.0);
            self.v_next.resize(n, 0.0);
        }

        if self.rewards_factor != Some(reward) {
            self.rewards.clear();
            self.rewards.resize(tensor_len, 0.0);
            for s in 0..n {
                for a in 0..na {
                    let base = (s * na + a) * n;
                    for e in model.succ_range(s, a) {
                        self.rewards[base + model.succ_state(e)] = model.reward(reward, e);
                    }
                }
            }
            self.rewards_factor = Some(reward);
        }
        Ok(())
    }

    /// Sweep bound from the discounted-horizon argument: after t sweeps the
    /// remaining error is at most γ^t · R_max / (1 − γ).
    fn sweep_bound(model: &LexModel, reward: usize, tau: f64) -> u32 {
        let gamma = model.discount();
        let r_max = model.reward_abs_max(reward).max(tau);
        let t = ((tau * (1.0 - gamma) / r_max).ln() / gamma.ln()).ceil();
        if t.is_finite() && t >= 1.0 {
            (t as u32).min(DEVICE_MAX_SWEEPS)
        } else {
            1
        }
    }
}

impl PartitionBackend for BatchedBackend {
    fn solve_layer(
        &mut self,
        req: &LayerRequest<'_>,
        v: &mut [f64],
        argmax: &mut [u32],
    ) -> Result<(), SolveError> {
        let model = req.model;
        let n = model.num_states();
        let na = model.num_actions();
        let gamma = model.discount();
        self.upload(model, req.reward)?;

        // Upload the candidate-action mask for the partition. Candidate sets
        // are subsequences of the ascending enabled-action list, so scanning
        // actions in ascending index order preserves the host's
        // first-occurrence tie-breaking.
        for &s in req.states {
            let base = s as usize * na;
            self.astar_mask[base..base + na].fill(false);
        }
        for (pos, &s) in req.states.iter().enumerate() {
            let base = s as usize * na;
            for &a in req.astar.get(pos) {
                self.astar_mask[base + a as usize] = true;
            }
        }

        self.v_dev.copy_from_slice(v);

        let max_sweeps = if req.looping {
            Self::sweep_bound(model, req.reward, req.tau)
        } else {
            1
        };

        for _ in 0..max_sweeps {
            let mut diff: f64 = 0.0;
            for (pos, &s) in req.states.iter().enumerate() {
                let s = s as usize;
                let mut best_q = f64::NEG_INFINITY;
                let mut best_a = u32::MAX;
                for a in 0..na {
                    if !self.astar_mask[s * na + a] {
                        continue;
                    }
                    let base = (s * na + a) * n;
                    let mut q = 0.0;
                    for sp in 0..n {
                        let p = self.probs[base + sp];
                        q += p * (self.rewards[base + sp] + gamma * self.v_dev[sp]);
                    }
                    if q > best_q {
                        best_q = q;
                        best_a = a as u32;
                    }
                }
                if best_a == u32::MAX {
                    return Err(SolveError::AcceleratorFault(format!(
                        "empty action mask for state {}",
                        s
                    )));
                }
                if !best_q.is_finite() {
                    return Err(SolveError::AcceleratorFault(format!(
                        "non-finite value produced on device for state {}",
                        s
                    )));
                }
                self.v_next[pos] = best_q;
                argmax[pos] = best_a;
                diff = diff.max((best_q - self.v_dev[s]).abs());
            }
            for (pos, &s) in req.states.iter().enumerate() {
                self.v_dev[s as usize] = self.v_next[pos];
            }
            if diff <= req.tau {
                break;
            }
        }

        // Download V_i restricted to the partition.
        for &s in req.states {
            v[s as usize] = self.v_dev[s as usize];
        }
        Ok(())
    }
}
