//! Partition backends: the per-layer Bellman iteration engines.
//!
//! The partition solver drives the K-layer nesting host-side and dispatches
//! each layer's value iteration through [`PartitionBackend`]. Two concrete
//! implementations exist: [`CpuBackend`] (sparse CSR sweeps here) and
//! [`crate::batched::BatchedBackend`] (the dense accelerator contract).
//!
//! A sweep is Jacobi-style: every state's update reads the previous iterate,
//! so per-state updates are independent and run under rayon. Writes land in
//! disjoint slots and the residual is an order-independent max reduction, so
//! results are bit-identical across thread counts.

use rayon::prelude::*;

use crate::bellman::{best_action, ActionSets};
use crate::error::SolveError;
use crate::types::LexModel;

/// One reward layer of one partition pass.
pub struct LayerRequest<'a> {
    pub model: &'a LexModel,
    /// Reward index i being optimized this layer.
    pub reward: usize,
    /// States of the partition P_j, in sweep order.
    pub states: &'a [u32],
    /// Candidate action sets, parallel to `states`.
    pub astar: &'a ActionSets,
    /// Iterate sweeps to `tau` (looping variant) or perform exactly one.
    pub looping: bool,
    pub tau: f64,
}

/// Executes the Bellman iterations of a single reward layer over a partition.
///
/// `v` is the working factor slice (length `|S|`), seeded by the caller from
/// the fixed snapshot; entries for partition states are updated in place and
/// all other entries are read-only successor values. `argmax` (parallel to
/// `req.states`) receives the final sweep's argmax action per state.
pub trait PartitionBackend {
    fn solve_layer(
        &mut self,
        req: &LayerRequest<'_>,
        v: &mut [f64],
        argmax: &mut [u32],
    ) -> Result<(), SolveError>;
}

/// Sparse CPU backend: per-state parallel Jacobi sweeps over the CSR rows.
pub struct CpuBackend {
    /// Next-iterate buffer, indexed by partition position. Allocated once.
    next: Vec<f64>,
}

impl CpuBackend {
    pub fn new(model: &LexModel) -> Self {
        let max_block = model
            .partitions()
            .0
            .iter()
            .map(|p| p.len())
            .max()
            .unwrap_or(0);
        CpuBackend {
            next: vec![0.0; max_block],
        }
    }
}

impl PartitionBackend for CpuBackend {
    fn solve_layer(
        &mut self,
        req: &LayerRequest<'_>,
        v: &mut [f64],
        argmax: &mut [u32],
    ) -> Result<(), SolveError> {
        let m = req.states.len();
        debug_assert_eq!(argmax.len(), m);
        debug_assert_eq!(req.astar.len(), m);
        if self.next.len() < m {
            self.next.resize(m, 0.0);
        }
        let model = req.model;
        let reward = req.reward;

        loop {
            // One Jacobi sweep: every state reads the previous iterate `v`.
            let states = req.states;
            let astar = req.astar;
            let v_read: &[f64] = v;
            let diff = self.next[..m]
                .par_iter_mut()
                .zip(argmax.par_iter_mut())
                .enumerate()
                .map(|(pos, (slot, action_slot))| -> Result<f64, SolveError> {
                    let s = states[pos] as usize;
                    let (a, q) = best_action(model, reward, s, v_read, astar.get(pos))
                        .ok_or_else(|| {
                            SolveError::model(format!("no candidate actions at state {}", s))
                        })?;
                    if !q.is_finite() {
                        return Err(SolveError::NumericFault { reward, state: s });
                    }
                    *slot = q;
                    *action_slot = a;
                    Ok((q - v_read[s]).abs())
                })
                .try_reduce(|| 0.0, |a, b| Ok(a.max(b)))?;

            for (pos, &s) in req.states.iter().enumerate() {
                v[s as usize] = self.next[pos];
            }

            if !req.looping || diff <= req.tau {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;

    /// Deterministic two-state chain: state 0 steps to the absorbing state 1
    /// with reward 1; state 1 self-loops with reward 0.
    fn chain() -> LexModel {
        let mut b = ModelBuilder::new(2, 1, 1, 0.5);
        b.add_transition(0, 0, 1, 1.0, &[1.0]);
        b.add_transition(1, 0, 1, 1.0, &[0.0]);
        b.uniform_partition();
        b.finish().unwrap()
    }

    #[test]
    fn test_single_sweep_updates_once() {
        let model = chain();
        let mut astar = ActionSets::with_capacity(2, 2);
        astar.clear();
        astar.push_set(&[0]);
        astar.push_set(&[0]);
        let mut backend = CpuBackend::new(&model);
        let mut v = vec![0.0, 0.0];
        let mut argmax = vec![0u32; 2];
        let req = LayerRequest {
            model: &model,
            reward: 0,
            states: &[0, 1],
            astar: &astar,
            looping: false,
            tau: 1e-6,
        };
        backend.solve_layer(&req, &mut v, &mut argmax).unwrap();
        // One sweep from zero: V(0) = 1, V(1) = 0.
        assert!((v[0] - 1.0).abs() < 1e-12);
        assert_eq!(v[1], 0.0);
    }

    #[test]
    fn test_looping_reaches_fixed_point() {
        let model = chain();
        let mut astar = ActionSets::with_capacity(2, 2);
        astar.clear();
        astar.push_set(&[0]);
        astar.push_set(&[0]);
        let mut backend = CpuBackend::new(&model);
        let mut v = vec![0.0, 0.0];
        let mut argmax = vec![0u32; 2];
        let req = LayerRequest {
            model: &model,
            reward: 0,
            states: &[0, 1],
            astar: &astar,
            looping: true,
            tau: 1e-12,
        };
        backend.solve_layer(&req, &mut v, &mut argmax).unwrap();
        // Fixed point of the chain is exactly V(0) = 1, V(1) = 0.
        assert!((v[0] - 1.0).abs() < 1e-9);
        assert!(v[1].abs() < 1e-12);
        assert_eq!(argmax, vec![0, 0]);
    }
}
