//! Partition solver: nested value iteration over the K reward layers of one
//! partition block.
//!
//! For a block P_j with ordering o_j = (i_1, …, i_K), each layer t runs
//! Bellman iterations for reward i_t restricted to the surviving candidate
//! actions, records the layer's argmax as the (repeatedly overwritten)
//! policy, and then shrinks the candidate sets with the δ-slack prune before
//! the next layer. Only the final layer's action choice survives; candidate
//! sets shrink monotonically, and actions dropped by a prune are never
//! re-admitted.
//!
//! Successor values outside the block come from the outer sweep's fixed
//! snapshot: the working factor buffer is seeded from `V^fixed` and only
//! block entries are rewritten.

use crate::backend::{LayerRequest, PartitionBackend};
use crate::bellman::{prune_actions, slack_threshold, ActionSets};
use crate::error::SolveError;
use crate::types::{LexModel, Policy, ValueTable};

/// Working buffers for partition passes, allocated once at solve entry and
/// reused across all partitions and outer sweeps.
pub struct PartitionScratch {
    astar_cur: ActionSets,
    astar_next: ActionSets,
    argmax: Vec<u32>,
    q_scratch: Vec<f64>,
    pruned: Vec<u32>,
    /// Working copy of one value factor, length `|S|`.
    v_work: Vec<f64>,
}

impl PartitionScratch {
    pub fn new(model: &LexModel) -> Self {
        let max_block = model
            .partitions()
            .0
            .iter()
            .map(|p| p.len())
            .max()
            .unwrap_or(0);
        let cap = max_block * model.num_actions();
        PartitionScratch {
            astar_cur: ActionSets::with_capacity(max_block, cap),
            astar_next: ActionSets::with_capacity(max_block, cap),
            argmax: vec![0; max_block],
            q_scratch: Vec::with_capacity(model.num_actions()),
            pruned: Vec::with_capacity(model.num_actions()),
            v_work: vec![0.0; model.num_states()],
        }
    }
}

/// Solve one partition block against the fixed snapshot, writing updated
/// values for its states into `v` and the final-layer argmax into `policy`.
#[allow(clippy::too_many_arguments)]
pub fn solve_partition(
    model: &LexModel,
    states: &[u32],
    ordering: &[u32],
    v_fixed: &ValueTable,
    v: &mut ValueTable,
    policy: &mut Policy,
    backend: &mut dyn PartitionBackend,
    looping: bool,
    tau: f64,
    scratch: &mut PartitionScratch,
) -> Result<(), SolveError> {
    let num_rewards = model.num_rewards();
    let gamma = model.discount();

    // Layer 1 candidates: the full enabled-action set of each state.
    scratch.astar_cur.clear();
    for &s in states {
        scratch.astar_cur.push_set(model.actions_for(s as usize));
    }

    for (t, &i) in ordering.iter().enumerate() {
        let i = i as usize;

        // Seed the working estimate from the snapshot: block entries are the
        // iteration variable, everything else stays at V^fixed.
        scratch.v_work.copy_from_slice(v_fixed.factor(i));

        let req = LayerRequest {
            model,
            reward: i,
            states,
            astar: &scratch.astar_cur,
            looping,
            tau,
        };
        backend.solve_layer(&req, &mut scratch.v_work, &mut scratch.argmax[..states.len()])?;

        // The layer argmax overwrites the policy; only the last layer's
        // choice is observable.
        for (pos, &s) in states.iter().enumerate() {
            policy.set(s as usize, scratch.argmax[pos]);
        }

        // Shrink the candidate sets for the next layer against the values
        // this layer just produced.
        if t + 1 < num_rewards {
            let threshold = slack_threshold(gamma, model.slack()[i]);
            scratch.astar_next.clear();
            for (pos, &s) in states.iter().enumerate() {
                prune_actions(
                    model,
                    i,
                    s as usize,
                    &scratch.v_work,
                    threshold,
                    scratch.astar_cur.get(pos),
                    &mut scratch.q_scratch,
                    &mut scratch.pruned,
                );
                if scratch.pruned.is_empty() {
                    return Err(SolveError::model(format!(
                        "slack prune left state {} without candidate actions",
                        s
                    )));
                }
                scratch.astar_next.push_set(&scratch.pruned);
            }
            std::mem::swap(&mut scratch.astar_cur, &mut scratch.astar_next);
        }

        // Publish this factor's block values.
        let factor = v.factor_mut(i);
        for &s in states {
            factor[s as usize] = scratch.v_work[s as usize];
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::model::ModelBuilder;

    /// One state, two actions, two rewards. Action 0: R = (1, 0); action 1:
    /// R = (1, 1). Both tie on reward 0, so the second layer decides.
    fn tie_model() -> LexModel {
        let mut b = ModelBuilder::new(1, 2, 2, 0.5);
        b.add_transition(0, 0, 0, 1.0, &[1.0, 0.0]);
        b.add_transition(0, 1, 0, 1.0, &[1.0, 1.0]);
        b.uniform_partition();
        b.finish().unwrap()
    }

    #[test]
    fn test_second_layer_breaks_first_layer_tie() {
        let model = tie_model();
        let mut backend = CpuBackend::new(&model);
        let mut scratch = PartitionScratch::new(&model);
        let v_fixed = ValueTable::zeros(2, 1);
        let mut v = ValueTable::zeros(2, 1);
        let mut policy = Policy::new(1);
        solve_partition(
            &model,
            &[0],
            &[0, 1],
            &v_fixed,
            &mut v,
            &mut policy,
            &mut backend,
            true,
            1e-10,
            &mut scratch,
        )
        .unwrap();
        // Both actions survive the strict layer-0 prune; layer 1 prefers
        // action 1 (reward 1 vs 0).
        assert_eq!(policy.action(0), 1);
    }

    /// With distinct layer-0 values the prune must eliminate action 1 even
    /// though layer 1 would prefer it.
    #[test]
    fn test_prune_blocks_lower_priority_preference() {
        let mut b = ModelBuilder::new(1, 2, 2, 0.5);
        b.add_transition(0, 0, 0, 1.0, &[1.0, 0.0]);
        b.add_transition(0, 1, 0, 1.0, &[0.0, 1.0]);
        b.uniform_partition();
        let model = b.finish().unwrap();
        let mut backend = CpuBackend::new(&model);
        let mut scratch = PartitionScratch::new(&model);
        let v_fixed = ValueTable::zeros(2, 1);
        let mut v = ValueTable::zeros(2, 1);
        let mut policy = Policy::new(1);
        solve_partition(
            &model,
            &[0],
            &[0, 1],
            &v_fixed,
            &mut v,
            &mut policy,
            &mut backend,
            true,
            1e-10,
            &mut scratch,
        )
        .unwrap();
        assert_eq!(policy.action(0), 0);
    }
}
