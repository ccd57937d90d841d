//! Q-evaluation and slack-based action pruning.
//!
//! The two building blocks of every layer: `Q_i(s, a | V)` over the sparse
//! successor row, and the prune that keeps the actions whose Q value is
//! within a threshold of the row maximum. Both are pure; the prune preserves
//! the input order of actions, so exact ties always resolve to the first
//! occurrence.

use crate::types::LexModel;

/// Machine-precision breadth for exact-tie detection, one order of magnitude
/// above ε_machine.
#[inline(always)]
pub fn tie_threshold() -> f64 {
    f64::EPSILON * 10.0
}

/// δ-slack prune threshold: η_i = (1 − γ)·δ_i plus the tie breadth.
///
/// Keeping each layer's per-state Q regret below (1 − γ)·δ_i bounds the
/// accumulated expected-value loss on reward i by δ_i.
#[inline(always)]
pub fn slack_threshold(discount: f64, delta: f64) -> f64 {
    (1.0 - discount) * delta + tie_threshold()
}

/// `Q_i(s, a | V) = Σ_{s' ∈ succ(s,a)} T(s,a,s') · (R_i(s,a,s') + γ · V(s'))`.
///
/// `v` is the factor-i value slice (length `|S|`); every stored successor
/// index is defined in it (checked at model construction), so the sum only
/// walks the sparse CSR row.
#[inline(always)]
pub fn q_value(model: &LexModel, i: usize, s: usize, a: usize, v: &[f64]) -> f64 {
    debug_assert_eq!(v.len(), model.num_states());
    let gamma = model.discount();
    let mut q = 0.0;
    for e in model.succ_range(s, a) {
        let succ = model.succ_state(e);
        q += model.succ_prob(e) * (model.reward(i, e) + gamma * v[succ]);
    }
    q
}

/// First-occurrence argmax of `Q_i(s, · | V)` over `actions`.
///
/// Returns `None` when `actions` is empty (an exhausted candidate set, which
/// the caller reports as a model inconsistency).
pub fn best_action(
    model: &LexModel,
    i: usize,
    s: usize,
    v: &[f64],
    actions: &[u32],
) -> Option<(u32, f64)> {
    let mut best: Option<(u32, f64)> = None;
    for &a in actions {
        let q = q_value(model, i, s, a as usize, v);
        match best {
            Some((_, bq)) if q <= bq => {}
            _ => best = Some((a, q)),
        }
    }
    best
}

/// Prune core: keep `actions[k]` iff `|max(qs) − qs[k]| ≤ threshold`.
///
/// `qs` is parallel to `actions`. Output order follows input order.
pub fn prune_q(qs: &[f64], actions: &[u32], threshold: f64, out: &mut Vec<u32>) {
    debug_assert_eq!(qs.len(), actions.len());
    out.clear();
    let mut max_q = f64::NEG_INFINITY;
    for &q in qs {
        if q > max_q {
            max_q = q;
        }
    }
    for (k, &a) in actions.iter().enumerate() {
        if (max_q - qs[k]).abs() <= threshold {
            out.push(a);
        }
    }
}

/// Evaluate `Q_i(s, a | V)` for every candidate and keep the subset within
/// `threshold` of the maximum. `q_scratch` is a reused buffer.
///
/// With `threshold = tie_threshold()` this is the argmax prune; with
/// `slack_threshold(γ, δ_i)` it is the δ-slack prune used between reward
/// layers.
pub fn prune_actions(
    model: &LexModel,
    i: usize,
    s: usize,
    v: &[f64],
    threshold: f64,
    actions: &[u32],
    q_scratch: &mut Vec<f64>,
    out: &mut Vec<u32>,
) {
    q_scratch.clear();
    for &a in actions {
        q_scratch.push(q_value(model, i, s, a as usize, v));
    }
    prune_q(q_scratch, actions, threshold, out);
}

/// Candidate action sets for every state of one partition, CSR over
/// partition positions. Two of these ping-pong across reward layers; both
/// are allocated once at solve entry and reused.
#[derive(Debug)]
pub struct ActionSets {
    start: Vec<u32>,
    ids: Vec<u32>,
}

impl ActionSets {
    pub fn with_capacity(positions: usize, total_actions: usize) -> Self {
        ActionSets {
            start: Vec::with_capacity(positions + 1),
            ids: Vec::with_capacity(total_actions),
        }
    }

    /// Reset to an empty set list (row starts at 0).
    pub fn clear(&mut self) {
        self.start.clear();
        self.ids.clear();
        self.start.push(0);
    }

    /// Append the candidate set for the next partition position.
    pub fn push_set(&mut self, actions: &[u32]) {
        self.ids.extend_from_slice(actions);
        self.start.push(self.ids.len() as u32);
    }

    /// Candidate actions at partition position `pos`.
    #[inline(always)]
    pub fn get(&self, pos: usize) -> &[u32] {
        &self.ids[self.start[pos] as usize..self.start[pos + 1] as usize]
    }

    /// Number of positions stored so far.
    pub fn len(&self) -> usize {
        self.start.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;

    /// Two states, three actions; action Q values at state 0 are controlled
    /// through the immediate rewards (successor values zero).
    fn chain_model() -> LexModel {
        let mut b = ModelBuilder::new(2, 3, 1, 0.9);
        b.add_transition(0, 0, 1, 1.0, &[1.0]);
        b.add_transition(0, 1, 1, 1.0, &[1.0]);
        b.add_transition(0, 2, 1, 1.0, &[0.5]);
        for a in 0..3 {
            b.add_transition(1, a, 1, 1.0, &[0.0]);
        }
        b.uniform_partition();
        b.finish().unwrap()
    }

    #[test]
    fn test_q_value_sparse_row() {
        let model = chain_model();
        let v = vec![0.0, 2.0];
        // Q = 1.0 * (1.0 + 0.9 * 2.0)
        assert!((q_value(&model, 0, 0, 0, &v) - 2.8).abs() < 1e-12);
    }

    #[test]
    fn test_best_action_first_occurrence() {
        let model = chain_model();
        let v = vec![0.0, 0.0];
        // Actions 0 and 1 tie exactly; the first wins.
        let (a, q) = best_action(&model, 0, 0, &v, &[0, 1, 2]).unwrap();
        assert_eq!(a, 0);
        assert!((q - 1.0).abs() < 1e-12);
        // Order determines the winner on exact ties.
        let (a, _) = best_action(&model, 0, 0, &v, &[1, 0, 2]).unwrap();
        assert_eq!(a, 1);
    }

    #[test]
    fn test_best_action_empty() {
        let model = chain_model();
        assert!(best_action(&model, 0, 0, &[0.0, 0.0], &[]).is_none());
    }

    #[test]
    fn test_prune_keeps_ties_and_order() {
        let qs = [1.0, 1.0, 0.5];
        let mut out = Vec::new();
        prune_q(&qs, &[0, 1, 2], tie_threshold(), &mut out);
        assert_eq!(out, vec![0, 1]);
    }

    #[test]
    fn test_prune_slack_widens() {
        let qs = [1.0, 0.96, 0.5];
        let mut out = Vec::new();
        // γ = 0.9, δ = 0.5 ⇒ η = 0.05: the 0.04 gap survives, the 0.5 gap not.
        prune_q(&qs, &[7, 8, 9], slack_threshold(0.9, 0.5), &mut out);
        assert_eq!(out, vec![7, 8]);
        // Strict prune keeps only the maximum.
        prune_q(&qs, &[7, 8, 9], slack_threshold(0.9, 0.0), &mut out);
        assert_eq!(out, vec![7]);
    }

    #[test]
    fn test_action_sets_roundtrip() {
        let mut sets = ActionSets::with_capacity(4, 16);
        sets.clear();
        sets.push_set(&[0, 1, 2]);
        sets.push_set(&[3]);
        sets.push_set(&[]);
        assert_eq!(sets.len(), 3);
        assert_eq!(sets.get(0), &[0, 1, 2]);
        assert_eq!(sets.get(1), &[3]);
        assert!(sets.get(2).is_empty());
    }
}
