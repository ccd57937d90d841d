//! Model construction and invariant validation.
//!
//! [`ModelBuilder`] is the index-arena form of the model-construction
//! interface: collaborators (the grid and road builders, raw-model loading,
//! or any external code) declare states and actions by dense index, add
//! sparse transitions with their K per-factor rewards, and attach the
//! preference partition. `finish` compacts everything into the CSR layout of
//! [`LexModel`] and validates every structural invariant; a model that fails
//! validation is never observable.

use crate::error::SolveError;
use crate::types::LexModel;

/// Tolerance for Σ_{s'} T(s,a,s') = 1 checks.
pub const ROW_SUM_TOLERANCE: f64 = 1e-9;

struct TransitionDraft {
    succ: u32,
    prob: f64,
    /// K reward values, parallel to the builder's factor count.
    rewards: Vec<f64>,
}

/// Incremental builder for [`LexModel`].
pub struct ModelBuilder {
    num_states: usize,
    num_actions: usize,
    num_rewards: usize,
    discount: f64,
    slack: Vec<f64>,
    /// One draft row per `(s, a)`, `row = s * num_actions + a`.
    rows: Vec<Vec<TransitionDraft>>,
    partitions: Vec<Vec<u32>>,
    orderings: Vec<Vec<u32>>,
}

impl ModelBuilder {
    /// Start a model with `num_states × num_actions` index ranges, K reward
    /// factors, and discount γ. Index assignment is local to this builder.
    pub fn new(num_states: usize, num_actions: usize, num_rewards: usize, discount: f64) -> Self {
        ModelBuilder {
            num_states,
            num_actions,
            num_rewards,
            discount,
            slack: vec![0.0; num_rewards],
            rows: (0..num_states * num_actions).map(|_| Vec::new()).collect(),
            partitions: Vec::new(),
            orderings: Vec::new(),
        }
    }

    /// Set the slack vector δ (defaults to all zeros — strict lexicographic).
    pub fn set_slack(&mut self, slack: &[f64]) {
        self.slack = slack.to_vec();
    }

    /// Add `T(s, a, succ) = prob` with the K per-factor rewards for that
    /// transition. Adding any transition for `(s, a)` enables action `a` at
    /// `s`. Zero-probability entries are dropped (rewards there are
    /// immaterial).
    pub fn add_transition(&mut self, s: usize, a: usize, succ: usize, prob: f64, rewards: &[f64]) {
        debug_assert!(s < self.num_states, "state {} out of range", s);
        debug_assert!(a < self.num_actions, "action {} out of range", a);
        debug_assert_eq!(rewards.len(), self.num_rewards);
        if prob == 0.0 {
            return;
        }
        self.rows[s * self.num_actions + a].push(TransitionDraft {
            succ: succ as u32,
            prob,
            rewards: rewards.to_vec(),
        });
    }

    /// Add a partition block with its reward ordering (a permutation of
    /// `0..K`). Blocks must be disjoint and jointly cover the state set.
    pub fn add_partition(&mut self, states: Vec<u32>, ordering: Vec<u32>) {
        self.partitions.push(states);
        self.orderings.push(ordering);
    }

    /// Convenience: one partition holding every state, identity ordering.
    pub fn uniform_partition(&mut self) {
        self.partitions.push((0..self.num_states as u32).collect());
        self.orderings.push((0..self.num_rewards as u32).collect());
    }

    /// Compact to CSR and validate. The returned model is immutable.
    pub fn finish(self) -> Result<LexModel, SolveError> {
        let num_rows = self.num_states * self.num_actions;
        let nnz: usize = self.rows.iter().map(|r| r.len()).sum();

        let mut row_start = Vec::with_capacity(num_rows + 1);
        let mut cols = Vec::with_capacity(nnz);
        let mut vals = Vec::with_capacity(nnz);
        let mut reward_vals = vec![0.0; self.num_rewards * nnz];

        row_start.push(0u32);
        for row in &self.rows {
            for draft in row {
                let e = cols.len();
                cols.push(draft.succ);
                vals.push(draft.prob);
                for i in 0..self.num_rewards {
                    reward_vals[i * nnz + e] = draft.rewards[i];
                }
            }
            row_start.push(cols.len() as u32);
        }

        // Enabled-action mask: a row with at least one stored transition.
        let mut action_row_start = Vec::with_capacity(self.num_states + 1);
        let mut action_ids = Vec::new();
        action_row_start.push(0u32);
        for s in 0..self.num_states {
            for a in 0..self.num_actions {
                if !self.rows[s * self.num_actions + a].is_empty() {
                    action_ids.push(a as u32);
                }
            }
            action_row_start.push(action_ids.len() as u32);
        }

        let mut reward_min = vec![f64::INFINITY; self.num_rewards];
        let mut reward_max = vec![f64::NEG_INFINITY; self.num_rewards];
        for i in 0..self.num_rewards {
            for e in 0..nnz {
                let r = reward_vals[i * nnz + e];
                reward_min[i] = reward_min[i].min(r);
                reward_max[i] = reward_max[i].max(r);
            }
        }
        if nnz == 0 {
            reward_min.fill(0.0);
            reward_max.fill(0.0);
        }

        let model = LexModel {
            num_states: self.num_states,
            num_actions: self.num_actions,
            num_rewards: self.num_rewards,
            discount: self.discount,
            slack: self.slack,
            row_start,
            cols,
            vals,
            reward_vals,
            reward_min,
            reward_max,
            action_row_start,
            action_ids,
            partitions: self.partitions,
            orderings: self.orderings,
        };
        model.validate()?;
        Ok(model)
    }
}

impl LexModel {
    /// Check every structural invariant. Run by the builder, by raw-model
    /// loading, and at the `solve` boundary before iterating.
    pub fn validate(&self) -> Result<(), SolveError> {
        if self.num_rewards == 0 {
            return Err(SolveError::model("model has no reward factors (K = 0)"));
        }
        if self.num_states == 0 || self.num_actions == 0 {
            return Err(SolveError::model("model has an empty state or action set"));
        }
        if !(self.discount > 0.0 && self.discount < 1.0) {
            return Err(SolveError::model(format!(
                "discount factor {} outside (0, 1); only the infinite-horizon discounted case is defined",
                self.discount
            )));
        }
        if self.slack.len() != self.num_rewards {
            return Err(SolveError::model(format!(
                "slack vector has {} entries for {} rewards",
                self.slack.len(),
                self.num_rewards
            )));
        }
        for (i, &d) in self.slack.iter().enumerate() {
            if !d.is_finite() || d < 0.0 {
                return Err(SolveError::model(format!("slack delta[{}] = {} is negative or non-finite", i, d)));
            }
        }

        self.validate_transitions()?;
        self.validate_partitions()?;
        Ok(())
    }

    fn validate_transitions(&self) -> Result<(), SolveError> {
        for s in 0..self.num_states {
            for a in 0..self.num_actions {
                let range = self.succ_range(s, a);
                if range.is_empty() {
                    continue; // action disabled at s
                }
                let mut sum = 0.0;
                for e in range.clone() {
                    let succ = self.cols[e] as usize;
                    let p = self.vals[e];
                    if succ >= self.num_states {
                        return Err(SolveError::model(format!(
                            "transition ({}, {}) targets undefined state {}",
                            s, a, succ
                        )));
                    }
                    if !(p > 0.0 && p <= 1.0 + ROW_SUM_TOLERANCE) {
                        return Err(SolveError::model(format!(
                            "transition probability T({}, {}, {}) = {} outside (0, 1]",
                            s, a, succ, p
                        )));
                    }
                    for i in 0..self.num_rewards {
                        if !self.reward(i, e).is_finite() {
                            return Err(SolveError::model(format!(
                                "reward {} is non-finite on transition ({}, {}, {})",
                                i, s, a, succ
                            )));
                        }
                    }
                    sum += p;
                }
                if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                    return Err(SolveError::model(format!(
                        "transition row ({}, {}) sums to {} (expected 1)",
                        s, a, sum
                    )));
                }
                // Duplicate successors would double-count probability mass.
                for e in range.clone() {
                    for f in e + 1..range.end {
                        if self.cols[e] == self.cols[f] {
                            return Err(SolveError::model(format!(
                                "duplicate successor {} in transition row ({}, {})",
                                self.cols[e], s, a
                            )));
                        }
                    }
                }
            }
            if self.actions_for(s).is_empty() {
                return Err(SolveError::model(format!("state {} has no enabled actions", s)));
            }
        }
        Ok(())
    }

    fn validate_partitions(&self) -> Result<(), SolveError> {
        if self.partitions.is_empty() {
            return Err(SolveError::model("no preference partition defined"));
        }
        if self.partitions.len() != self.orderings.len() {
            return Err(SolveError::model(format!(
                "{} partition blocks but {} orderings",
                self.partitions.len(),
                self.orderings.len()
            )));
        }
        let mut owner = vec![usize::MAX; self.num_states];
        for (j, block) in self.partitions.iter().enumerate() {
            if block.is_empty() {
                return Err(SolveError::model(format!("partition {} is empty", j)));
            }
            for &s in block {
                let s = s as usize;
                if s >= self.num_states {
                    return Err(SolveError::model(format!(
                        "partition {} contains undefined state {}",
                        j, s
                    )));
                }
                if owner[s] != usize::MAX {
                    return Err(SolveError::model(format!(
                        "state {} appears in partitions {} and {}",
                        s, owner[s], j
                    )));
                }
                owner[s] = j;
            }
        }
        if let Some(s) = owner.iter().position(|&j| j == usize::MAX) {
            return Err(SolveError::model(format!(
                "state {} is not covered by any partition",
                s
            )));
        }
        for (j, ordering) in self.orderings.iter().enumerate() {
            if ordering.len() != self.num_rewards {
                return Err(SolveError::model(format!(
                    "ordering {} has {} entries for {} rewards",
                    j,
                    ordering.len(),
                    self.num_rewards
                )));
            }
            let mut seen = vec![false; self.num_rewards];
            for &i in ordering {
                let i = i as usize;
                if i >= self.num_rewards || seen[i] {
                    return Err(SolveError::model(format!(
                        "ordering {} is not a permutation of 0..{}",
                        j, self.num_rewards
                    )));
                }
                seen[i] = true;
            }
        }
        Ok(())
    }
}
