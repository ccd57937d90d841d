//! Core data structures: the model, value tables, policies, and solver config.
//!
//! The central type is [`LexModel`], the immutable description of a
//! lexicographic MDP. It is built once by [`crate::model::ModelBuilder`] and
//! then shared immutably across the solver, the evaluation routines, and
//! (behind `&`) rayon workers during partition sweeps.
//!
//! Everything is a dense integer index into flat arrays: state `s` and action
//! `a` are indices in `[0, |S|)` and `[0, |A|)`, transitions are a CSR tensor
//! over `(s, a)` rows, and the downstream tables (V, π, candidate action
//! sets) are arrays keyed by index. There are no per-model hash lookups on
//! the hot path and no process-wide indexers: two models in the same process
//! share nothing.

use serde::{Deserialize, Serialize};

/// Immutable lexicographic MDP.
///
/// Layout:
/// - Transitions are CSR with one row per `(s, a)`:
///   `vals[row_start[r]..row_start[r+1]]` are probabilities and
///   `cols[..]` the successor state indices, `r = s * num_actions + a`.
///   Only successors with `T(s,a,s') > 0` are stored.
/// - The K factored rewards are stored factor-major, parallel to the CSR
///   entries: `reward_vals[i * nnz + e]` is `R_i` for entry `e`. One uniform
///   accessor ([`LexModel::reward`]) regardless of how the model was built.
/// - Enabled actions per state are a second CSR over states
///   (`action_ids[action_row_start[s]..action_row_start[s+1]]`, ascending).
///   Disabled actions are simply absent; they are never scored.
#[derive(Debug)]
pub struct LexModel {
    pub(crate) num_states: usize,
    pub(crate) num_actions: usize,
    pub(crate) num_rewards: usize,
    pub(crate) discount: f64,
    pub(crate) slack: Vec<f64>,

    pub(crate) row_start: Vec<u32>,
    pub(crate) cols: Vec<u32>,
    pub(crate) vals: Vec<f64>,
    pub(crate) reward_vals: Vec<f64>,
    pub(crate) reward_min: Vec<f64>,
    pub(crate) reward_max: Vec<f64>,

    pub(crate) action_row_start: Vec<u32>,
    pub(crate) action_ids: Vec<u32>,

    pub(crate) partitions: Vec<Vec<u32>>,
    pub(crate) orderings: Vec<Vec<u32>>,
}

impl LexModel {
    #[inline(always)]
    pub fn num_states(&self) -> usize {
        self.num_states
    }

    #[inline(always)]
    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    #[inline(always)]
    pub fn num_rewards(&self) -> usize {
        self.num_rewards
    }

    #[inline(always)]
    pub fn discount(&self) -> f64 {
        self.discount
    }

    #[inline(always)]
    pub fn slack(&self) -> &[f64] {
        &self.slack
    }

    /// Number of stored (nonzero) transition entries.
    #[inline(always)]
    pub fn nnz(&self) -> usize {
        self.cols.len()
    }

    /// CSR entry range for the `(s, a)` row.
    #[inline(always)]
    pub fn succ_range(&self, s: usize, a: usize) -> std::ops::Range<usize> {
        debug_assert!(s < self.num_states, "state {} out of range", s);
        debug_assert!(a < self.num_actions, "action {} out of range", a);
        let row = s * self.num_actions + a;
        self.row_start[row] as usize..self.row_start[row + 1] as usize
    }

    /// Successor state of CSR entry `e`.
    #[inline(always)]
    pub fn succ_state(&self, e: usize) -> usize {
        self.cols[e] as usize
    }

    /// Transition probability of CSR entry `e`.
    #[inline(always)]
    pub fn succ_prob(&self, e: usize) -> f64 {
        self.vals[e]
    }

    /// `R_i` on CSR entry `e` — the uniform reward interface.
    #[inline(always)]
    pub fn reward(&self, i: usize, e: usize) -> f64 {
        debug_assert!(i < self.num_rewards, "reward {} out of range", i);
        self.reward_vals[i * self.cols.len() + e]
    }

    /// Sparse successor enumeration: `(s', T(s,a,s'))` pairs for `(s, a)`.
    pub fn successors(&self, s: usize, a: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.succ_range(s, a)
            .map(move |e| (self.cols[e] as usize, self.vals[e]))
    }

    /// Enabled actions at `s`, ascending by index.
    #[inline(always)]
    pub fn actions_for(&self, s: usize) -> &[u32] {
        &self.action_ids[self.action_row_start[s] as usize..self.action_row_start[s + 1] as usize]
    }

    /// Known bound `max_e |R_i(e)|`, used by the accelerator backend to bound
    /// its internal iteration count.
    #[inline(always)]
    pub fn reward_abs_max(&self, i: usize) -> f64 {
        self.reward_min[i].abs().max(self.reward_max[i].abs())
    }

    /// The preference partition: parallel lists of state sets and orderings.
    pub fn partitions(&self) -> (&[Vec<u32>], &[Vec<u32>]) {
        (&self.partitions, &self.orderings)
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }
}

/// Per-reward value table: `K × |S|` reals, factor-major.
///
/// Initialized to zero; mutated only by the partition solver. A second table
/// serves as the read-only snapshot (`V^fixed`) for each outer sweep. Once a
/// table leaves the solver it is inspection-only: the mutating methods are
/// crate-internal, callers read through [`ValueTable::get`],
/// [`ValueTable::factor`], and [`ValueTable::as_slice`].
#[derive(Clone, Debug)]
pub struct ValueTable {
    num_states: usize,
    data: Vec<f64>,
}

impl ValueTable {
    pub fn zeros(num_rewards: usize, num_states: usize) -> Self {
        ValueTable {
            num_states,
            data: vec![0.0; num_rewards * num_states],
        }
    }

    #[inline(always)]
    pub fn num_states(&self) -> usize {
        self.num_states
    }

    #[inline(always)]
    pub fn num_rewards(&self) -> usize {
        self.data.len() / self.num_states
    }

    #[inline(always)]
    pub fn get(&self, i: usize, s: usize) -> f64 {
        self.data[i * self.num_states + s]
    }

    #[inline(always)]
    pub(crate) fn set(&mut self, i: usize, s: usize, value: f64) {
        self.data[i * self.num_states + s] = value;
    }

    /// The `|S|`-length slice for reward factor `i`.
    #[inline(always)]
    pub fn factor(&self, i: usize) -> &[f64] {
        &self.data[i * self.num_states..(i + 1) * self.num_states]
    }

    #[inline(always)]
    pub(crate) fn factor_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.num_states..(i + 1) * self.num_states]
    }

    /// Overwrite this table with `other` (same shape). Used for the
    /// per-sweep `V^fixed` snapshot without reallocating.
    pub(crate) fn copy_from(&mut self, other: &ValueTable) {
        debug_assert_eq!(self.data.len(), other.data.len());
        self.data.copy_from_slice(&other.data);
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// Stationary deterministic policy: one action index per state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Policy {
    actions: Vec<u32>,
}

impl Policy {
    pub fn new(num_states: usize) -> Self {
        Policy {
            actions: vec![0; num_states],
        }
    }

    #[inline(always)]
    pub fn action(&self, s: usize) -> usize {
        self.actions[s] as usize
    }

    #[inline(always)]
    pub fn set(&mut self, s: usize, a: u32) {
        self.actions[s] = a;
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.actions
    }
}

/// Which backend executes the per-layer Bellman iterations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Sparse CSR sweeps on the host, parallelized per state.
    Cpu,
    /// Dense batched backend implementing the accelerator contract.
    Accelerator,
}

/// Solver configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Outer convergence tolerance ε; the stopping criterion is
    /// τ = ε · max(0.1, (1−γ)/γ).
    pub epsilon: f64,
    /// Looping variant: iterate each layer's Bellman sweep to τ within the
    /// partition pass instead of performing a single sweep. More work per
    /// outer iteration, fewer outer iterations; the fixed point is the same.
    pub looping: bool,
    /// Backend for partition solves.
    pub backend: BackendKind,
    /// Optional cap on outer sweeps. When hit, `solve` returns
    /// [`crate::SolveError::NotConverged`] carrying the current best result.
    pub max_iterations: Option<u32>,
    /// Print the per-iteration convergence table.
    pub trace: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            epsilon: 1e-3,
            looping: false,
            backend: BackendKind::Cpu,
            max_iterations: None,
            trace: false,
        }
    }
}

/// Result of a solve: the policy, the per-reward value table, and how the
/// outer loop finished. The value table is exposed read-only for
/// post-inspection; ownership of the policy transfers to the caller.
#[derive(Clone, Debug)]
pub struct Solution {
    pub policy: Policy,
    pub values: ValueTable,
    /// Outer sweeps performed.
    pub iterations: u32,
    /// Final max per-(partition, reward) infinity-norm difference.
    pub residual: f64,
}
