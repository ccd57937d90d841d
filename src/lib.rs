//! # lexmdp — Lexicographic Value Iteration
//!
//! Solves **Lexicographic Markov Decision Processes**: finite MDPs with K
//! factored rewards whose importance is strictly ordered, a per-reward slack
//! tolerance, and a partition of the state space in which each block ranks
//! the rewards in its own order. The solver produces a stationary
//! deterministic policy together with the per-reward value function of every
//! state.
//!
//! ## Algorithm overview
//!
//! | Stage | Rust module | Description |
//! |-------|-------------|-------------|
//! | Outer fixed point | [`solver`] | Sweeps the partition blocks against a per-sweep value snapshot until every per-(block, reward) difference is within τ = ε·max(0.1, (1−γ)/γ) |
//! | Partition solve | [`partition`] | For one block, nested value iteration through the block's reward ordering; candidate action sets shrink monotonically between layers |
//! | Layer iteration | [`backend`], [`batched`] | Bellman sweeps for one reward over the block, on the sparse CPU path or the dense accelerator-contract path |
//! | Q / pruning | [`bellman`] | Sparse `Q_i(s,a\|V)` evaluation and the δ-slack prune: keep actions within η_i = (1−γ)·δ_i of the layer maximum |
//! | Convergence | [`convergence`] | Per-(block, reward) infinity-norm differences; full reduction, no partial early stop |
//!
//! ## Model representation
//!
//! States and actions are dense indices into flat arrays; transitions are a
//! CSR tensor over `(s, a)` rows with the K reward factors stored parallel
//! to the entries ([`types::LexModel`]). Per-state enabled-action masks
//! replace padded punitive self-loops. Models are built through
//! [`model::ModelBuilder`] — by the [`domains`] builders, by raw-model
//! loading ([`storage`]), or by external collaborators — and validated
//! before any solve.
//!
//! ## Entry points
//!
//! - [`solve`]`(model, config)` → policy + K×|S| values
//! - [`value_of_policy`]`(model, policy, ε)` → on-policy fixed point
//! - [`solve_single_objective`]`(model, i, ε)` → per-factor optimum baseline

pub mod backend;
pub mod batched;
pub mod bellman;
pub mod convergence;
pub mod domains;
pub mod env_config;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod partition;
pub mod solver;
pub mod storage;
pub mod types;

pub use error::SolveError;
pub use evaluation::{solve_single_objective, value_of_policy};
pub use model::ModelBuilder;
pub use solver::{solve, solve_with_backend};
pub use types::{BackendKind, LexModel, Policy, Solution, SolverConfig, ValueTable};
