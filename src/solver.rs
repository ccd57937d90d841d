//! Outer fixed point: the `solve` boundary.
//!
//! Sweep-to-fixed-point over the preference partition. Each outer sweep
//! snapshots `V^fixed ← V`, runs the partition solver on every block in
//! index order against that snapshot, and terminates once every
//! per-(partition, reward) difference is within τ. The partition order only
//! shapes the trajectory, never the fixed point.
//!
//! All working storage — both value tables, the candidate-set buffers, the
//! policy — is allocated here once and reused across sweeps. The loop is
//! deterministic: it either converges, fails, or (with `max_iterations`)
//! reports `NotConverged` carrying the current best result.

use crate::backend::{CpuBackend, PartitionBackend};
use crate::batched::BatchedBackend;
use crate::convergence::{criterion, ConvergenceMonitor};
use crate::error::SolveError;
use crate::partition::{solve_partition, PartitionScratch};
use crate::types::{BackendKind, LexModel, Policy, Solution, SolverConfig, ValueTable};

/// Solve the lexicographic MDP: returns the policy and the K × |S| value
/// table satisfying each partition's ordering up to the per-reward slack,
/// to within the ε criterion.
pub fn solve(model: &LexModel, config: &SolverConfig) -> Result<Solution, SolveError> {
    let mut backend: Box<dyn PartitionBackend> = match config.backend {
        BackendKind::Cpu => Box::new(CpuBackend::new(model)),
        BackendKind::Accelerator => Box::new(BatchedBackend::new()),
    };
    solve_with_backend(model, config, backend.as_mut())
}

/// Solve with a caller-provided backend (the accelerator tests use this to
/// inject a constrained device).
pub fn solve_with_backend(
    model: &LexModel,
    config: &SolverConfig,
    backend: &mut dyn PartitionBackend,
) -> Result<Solution, SolveError> {
    model.validate()?;

    let n = model.num_states();
    let k = model.num_rewards();
    let tau = criterion(config.epsilon, model.discount());
    let (blocks, orderings) = model.partitions();

    // All buffers live for the whole solve.
    let mut v = ValueTable::zeros(k, n);
    let mut v_fixed = ValueTable::zeros(k, n);
    let mut scratch = PartitionScratch::new(model);
    let mut monitor = ConvergenceMonitor::new(blocks.len(), k, tau);

    // Arbitrary but deterministic initial policy: the first enabled action.
    let mut policy = Policy::new(n);
    for s in 0..n {
        policy.set(s, model.actions_for(s)[0]);
    }

    if config.trace {
        monitor.print_header(orderings);
    }

    let mut iterations = 0u32;
    loop {
        v_fixed.copy_from(&v);
        monitor.begin_sweep();

        for (j, (states, ordering)) in blocks.iter().zip(orderings.iter()).enumerate() {
            solve_partition(
                model,
                states,
                ordering,
                &v_fixed,
                &mut v,
                &mut policy,
                backend,
                config.looping,
                tau,
                &mut scratch,
            )?;
            monitor.record_partition(j, states, &v, &v_fixed);
        }

        iterations += 1;
        if config.trace {
            monitor.print_row(iterations, orderings);
        }

        if monitor.converged() {
            return Ok(Solution {
                policy,
                values: v,
                iterations,
                residual: monitor.residual(),
            });
        }

        if let Some(cap) = config.max_iterations {
            if iterations >= cap {
                let residual = monitor.residual();
                return Err(SolveError::NotConverged {
                    iterations,
                    residual,
                    partial: Box::new(Solution {
                        policy,
                        values: v,
                        iterations,
                        residual,
                    }),
                });
            }
        }
    }
}
