//! Policy evaluation and the single-objective baseline.
//!
//! `value_of_policy` computes the true on-policy value table (the fixed
//! point of V_i^π), as opposed to the solver's intermediate V. It always
//! seeds from zero — the seed affects only convergence speed, never the
//! fixed point. `solve_single_objective` is standard value iteration over
//! one reward factor, used as the optimum reference when checking the
//! per-reward slack bound.

use rayon::prelude::*;

use crate::bellman::{best_action, q_value};
use crate::convergence::criterion;
use crate::error::SolveError;
use crate::types::{LexModel, Policy, ValueTable};

/// Fixed point of V_i^π(s) = Σ_{s'} T(s,π(s),s')·(R_i(s,π(s),s') + γ·V_i^π(s'))
/// for every reward factor, to within τ(ε).
pub fn value_of_policy(
    model: &LexModel,
    policy: &Policy,
    epsilon: f64,
) -> Result<ValueTable, SolveError> {
    model.validate()?;
    if policy.len() != model.num_states() {
        return Err(SolveError::model(format!(
            "policy covers {} states, model has {}",
            policy.len(),
            model.num_states()
        )));
    }
    for s in 0..model.num_states() {
        let a = policy.action(s) as u32;
        if !model.actions_for(s).contains(&a) {
            return Err(SolveError::model(format!(
                "policy action {} is not enabled at state {}",
                a, s
            )));
        }
    }

    let n = model.num_states();
    let tau = criterion(epsilon, model.discount());
    let mut values = ValueTable::zeros(model.num_rewards(), n);
    let mut next = vec![0.0; n];

    for i in 0..model.num_rewards() {
        loop {
            let v: &[f64] = values.factor(i);
            let diff = next
                .par_iter_mut()
                .enumerate()
                .map(|(s, slot)| -> Result<f64, SolveError> {
                    let q = q_value(model, i, s, policy.action(s), v);
                    if !q.is_finite() {
                        return Err(SolveError::NumericFault { reward: i, state: s });
                    }
                    *slot = q;
                    Ok((q - v[s]).abs())
                })
                .try_reduce(|| 0.0, |a, b| Ok(a.max(b)))?;
            values.factor_mut(i).copy_from_slice(&next);
            if diff <= tau {
                break;
            }
        }
    }
    Ok(values)
}

/// Standard value iteration for one reward factor over the enabled actions,
/// ignoring the lexicographic structure. Returns the optimal value function
/// and a greedy policy for that factor alone.
pub fn solve_single_objective(
    model: &LexModel,
    reward: usize,
    epsilon: f64,
) -> Result<(Vec<f64>, Policy), SolveError> {
    model.validate()?;
    if reward >= model.num_rewards() {
        return Err(SolveError::model(format!(
            "reward index {} out of range (K = {})",
            reward,
            model.num_rewards()
        )));
    }

    let n = model.num_states();
    let tau = criterion(epsilon, model.discount());
    let mut v = vec![0.0; n];
    let mut next = vec![0.0; n];
    let mut policy = Policy::new(n);
    let mut actions = vec![0u32; n];

    loop {
        let v_read: &[f64] = &v;
        let diff = next
            .par_iter_mut()
            .zip(actions.par_iter_mut())
            .enumerate()
            .map(|(s, (slot, action_slot))| -> Result<f64, SolveError> {
                let (a, q) = best_action(model, reward, s, v_read, model.actions_for(s))
                    .ok_or_else(|| {
                        SolveError::model(format!("no enabled actions at state {}", s))
                    })?;
                if !q.is_finite() {
                    return Err(SolveError::NumericFault { reward, state: s });
                }
                *slot = q;
                *action_slot = a;
                Ok((q - v_read[s]).abs())
            })
            .try_reduce(|| 0.0, |a, b| Ok(a.max(b)))?;
        v.copy_from_slice(&next);
        if diff <= tau {
            break;
        }
    }
    for (s, &a) in actions.iter().enumerate() {
        policy.set(s, a);
    }
    Ok((v, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;

    fn chain() -> LexModel {
        let mut b = ModelBuilder::new(2, 2, 1, 0.5);
        b.add_transition(0, 0, 1, 1.0, &[1.0]);
        b.add_transition(0, 1, 0, 1.0, &[0.0]);
        b.add_transition(1, 0, 1, 1.0, &[0.0]);
        b.add_transition(1, 1, 1, 1.0, &[0.0]);
        b.uniform_partition();
        b.finish().unwrap()
    }

    #[test]
    fn test_policy_value_fixed_point() {
        let model = chain();
        let mut policy = Policy::new(2);
        policy.set(0, 0);
        policy.set(1, 0);
        let values = value_of_policy(&model, &policy, 1e-6).unwrap();
        assert!((values.get(0, 0) - 1.0).abs() < 1e-5);
        assert!(values.get(0, 1).abs() < 1e-9);
    }

    #[test]
    fn test_policy_value_of_idle_policy() {
        let model = chain();
        let mut policy = Policy::new(2);
        policy.set(0, 1);
        policy.set(1, 0);
        let values = value_of_policy(&model, &policy, 1e-6).unwrap();
        // Staying at state 0 earns nothing, ever.
        assert!(values.get(0, 0).abs() < 1e-9);
    }

    #[test]
    fn test_policy_must_use_enabled_actions() {
        let mut b = ModelBuilder::new(2, 2, 1, 0.5);
        b.add_transition(0, 0, 1, 1.0, &[1.0]);
        b.add_transition(1, 0, 1, 1.0, &[0.0]);
        b.uniform_partition();
        let model = b.finish().unwrap();
        let mut policy = Policy::new(2);
        policy.set(0, 1); // action 1 is disabled everywhere
        assert!(value_of_policy(&model, &policy, 1e-6).is_err());
    }

    #[test]
    fn test_single_objective_optimum() {
        let model = chain();
        let (v, policy) = solve_single_objective(&model, 0, 1e-6).unwrap();
        assert!((v[0] - 1.0).abs() < 1e-5);
        assert_eq!(policy.action(0), 0);
    }
}
