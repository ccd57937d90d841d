//! Property-based tests: pruning invariants, randomized model solves, and
//! structural checks that hold for any consistent model.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lexmdp::bellman::{prune_q, slack_threshold, tie_threshold};
use lexmdp::model::ROW_SUM_TOLERANCE;
use lexmdp::{solve, solve_single_objective, LexModel, ModelBuilder, SolverConfig};

/// Build a random but consistent single-partition model from a seed.
fn random_model(seed: u64, num_states: usize, num_actions: usize, num_rewards: usize, discount: f64) -> LexModel {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut b = ModelBuilder::new(num_states, num_actions, num_rewards, discount);
    let mut rewards = vec![0.0; num_rewards];
    for s in 0..num_states {
        for a in 0..num_actions {
            let degree = rng.gen_range(1..=num_states.min(3));
            let mut succs: Vec<usize> = Vec::new();
            while succs.len() < degree {
                let sp = rng.gen_range(0..num_states);
                if !succs.contains(&sp) {
                    succs.push(sp);
                }
            }
            let weights: Vec<f64> = (0..degree).map(|_| rng.gen_range(0.1..1.0)).collect();
            let total: f64 = weights.iter().sum();
            for (&sp, &w) in succs.iter().zip(weights.iter()) {
                for r in rewards.iter_mut() {
                    *r = rng.gen_range(-1.0..1.0);
                }
                b.add_transition(s, a, sp, w / total, &rewards);
            }
        }
    }
    b.uniform_partition();
    b.finish().expect("random model is consistent")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Pruning keeps the maximum, preserves order, and returns a subset.
    #[test]
    fn prune_keeps_max_and_order(
        qs in prop::collection::vec(-10.0f64..10.0, 1..8),
        threshold in 0.0f64..1.0,
    ) {
        let actions: Vec<u32> = (0..qs.len() as u32).collect();
        let mut out = Vec::new();
        prune_q(&qs, &actions, threshold, &mut out);

        prop_assert!(!out.is_empty());
        // Subset, in input order.
        let mut last = None;
        for &a in &out {
            prop_assert!((a as usize) < qs.len());
            if let Some(prev) = last {
                prop_assert!(a > prev);
            }
            last = Some(a);
        }
        // The argmax always survives.
        let max = qs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let argmax = qs.iter().position(|&q| q == max).unwrap() as u32;
        prop_assert!(out.contains(&argmax));
        // Everything kept is within the threshold of the maximum.
        for &a in &out {
            prop_assert!((max - qs[a as usize]).abs() <= threshold);
        }
    }

    // Widening the threshold never shrinks the kept set.
    #[test]
    fn prune_is_monotone_in_threshold(
        qs in prop::collection::vec(-10.0f64..10.0, 1..8),
        t1 in 0.0f64..0.5,
        extra in 0.0f64..0.5,
    ) {
        let actions: Vec<u32> = (0..qs.len() as u32).collect();
        let mut narrow = Vec::new();
        let mut wide = Vec::new();
        prune_q(&qs, &actions, t1, &mut narrow);
        prune_q(&qs, &actions, t1 + extra, &mut wide);
        for a in &narrow {
            prop_assert!(wide.contains(a));
        }
    }

    // The slack threshold collapses to the machine-scale tie threshold at
    // δ = 0 and grows linearly in δ.
    #[test]
    fn slack_threshold_shape(gamma in 0.1f64..0.99, delta in 0.0f64..10.0) {
        prop_assert_eq!(slack_threshold(gamma, 0.0), tie_threshold());
        let eta = slack_threshold(gamma, delta);
        prop_assert!(eta >= tie_threshold());
        prop_assert!((eta - (1.0 - gamma) * delta - tie_threshold()).abs() < 1e-12);
    }

    // Random consistent models: transition rows sum to one, two solves are
    // bit-identical, the policy uses enabled actions, and the first layer
    // matches the single-objective optimum.
    #[test]
    fn random_model_solve_properties(
        seed in any::<u64>(),
        num_states in 2usize..6,
        num_actions in 1usize..4,
        num_rewards in 1usize..4,
        discount in 0.3f64..0.95,
    ) {
        let model = random_model(seed, num_states, num_actions, num_rewards, discount);

        for s in 0..num_states {
            for a in 0..num_actions {
                let total: f64 = model.successors(s, a).map(|(_, p)| p).sum();
                prop_assert!((total - 1.0).abs() <= ROW_SUM_TOLERANCE);
            }
        }

        let first = solve(&model, &SolverConfig::default()).unwrap();
        let second = solve(&model, &SolverConfig::default()).unwrap();
        prop_assert_eq!(&first.policy, &second.policy);
        prop_assert_eq!(first.values.as_slice(), second.values.as_slice());

        for s in 0..num_states {
            let a = first.policy.action(s) as u32;
            prop_assert!(model.actions_for(s).contains(&a));
        }

        // The ordering is the identity, so factor 0 is optimized over the
        // full action set; its values match plain value iteration.
        let (v_star, _) = solve_single_objective(&model, 0, 1e-3).unwrap();
        for s in 0..num_states {
            prop_assert!(
                (first.values.get(0, s) - v_star[s]).abs() < 1e-2,
                "state {}: {} vs {}", s, first.values.get(0, s), v_star[s]
            );
        }
    }

    // The looping variant lands on the same fixed point.
    #[test]
    fn random_model_looping_agrees(seed in any::<u64>()) {
        let model = random_model(seed, 4, 2, 2, 0.8);
        let single = solve(&model, &SolverConfig::default()).unwrap();
        let looping = solve(
            &model,
            &SolverConfig { looping: true, ..SolverConfig::default() },
        )
        .unwrap();
        for i in 0..2 {
            for s in 0..4 {
                prop_assert!(
                    (single.values.get(i, s) - looping.values.get(i, s)).abs() < 2e-2,
                    "factor {} state {}", i, s
                );
            }
        }
    }
}
