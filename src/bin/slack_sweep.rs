//! Sweep the slack on the primary goal reward and report how the policy
//! shifts toward the side goal. Emits a JSON summary on stdout.
//!
//! Usage: `slack_sweep [size]` (default 10).

use serde::Serialize;

use lexmdp::domains::grid::{GridLmdp, GridPreference, ACTION_WEST, REWARD_GOAL};
use lexmdp::{env_config, solve};

#[derive(Serialize)]
struct SweepRow {
    /// Slack granted on the goal reward.
    delta_goal: f64,
    /// States whose action changed relative to the strict solve.
    changed_states: usize,
    /// States now heading west (toward the side goal).
    west_states: usize,
    /// Largest per-state loss on the goal reward vs the strict solve.
    max_goal_loss: f64,
}

fn main() {
    env_config::init_thread_pool();
    let config = env_config::solver_config_from_env();

    let size: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);
    let grid = GridLmdp::open(size);

    let strict = solve(
        &grid
            .build(&[0.0, 0.0, 0.0], GridPreference::Uniform)
            .expect("grid model is consistent"),
        &config,
    )
    .expect("strict solve failed");

    let mut rows = Vec::new();
    for delta_goal in [0.0, 0.25, 0.5, 1.0, 2.0, 5.0] {
        let model = grid
            .build(&[0.0, delta_goal, 0.0], GridPreference::Uniform)
            .expect("grid model is consistent");
        let solution = solve(&model, &config).expect("solve failed");

        let mut changed_states = 0;
        let mut west_states = 0;
        let mut max_goal_loss = 0.0f64;
        for s in 0..model.num_states() {
            if solution.policy.action(s) != strict.policy.action(s) {
                changed_states += 1;
            }
            if solution.policy.action(s) == ACTION_WEST {
                west_states += 1;
            }
            let loss = strict.values.get(REWARD_GOAL, s) - solution.values.get(REWARD_GOAL, s);
            max_goal_loss = max_goal_loss.max(loss);
        }
        eprintln!(
            "delta_goal={:<5} changed={:<4} west={:<4} max_goal_loss={:.4}",
            delta_goal, changed_states, west_states, max_goal_loss
        );
        rows.push(SweepRow {
            delta_goal,
            changed_states,
            west_states,
            max_goal_loss,
        });
    }

    println!("{}", serde_json::to_string_pretty(&rows).unwrap());
}
