//! Build a grid-world LMDP, solve it, and print the policy map.
//!
//! Usage: `grid_demo [size] [num_blocked] [seed]` (defaults: 10, 0, 1).

use std::time::Instant;

use lexmdp::domains::grid::{GridLmdp, GridPreference, REWARD_GOAL, REWARD_PENALTY, REWARD_SIDE};
use lexmdp::{env_config, solve, value_of_policy};

fn main() {
    if let Some(threads) = env_config::init_thread_pool() {
        println!("Rayon threads: {}", threads);
    }

    let mut args = std::env::args().skip(1);
    let size: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(10);
    let num_blocked: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let seed: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(1);

    let grid = if num_blocked > 0 {
        GridLmdp::with_blocked(size, num_blocked, seed)
    } else {
        GridLmdp::open(size)
    };
    println!(
        "Grid {}x{} ({} states, {} blocked)",
        size,
        grid.num_states(),
        size * size - grid.num_states(),
        num_blocked
    );

    let model = grid
        .build(&[0.0, 0.0, 0.0], GridPreference::Split)
        .expect("grid model is consistent");

    let mut config = env_config::solver_config_from_env();
    config.trace = true;
    let start = Instant::now();
    let solution = solve(&model, &config).expect("solve failed");
    println!(
        "Converged in {} outer sweeps ({:.2} ms, residual {:.3e})",
        solution.iterations,
        start.elapsed().as_secs_f64() * 1000.0,
        solution.residual
    );

    println!("\nPolicy (west half heads for 'c', east half for '+'):");
    print!("{}", grid.render_policy(&solution.policy));

    let on_policy = value_of_policy(&model, &solution.policy, 1e-4).expect("evaluation failed");
    let start_state = grid.state_at(0, 0).expect("origin is open");
    println!(
        "On-policy value at (0,0): penalty {:.4}  goal {:.4}  side {:.4}",
        on_policy.get(REWARD_PENALTY, start_state),
        on_policy.get(REWARD_GOAL, start_state),
        on_policy.get(REWARD_SIDE, start_state),
    );
}
