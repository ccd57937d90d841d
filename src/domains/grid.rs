//! Slip grid-world LMDP builder.
//!
//! An n×n grid with four movement actions and 0.8/0.1/0.1 slip: the intended
//! direction with probability 0.8, each lateral direction with 0.1. Moving
//! into a wall or a blocked cell stays put (the outcome mass folds onto the
//! current cell). Blocked cells are excluded from the state space entirely —
//! the index arena only holds open cells.
//!
//! Three reward factors:
//! - `REWARD_PENALTY`: −1 on entering the top-right corner (absorbing).
//! - `REWARD_GOAL`: +1 on entering the bottom-right corner (absorbing),
//!   step cost elsewhere.
//! - `REWARD_SIDE`: +1 on entering the bottom-left cell (not absorbing),
//!   step cost elsewhere.
//!
//! Absorbing corners self-loop with zero reward on every factor, so their
//! values are exactly zero at the fixed point.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SolveError;
use crate::model::ModelBuilder;
use crate::types::{LexModel, Policy};

pub const ACTION_NORTH: usize = 0;
pub const ACTION_SOUTH: usize = 1;
pub const ACTION_EAST: usize = 2;
pub const ACTION_WEST: usize = 3;
pub const GRID_ACTIONS: usize = 4;

pub const REWARD_PENALTY: usize = 0;
pub const REWARD_GOAL: usize = 1;
pub const REWARD_SIDE: usize = 2;
pub const GRID_REWARDS: usize = 3;

/// Which preference partition to attach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridPreference {
    /// One partition over all states, ordering (penalty, goal, side).
    Uniform,
    /// West half (x < n/2) orders (penalty, side, goal); east half orders
    /// (penalty, goal, side).
    Split,
}

/// Grid geometry plus the model parameters.
pub struct GridLmdp {
    pub size: usize,
    pub discount: f64,
    pub step_cost: f64,
    /// Lateral slip probability per side; forward gets `1 − 2·slip`.
    pub slip: f64,
    blocked: Vec<bool>,
    /// Dense state index per open cell, −1 for blocked.
    state_of_cell: Vec<i32>,
    /// State index → (x, y).
    cells: Vec<(usize, usize)>,
}

impl GridLmdp {
    /// An open n×n grid with the default parameters (γ = 0.9, −0.03 steps).
    pub fn open(size: usize) -> Self {
        Self::from_blocked(size, vec![false; size * size])
    }

    /// An n×n grid with `num_blocked` randomly chosen blocked interior
    /// cells drawn from a seeded generator.
    pub fn with_blocked(size: usize, num_blocked: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut blocked = vec![false; size * size];
        for _ in 0..num_blocked {
            let x = rng.gen_range(1..size - 1);
            let y = rng.gen_range(1..size - 1);
            blocked[y * size + x] = true;
        }
        Self::from_blocked(size, blocked)
    }

    fn from_blocked(size: usize, blocked: Vec<bool>) -> Self {
        assert!(size >= 2, "grid must be at least 2x2");
        let mut state_of_cell = vec![-1i32; size * size];
        let mut cells = Vec::new();
        for y in 0..size {
            for x in 0..size {
                if !blocked[y * size + x] {
                    state_of_cell[y * size + x] = cells.len() as i32;
                    cells.push((x, y));
                }
            }
        }
        GridLmdp {
            size,
            discount: 0.9,
            step_cost: -0.03,
            slip: 0.1,
            blocked,
            state_of_cell,
            cells,
        }
    }

    pub fn num_states(&self) -> usize {
        self.cells.len()
    }

    /// State index of the open cell at (x, y).
    pub fn state_at(&self, x: usize, y: usize) -> Option<usize> {
        let idx = self.state_of_cell[y * self.size + x];
        (idx >= 0).then_some(idx as usize)
    }

    /// (x, y) of a state index.
    pub fn cell_of(&self, s: usize) -> (usize, usize) {
        self.cells[s]
    }

    fn penalty_cell(&self) -> (usize, usize) {
        (self.size - 1, 0)
    }

    fn goal_cell(&self) -> (usize, usize) {
        (self.size - 1, self.size - 1)
    }

    fn side_cell(&self) -> (usize, usize) {
        (0, self.size - 1)
    }

    /// Destination of a deterministic step, staying put at walls and blocks.
    fn step(&self, x: usize, y: usize, dir: usize) -> (usize, usize) {
        let (nx, ny) = match dir {
            ACTION_NORTH => (x as i32, y as i32 - 1),
            ACTION_SOUTH => (x as i32, y as i32 + 1),
            ACTION_EAST => (x as i32 + 1, y as i32),
            ACTION_WEST => (x as i32 - 1, y as i32),
            _ => unreachable!("grid action {} out of range", dir),
        };
        let n = self.size as i32;
        if nx < 0 || ny < 0 || nx >= n || ny >= n || self.blocked[(ny * n + nx) as usize] {
            (x, y)
        } else {
            (nx as usize, ny as usize)
        }
    }

    /// Slip outcomes of an action: forward 1−2·slip, each lateral `slip`,
    /// merged by destination cell.
    fn outcomes(&self, x: usize, y: usize, dir: usize) -> Vec<((usize, usize), f64)> {
        let laterals = match dir {
            ACTION_NORTH | ACTION_SOUTH => [ACTION_EAST, ACTION_WEST],
            _ => [ACTION_NORTH, ACTION_SOUTH],
        };
        let mut merged: Vec<((usize, usize), f64)> = Vec::with_capacity(3);
        let mut push = |dest: (usize, usize), p: f64| {
            for entry in merged.iter_mut() {
                if entry.0 == dest {
                    entry.1 += p;
                    return;
                }
            }
            merged.push((dest, p));
        };
        push(self.step(x, y, dir), 1.0 - 2.0 * self.slip);
        push(self.step(x, y, laterals[0]), self.slip);
        push(self.step(x, y, laterals[1]), self.slip);
        merged
    }

    /// Build the three-reward LMDP with the chosen preference partition and
    /// slack vector.
    pub fn build(&self, slack: &[f64; GRID_REWARDS], pref: GridPreference) -> Result<LexModel, SolveError> {
        let penalty = self.penalty_cell();
        let goal = self.goal_cell();
        let side = self.side_cell();
        let reward_of = |dest: (usize, usize)| -> [f64; GRID_REWARDS] {
            [
                if dest == penalty { -1.0 } else { 0.0 },
                if dest == goal { 1.0 } else { self.step_cost },
                if dest == side { 1.0 } else { self.step_cost },
            ]
        };

        let mut b = ModelBuilder::new(self.num_states(), GRID_ACTIONS, GRID_REWARDS, self.discount);
        b.set_slack(slack);
        for (s, &(x, y)) in self.cells.iter().enumerate() {
            if (x, y) == penalty || (x, y) == goal {
                for a in 0..GRID_ACTIONS {
                    b.add_transition(s, a, s, 1.0, &[0.0; GRID_REWARDS]);
                }
                continue;
            }
            for a in 0..GRID_ACTIONS {
                for (dest, p) in self.outcomes(x, y, a) {
                    let succ = self
                        .state_at(dest.0, dest.1)
                        .expect("slip destinations are open cells");
                    b.add_transition(s, a, succ, p, &reward_of(dest));
                }
            }
        }

        match pref {
            GridPreference::Uniform => {
                b.add_partition(
                    (0..self.num_states() as u32).collect(),
                    vec![REWARD_PENALTY as u32, REWARD_GOAL as u32, REWARD_SIDE as u32],
                );
            }
            GridPreference::Split => {
                let half = self.size / 2;
                let mut west = Vec::new();
                let mut east = Vec::new();
                for (s, &(x, _)) in self.cells.iter().enumerate() {
                    if x < half {
                        west.push(s as u32);
                    } else {
                        east.push(s as u32);
                    }
                }
                b.add_partition(
                    west,
                    vec![REWARD_PENALTY as u32, REWARD_SIDE as u32, REWARD_GOAL as u32],
                );
                b.add_partition(
                    east,
                    vec![REWARD_PENALTY as u32, REWARD_GOAL as u32, REWARD_SIDE as u32],
                );
            }
        }
        b.finish()
    }

    /// Single-reward variant: only the bottom-right corner is absorbing,
    /// +1 on entering it, step cost elsewhere.
    pub fn build_single_reward(&self) -> Result<LexModel, SolveError> {
        let goal = self.goal_cell();
        let mut b = ModelBuilder::new(self.num_states(), GRID_ACTIONS, 1, self.discount);
        for (s, &(x, y)) in self.cells.iter().enumerate() {
            if (x, y) == goal {
                for a in 0..GRID_ACTIONS {
                    b.add_transition(s, a, s, 1.0, &[0.0]);
                }
                continue;
            }
            for a in 0..GRID_ACTIONS {
                for (dest, p) in self.outcomes(x, y, a) {
                    let succ = self
                        .state_at(dest.0, dest.1)
                        .expect("slip destinations are open cells");
                    let r = if dest == goal { 1.0 } else { self.step_cost };
                    b.add_transition(s, a, succ, p, &[r]);
                }
            }
        }
        b.uniform_partition();
        b.finish()
    }

    /// ASCII rendering of a policy: `+` goal, `-` penalty, `c` side goal,
    /// `x` blocked, arrows elsewhere.
    pub fn render_policy(&self, policy: &Policy) -> String {
        let mut out = String::new();
        for _ in 0..self.size + 2 {
            out.push_str(". ");
        }
        out.push('\n');
        for y in 0..self.size {
            out.push_str(". ");
            for x in 0..self.size {
                let c = if (x, y) == self.goal_cell() {
                    '+'
                } else if (x, y) == self.penalty_cell() {
                    '-'
                } else if (x, y) == self.side_cell() {
                    'c'
                } else if self.blocked[y * self.size + x] {
                    'x'
                } else {
                    let s = self.state_at(x, y).unwrap();
                    match policy.action(s) {
                        ACTION_NORTH => '^',
                        ACTION_SOUTH => 'v',
                        ACTION_EAST => '>',
                        ACTION_WEST => '<',
                        _ => '?',
                    }
                };
                out.push(c);
                out.push(' ');
            }
            out.push_str(".\n");
        }
        for _ in 0..self.size + 2 {
            out.push_str(". ");
        }
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_grid_states() {
        let grid = GridLmdp::open(5);
        assert_eq!(grid.num_states(), 25);
        assert_eq!(grid.state_at(0, 0), Some(0));
        assert_eq!(grid.cell_of(24), (4, 4));
    }

    #[test]
    fn test_blocked_cells_excluded() {
        let grid = GridLmdp::with_blocked(8, 6, 1);
        let blocked_count = grid.blocked.iter().filter(|&&b| b).count();
        assert!(blocked_count >= 1 && blocked_count <= 6);
        assert_eq!(grid.num_states(), 64 - blocked_count);
        // Corners are never blocked (interior draws only).
        assert!(grid.state_at(0, 0).is_some());
        assert!(grid.state_at(7, 7).is_some());
    }

    #[test]
    fn test_blocked_placement_is_seeded() {
        let a = GridLmdp::with_blocked(8, 6, 42);
        let b = GridLmdp::with_blocked(8, 6, 42);
        assert_eq!(a.blocked, b.blocked);
    }

    #[test]
    fn test_wall_mass_folds_onto_stay() {
        let grid = GridLmdp::open(4);
        // North from the top-left corner: forward and west hit walls.
        let outcomes = grid.outcomes(0, 0, ACTION_NORTH);
        let stay = outcomes.iter().find(|(d, _)| *d == (0, 0)).unwrap();
        assert!((stay.1 - 0.9).abs() < 1e-12);
        let total: f64 = outcomes.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_build_validates() {
        let grid = GridLmdp::open(5);
        let model = grid.build(&[0.0; 3], GridPreference::Split).unwrap();
        assert_eq!(model.num_states(), 25);
        assert_eq!(model.num_rewards(), 3);
        assert_eq!(model.num_partitions(), 2);
        let single = grid.build_single_reward().unwrap();
        assert_eq!(single.num_rewards(), 1);
    }
}
