//! Synthetic road-network LMDP builder.
//!
//! Nodes are intersections; directed roads carry a travel time and an
//! autonomy-capability flag. A state is (node, tiredness) with two driver
//! tiredness levels; traversing any road keeps the tiredness level with
//! probability 0.9 and raises it with 0.1 (the top level is sticky). Each
//! road offers a manual action and — where the road is capable — an
//! autonomy action with the same successor distribution.
//!
//! Two reward factors: `REWARD_TIME` pays the negative travel time (autonomy
//! drives conservatively and is slower by a fixed factor) and
//! `REWARD_AUTONOMY` pays +1 whenever autonomy drives. The preference
//! partition splits on the tiredness attribute: fresh drivers order
//! (time, autonomy), tired drivers order (autonomy, time).
//!
//! The goal node is absorbing with zero rewards. Map loading is a caller
//! concern; this builder only consumes an in-memory graph.

use crate::error::SolveError;
use crate::model::ModelBuilder;
use crate::types::LexModel;

pub const REWARD_TIME: usize = 0;
pub const REWARD_AUTONOMY: usize = 1;
pub const ROAD_REWARDS: usize = 2;

pub const MODE_MANUAL: usize = 0;
pub const MODE_AUTONOMY: usize = 1;

pub const TIREDNESS_LEVELS: usize = 2;
pub const FRESH: usize = 0;
pub const TIRED: usize = 1;

/// Probability of staying at the current tiredness level per traversal.
const STAY_FRESH: f64 = 0.9;

struct Road {
    to: usize,
    minutes: f64,
    autonomy_capable: bool,
}

/// Directed road graph with one goal node.
pub struct RoadNetwork {
    num_nodes: usize,
    goal: usize,
    pub discount: f64,
    /// Time multiplier when autonomy drives.
    pub autonomy_time_factor: f64,
    roads: Vec<Vec<Road>>,
}

impl RoadNetwork {
    pub fn new(num_nodes: usize, goal: usize) -> Self {
        assert!(goal < num_nodes, "goal node {} out of range", goal);
        RoadNetwork {
            num_nodes,
            goal,
            discount: 0.9,
            autonomy_time_factor: 1.25,
            roads: (0..num_nodes).map(|_| Vec::new()).collect(),
        }
    }

    /// Add a directed road. Call twice for a two-way street.
    pub fn add_road(&mut self, from: usize, to: usize, minutes: f64, autonomy_capable: bool) {
        debug_assert!(from < self.num_nodes && to < self.num_nodes);
        self.roads[from].push(Road {
            to,
            minutes,
            autonomy_capable,
        });
    }

    /// State index of (node, tiredness).
    pub fn state(&self, node: usize, tiredness: usize) -> usize {
        node * TIREDNESS_LEVELS + tiredness
    }

    /// Action index of (road slot, driving mode).
    pub fn action(slot: usize, mode: usize) -> usize {
        slot * 2 + mode
    }

    pub fn num_states(&self) -> usize {
        self.num_nodes * TIREDNESS_LEVELS
    }

    /// Build the two-reward LMDP with tiredness-based preference partitions.
    pub fn build(&self, slack: &[f64; ROAD_REWARDS]) -> Result<LexModel, SolveError> {
        let max_degree = self.roads.iter().map(|r| r.len()).max().unwrap_or(0);
        for (node, roads) in self.roads.iter().enumerate() {
            if node != self.goal && roads.is_empty() {
                return Err(SolveError::model(format!(
                    "node {} has no outgoing roads and is not the goal",
                    node
                )));
            }
        }
        let num_actions = (max_degree * 2).max(1);

        let mut b = ModelBuilder::new(self.num_states(), num_actions, ROAD_REWARDS, self.discount);
        b.set_slack(slack);

        let fresh_dist = [(FRESH, STAY_FRESH), (TIRED, 1.0 - STAY_FRESH)];
        let tired_dist = [(TIRED, 1.0)];
        for node in 0..self.num_nodes {
            for k in 0..TIREDNESS_LEVELS {
                let s = self.state(node, k);
                if node == self.goal {
                    b.add_transition(s, 0, s, 1.0, &[0.0; ROAD_REWARDS]);
                    continue;
                }
                for (slot, road) in self.roads[node].iter().enumerate() {
                    let succ_dist: &[(usize, f64)] = if k == TIRED {
                        &tired_dist
                    } else {
                        &fresh_dist
                    };
                    for &(mode, time, autonomy) in &[
                        (MODE_MANUAL, -road.minutes, 0.0),
                        (
                            MODE_AUTONOMY,
                            -road.minutes * self.autonomy_time_factor,
                            1.0,
                        ),
                    ] {
                        if mode == MODE_AUTONOMY && !road.autonomy_capable {
                            continue;
                        }
                        let a = Self::action(slot, mode);
                        for &(k2, p) in succ_dist {
                            b.add_transition(s, a, self.state(road.to, k2), p, &[time, autonomy]);
                        }
                    }
                }
            }
        }

        let fresh: Vec<u32> = (0..self.num_nodes)
            .map(|n| self.state(n, FRESH) as u32)
            .collect();
        let tired: Vec<u32> = (0..self.num_nodes)
            .map(|n| self.state(n, TIRED) as u32)
            .collect();
        b.add_partition(fresh, vec![REWARD_TIME as u32, REWARD_AUTONOMY as u32]);
        b.add_partition(tired, vec![REWARD_AUTONOMY as u32, REWARD_TIME as u32]);
        b.finish()
    }
}
