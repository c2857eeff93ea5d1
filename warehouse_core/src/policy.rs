use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    Direction, Position, Slot,
    environment::{Action, WarehouseEnv},
    map::{Cell, Grid},
    storage::Station,
    transaction::Transaction,
};

/// Trait defining how actions are chosen for the environment.
/// Implementations see the whole environment read-only and answer with a flat action index.
pub trait Policy {
    /// Determines the next action index.
    /// `&mut self` allows the policy to keep internal state (e.g. a random generator).
    fn select_action(&mut self, env: &WarehouseEnv) -> usize;
}

/// Picks uniformly among all actions, valid or not.
#[derive(Debug)]
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomPolicy {
    /// Seeds from OS entropy.
    fn default() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl Policy for RandomPolicy {
    fn select_action(&mut self, env: &WarehouseEnv) -> usize {
        self.rng.random_range(0..env.action_space().len())
    }
}

/// A scripted expert that walks the shortest path to the next station and
/// loads or unloads the item the active transaction needs.
#[derive(Debug, Default)]
pub struct PlanningPolicy;

/// What the planner wants to do once it reaches one of `targets`.
struct Goal {
    targets: Vec<Position>,
    action: Action,
}

impl PlanningPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Returns manhattan distance between two positions
    fn manhattan_distance(a: Position, b: Position) -> usize {
        a.row.abs_diff(b.row) + a.col.abs_diff(b.col)
    }

    /// Converts a move between two adjacent positions into a direction
    fn position_to_direction(src: Position, dst: Position) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|direction| src.step(*direction) == Some(dst))
    }

    /// Picks the next station and operation for the current state.
    fn next_goal(&self, env: &WarehouseEnv) -> Option<Goal> {
        let agent = env.agent();
        let staging_out = env.staging_out();

        if let Some(item) = agent.carried_item() {
            let slot = item.slot();
            if staging_out.expects(slot) {
                return Some(Goal {
                    targets: staging_out.loading_positions().to_vec(),
                    action: Action::Unload(slot),
                });
            }
            // Prefer bins with room; capacity is only a soft limit.
            let with_room: Vec<Position> = env
                .bins()
                .iter()
                .filter(|b| b.len() < env.bin_slot_size())
                .flat_map(|b| b.loading_positions().iter().copied())
                .collect();
            let targets = if with_room.is_empty() {
                env.bins()
                    .iter()
                    .flat_map(|b| b.loading_positions().iter().copied())
                    .collect()
            } else {
                with_room
            };
            return Some(Goal {
                targets,
                action: Action::Unload(slot),
            });
        }

        match env.transaction()? {
            Transaction::Pick(_) => {
                let slot: Slot = *staging_out.incoming().first()?;
                let bin = env.bins().iter().find(|b| b.contains(slot))?;
                Some(Goal {
                    targets: bin.loading_positions().to_vec(),
                    action: Action::Load(slot),
                })
            }
            Transaction::Put(_) => {
                let staging_in = env.staging_in();
                let slot = staging_in.slots().next()?;
                Some(Goal {
                    targets: staging_in.loading_positions().to_vec(),
                    action: Action::Load(slot),
                })
            }
        }
    }

    /// A* pathfinding implementation
    fn a_star_path(start: Position, goal: Position, floor: &Grid<Cell>) -> Option<Vec<Position>> {
        // For priority queue
        #[derive(Clone, Eq, PartialEq)]
        struct PrioritizedItem {
            priority: usize,
            position: Position,
        }

        impl Ord for PrioritizedItem {
            fn cmp(&self, other: &Self) -> Ordering {
                // Reverse ordering for min-heap behavior
                other
                    .priority
                    .cmp(&self.priority)
                    .then_with(|| other.position.cmp(&self.position))
            }
        }

        impl PartialOrd for PrioritizedItem {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut frontier = BinaryHeap::new();
        let mut came_from: HashMap<Position, Position> = HashMap::new();
        let mut cost_so_far: HashMap<Position, usize> = HashMap::new();

        frontier.push(PrioritizedItem {
            priority: 0,
            position: start,
        });
        cost_so_far.insert(start, 0);

        let mut goal_reached = false;

        while let Some(PrioritizedItem {
            position: current, ..
        }) = frontier.pop()
        {
            if current == goal {
                goal_reached = true;
                break;
            }

            let current_cost = cost_so_far.get(&current).copied().unwrap_or(usize::MAX);
            for neighbor in Self::walkable_neighbors(current, floor) {
                let new_cost = current_cost.saturating_add(1);
                if cost_so_far
                    .get(&neighbor)
                    .is_none_or(|known| new_cost < *known)
                {
                    cost_so_far.insert(neighbor, new_cost);
                    let priority = new_cost + Self::manhattan_distance(neighbor, goal);
                    frontier.push(PrioritizedItem {
                        priority,
                        position: neighbor,
                    });
                    came_from.insert(neighbor, current);
                }
            }
        }

        if !goal_reached {
            return None;
        }

        // Reconstruct path
        let mut path = vec![goal];
        let mut current = goal;
        while current != start {
            current = *came_from.get(&current)?;
            path.push(current);
        }

        path.reverse();
        Some(path)
    }

    /// Gets the walkable cells next to a position
    fn walkable_neighbors(position: Position, floor: &Grid<Cell>) -> Vec<Position> {
        Direction::ALL
            .into_iter()
            .filter_map(|direction| position.step(direction))
            .filter(|neighbor| floor.is_walkable(*neighbor))
            .collect()
    }

    /// Plans to the nearest target from a list of positions
    fn plan_to_nearest_target(
        start: Position,
        targets: &[Position],
        floor: &Grid<Cell>,
    ) -> Option<Vec<Position>> {
        targets
            .iter()
            .filter_map(|target| Self::a_star_path(start, *target, floor))
            .min_by_key(Vec::len)
    }
}

impl Policy for PlanningPolicy {
    fn select_action(&mut self, env: &WarehouseEnv) -> usize {
        let space = env.action_space();
        // Nothing sensible to do: an upward move is at worst a penalised no-op.
        let fallback = Direction::Up.index();

        let Some(goal) = self.next_goal(env) else {
            return fallback;
        };
        let current = env.agent().position();
        if goal.targets.contains(&current) {
            return space.encode(goal.action).unwrap_or(fallback);
        }

        Self::plan_to_nearest_target(current, &goal.targets, env.floor())
            .and_then(|path| path.get(1).copied())
            .and_then(|next| Self::position_to_direction(current, next))
            .map_or(fallback, Direction::index)
    }
}
