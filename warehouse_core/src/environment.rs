use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::{info, warn};
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    Direction, Position, Reward, Slot,
    agent::Agent,
    layout::{Layout, LayoutError},
    map::{Cell, Grid},
    observation::Observation,
    storage::{Bin, StagingError, StagingIn, StagingOut, Station},
    transaction::{Transaction, TransactionError, create_transaction},
};

const BLOCKED_CHANNEL: usize = 0;
const AGENT_CHANNEL: usize = 1;

/// Represents structural failures of the environment.
///
/// Invalid moves, loads and unloads are not errors: they are penalised through
/// the reward. These variants abort the current call instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("Action {action} is outside the action space of size {size}")]
    ActionOutOfRange { action: usize, size: usize },
    #[error("No active transaction; reset must be called before step")]
    NoActiveTransaction,
    #[error("A new transaction requires an empty-handed agent, but it carries item {slot}")]
    AgentCarrying { slot: Slot },
    #[error("A new transaction requires an empty Staging-Out, but {count} deliveries are pending")]
    StagingOutPending { count: usize },
    #[error("Transaction '{transaction}' does not fit the current occupancy: {reason}")]
    IncompatibleTransaction { transaction: String, reason: String },
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("Invalid action {action} changed the observation")]
    InvalidActionMutatedState { action: usize },
}

/// A decoded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Move(Direction),
    Load(Slot),
    Unload(Slot),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Move(direction) => write!(f, "Move{:?}", direction),
            Action::Load(slot) => write!(f, "Load({})", slot),
            Action::Unload(slot) => write!(f, "Unload({})", slot),
        }
    }
}

/// Flat discrete action space: four moves, then one load and one unload per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpace {
    max_items_in_env: usize,
}

impl ActionSpace {
    pub const MOVE_ACTIONS: usize = 4;

    pub fn new(max_items_in_env: usize) -> Self {
        ActionSpace { max_items_in_env }
    }

    pub fn len(&self) -> usize {
        Self::MOVE_ACTIONS + 2 * self.max_items_in_env
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn load_offset(&self) -> usize {
        Self::MOVE_ACTIONS
    }

    fn unload_offset(&self) -> usize {
        Self::MOVE_ACTIONS + self.max_items_in_env
    }

    pub fn decode(&self, action: usize) -> Option<Action> {
        if action < self.load_offset() {
            Direction::from_index(action).map(Action::Move)
        } else if action < self.unload_offset() {
            Some(Action::Load(action - self.load_offset() + 1))
        } else if action < self.len() {
            Some(Action::Unload(action - self.unload_offset() + 1))
        } else {
            None
        }
    }

    /// Returns `None` for slots outside `1..=max_items_in_env`.
    pub fn encode(&self, action: Action) -> Option<usize> {
        let slot_in_range = |slot: Slot| (1..=self.max_items_in_env).contains(&slot);
        match action {
            Action::Move(direction) => Some(direction.index()),
            Action::Load(slot) if slot_in_range(slot) => Some(self.load_offset() + slot - 1),
            Action::Unload(slot) if slot_in_range(slot) => Some(self.unload_offset() + slot - 1),
            _ => None,
        }
    }
}

/// How `reset` treats leftovers from the previous episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResetMode {
    /// Fail unless the agent is empty-handed and both staging areas are empty.
    #[default]
    Strict,
    /// Discard the carried item and anything left in the staging areas.
    Lenient,
}

/// The outcome of one step.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub observation: Observation,
    pub reward: Reward,
    pub done: bool,
    /// Always empty; kept for the usual step contract.
    pub info: BTreeMap<String, String>,
}

/// Read-only view handed to renderers.
#[derive(Debug, Clone, Copy)]
pub struct WarehouseView<'a> {
    pub agent: &'a Agent,
    pub bins: &'a [Bin],
    pub staging_in: &'a StagingIn,
    pub staging_out: &'a StagingOut,
    pub transaction: Option<&'a Transaction>,
}

/// The warehouse simulation: owns every entity and runs one episode per transaction.
#[derive(Debug, Clone)]
pub struct WarehouseEnv {
    height: usize,
    width: usize,
    bin_slot_size: usize,
    max_items_in_env: usize,
    action_space: ActionSpace,
    floor: Grid<Cell>,
    bins: Vec<Bin>,
    staging_in: StagingIn,
    staging_out: StagingOut,
    agent: Agent,
    transaction: Option<Transaction>,
    done: bool,
    delivered_item_count: usize,
    invalid_action_count: usize,
    rng: StdRng,
}

impl WarehouseEnv {
    /// Creates an environment whose transactions are drawn from OS entropy.
    pub fn new(layout: &Layout) -> Result<Self, EnvError> {
        Self::build(layout, StdRng::from_os_rng())
    }

    /// Creates an environment with reproducible transactions.
    pub fn with_seed(layout: &Layout, seed: u64) -> Result<Self, EnvError> {
        Self::build(layout, StdRng::seed_from_u64(seed))
    }

    fn build(layout: &Layout, rng: StdRng) -> Result<Self, EnvError> {
        layout.validate()?;
        let floor = layout.floor_plan()?;
        let max_items_in_env = layout.max_items_in_env();
        let bins = layout
            .bins
            .iter()
            .map(|b| Bin::new(b.position, b.loading.clone()))
            .collect();

        Ok(WarehouseEnv {
            height: layout.height,
            width: layout.width,
            bin_slot_size: layout.bin_slot_size,
            max_items_in_env,
            action_space: ActionSpace::new(max_items_in_env),
            floor,
            bins,
            staging_in: StagingIn::new(
                layout.staging_in.position,
                layout.staging_in.loading.clone(),
            ),
            staging_out: StagingOut::new(
                layout.staging_out.position,
                layout.staging_out.loading.clone(),
            ),
            agent: Agent::new(layout.agent_start),
            transaction: None,
            done: false,
            delivered_item_count: 0,
            invalid_action_count: 0,
            rng,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn bin_slot_size(&self) -> usize {
        self.bin_slot_size
    }

    pub fn max_items_in_env(&self) -> usize {
        self.max_items_in_env
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.action_space
    }

    /// Number of observation channels.
    ///
    /// The last channel is never written; it stays so the tensor width matches
    /// existing consumers.
    pub fn channel_count(&self) -> usize {
        3 + 2 * self.max_items_in_env
    }

    pub fn observation_shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channel_count())
    }

    pub fn floor(&self) -> &Grid<Cell> {
        &self.floor
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    pub fn staging_in(&self) -> &StagingIn {
        &self.staging_in
    }

    pub fn staging_out(&self) -> &StagingOut {
        &self.staging_out
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    /// True once the active transaction has been completed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Invalid actions since the last reset.
    pub fn invalid_action_count(&self) -> usize {
        self.invalid_action_count
    }

    /// Items moved by all completed transactions.
    pub fn delivered_item_count(&self) -> usize {
        self.delivered_item_count
    }

    pub fn view(&self) -> WarehouseView<'_> {
        WarehouseView {
            agent: &self.agent,
            bins: &self.bins,
            staging_in: &self.staging_in,
            staging_out: &self.staging_out,
            transaction: self.transaction.as_ref(),
        }
    }

    /// Starts a new episode with a freshly generated transaction.
    pub fn reset(&mut self, mode: ResetMode) -> Result<Observation, EnvError> {
        self.prepare_transaction(mode)?;
        let transaction = create_transaction(
            &mut self.rng,
            self.max_items_in_env,
            self.bin_slot_size,
            &self.bins,
        )?;
        self.install_transaction(transaction)
    }

    /// Starts a new episode with the given transaction instead of a generated one.
    pub fn apply_transaction(
        &mut self,
        transaction: Transaction,
        mode: ResetMode,
    ) -> Result<Observation, EnvError> {
        self.check_compatible(&transaction)?;
        self.prepare_transaction(mode)?;
        self.install_transaction(transaction)
    }

    fn prepare_transaction(&mut self, mode: ResetMode) -> Result<(), EnvError> {
        match mode {
            ResetMode::Strict => {
                if let Some(item) = self.agent.carried_item() {
                    return Err(EnvError::AgentCarrying { slot: item.slot() });
                }
                if !self.staging_in.is_empty() {
                    return Err(StagingError::StagingInOccupied {
                        count: self.staging_in.len(),
                    }
                    .into());
                }
                if !self.staging_out.incoming().is_empty() {
                    return Err(EnvError::StagingOutPending {
                        count: self.staging_out.incoming().len(),
                    });
                }
            }
            ResetMode::Lenient => {
                let dropped = self.agent.drop_item();
                let waiting = self.staging_in.discard_items();
                let pending = self.staging_out.discard_incoming();
                if dropped.is_some() || waiting > 0 || pending > 0 {
                    warn!(
                        "Lenient reset discarded carried item {:?}, {} waiting in Staging-In, {} owed to Staging-Out",
                        dropped.map(|item| item.slot()),
                        waiting,
                        pending
                    );
                }
            }
        }

        info!(
            "Reset called - invalid actions: {}",
            self.invalid_action_count
        );
        self.invalid_action_count = 0;
        self.staging_in.clear_transaction();
        self.staging_out.clear_transaction();
        self.transaction = None;
        self.done = false;
        Ok(())
    }

    fn check_compatible(&self, transaction: &Transaction) -> Result<(), EnvError> {
        let incompatible = |reason: String| EnvError::IncompatibleTransaction {
            transaction: transaction.to_string(),
            reason,
        };
        let slots = transaction.slots();
        let distinct: BTreeSet<Slot> = slots.iter().copied().collect();
        if slots.is_empty() {
            return Err(incompatible("no items".to_string()));
        }
        if distinct.len() != slots.len() {
            return Err(incompatible("duplicate slots".to_string()));
        }
        if slots.len() > self.bin_slot_size {
            return Err(incompatible(format!(
                "{} items exceed bin-slot-size {}",
                slots.len(),
                self.bin_slot_size
            )));
        }
        if let Transaction::Put(_) = transaction {
            let used: usize = self.bins.iter().map(Bin::len).sum();
            let free = self.max_items_in_env.saturating_sub(used);
            if slots.len() > free {
                return Err(incompatible(format!(
                    "{} items exceed the {} free places",
                    slots.len(),
                    free
                )));
            }
        }
        for slot in slots {
            let stored = self.bins.iter().any(|b| b.contains(slot));
            match transaction {
                Transaction::Pick(_) if !stored => {
                    return Err(incompatible(format!("slot {} is not stored", slot)));
                }
                Transaction::Put(_) if stored => {
                    return Err(incompatible(format!("slot {} is already stored", slot)));
                }
                Transaction::Put(_) if !(1..=self.max_items_in_env).contains(&slot) => {
                    return Err(incompatible(format!("slot {} is out of range", slot)));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn install_transaction(&mut self, transaction: Transaction) -> Result<Observation, EnvError> {
        match &transaction {
            Transaction::Pick(pick) => self.staging_out.apply_pick(pick),
            Transaction::Put(put) => self.staging_in.apply_put(put)?,
        }
        info!("New transaction: {}", transaction);
        self.transaction = Some(transaction);
        Ok(self.observation())
    }

    /// Executes one action.
    ///
    /// An action earning a negative reward leaves the observation unchanged.
    pub fn step(&mut self, action: usize) -> Result<Step, EnvError> {
        let decoded = self
            .action_space
            .decode(action)
            .ok_or(EnvError::ActionOutOfRange {
                action,
                size: self.action_space.len(),
            })?;
        if self.transaction.is_none() {
            return Err(EnvError::NoActiveTransaction);
        }

        let before = self.observation();
        let reward = match decoded {
            Action::Move(direction) => self.agent.move_in(direction, &self.floor),
            Action::Load(slot) => self.agent.load_item(
                &mut self.bins,
                &mut self.staging_in,
                &self.staging_out,
                slot,
            ),
            Action::Unload(slot) => self.agent.unload_item(
                &mut self.bins,
                &self.staging_in,
                &mut self.staging_out,
                slot,
            ),
        };
        let observation = self.observation();

        if reward < 0.0 {
            self.record_invalid_action(action, &before, &observation)?;
        }

        let done = self.update_done();
        Ok(Step {
            observation,
            reward,
            done,
            info: BTreeMap::new(),
        })
    }

    /// Counts a penalised action, which must not have changed the observation.
    fn record_invalid_action(
        &mut self,
        action: usize,
        before: &Observation,
        after: &Observation,
    ) -> Result<(), EnvError> {
        if before != after {
            return Err(EnvError::InvalidActionMutatedState { action });
        }
        self.invalid_action_count += 1;
        Ok(())
    }

    /// Latches completion of the active transaction.
    fn update_done(&mut self) -> bool {
        if self.done {
            return true;
        }
        let Some(transaction) = &self.transaction else {
            return false;
        };
        let done = match transaction {
            Transaction::Pick(_) => self.staging_out.is_transaction_done(),
            Transaction::Put(_) => self.staging_in.is_transaction_done(&self.bins),
        };
        if done {
            info!("Transaction completed: {}", transaction);
            self.delivered_item_count += transaction.len();
            self.done = true;
        }
        done
    }

    fn slot_channel(&self, slot: Slot) -> usize {
        self.max_items_in_env + 1 + slot
    }

    /// Encodes the current state.
    ///
    /// Channel 0 marks blocked cells, channel 1 the agent and channel `1 + slot`
    /// the carried item. Channel `max_items_in_env + 1 + slot` holds +1 at the
    /// loading positions of the station storing `slot` and -1 where the slot is
    /// expected: at every bin for an active put, at Staging-Out for an owed pick.
    pub fn observation(&self) -> Observation {
        let mut obs = Observation::zeros(self.height, self.width, self.channel_count());

        for position in self.floor.blocked_positions() {
            obs.set(position, BLOCKED_CHANNEL, 1);
        }

        let agent_position = self.agent.position();
        obs.set(agent_position, AGENT_CHANNEL, 1);
        if let Some(item) = self.agent.carried_item() {
            obs.set(agent_position, AGENT_CHANNEL + item.slot(), 1);
        }

        let put = self.staging_in.transaction();
        for bin in &self.bins {
            mark(&mut obs, bin, bin.slots().map(|s| self.slot_channel(s)), 1);
            if let Some(put) = put {
                mark(&mut obs, bin, put.slots().map(|s| self.slot_channel(s)), -1);
            }
        }

        let staging_in = &self.staging_in;
        mark(
            &mut obs,
            staging_in,
            staging_in.slots().map(|s| self.slot_channel(s)),
            1,
        );

        let staging_out = &self.staging_out;
        mark(
            &mut obs,
            staging_out,
            staging_out.incoming().iter().map(|s| self.slot_channel(*s)),
            -1,
        );

        obs
    }
}

/// Writes `value` into each channel at every loading position of `station`.
fn mark<S: Station>(
    obs: &mut Observation,
    station: &S,
    channels: impl Iterator<Item = usize>,
    value: i8,
) {
    for channel in channels {
        for position in station.loading_positions() {
            obs.set(*position, channel, value);
        }
    }
}

/// Slot identities found in the bins, Staging-In and the agent's hands, in that order.
///
/// Each identity appears at most once in a consistent state.
pub fn stored_slots(view: &WarehouseView<'_>) -> Vec<(Slot, Position)> {
    let mut slots: Vec<(Slot, Position)> = Vec::new();
    for bin in view.bins {
        slots.extend(bin.slots().map(|slot| (slot, bin.position())));
    }
    slots.extend(
        view.staging_in
            .slots()
            .map(|slot| (slot, view.staging_in.position())),
    );
    if let Some(item) = view.agent.carried_item() {
        slots.push((item.slot(), view.agent.position()));
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GOOD_ACTION, INVALID_ACTION, NEUTRAL_ACTION, item::Item};
    use rand::Rng;

    fn layout() -> Layout {
        Layout::from_toml_str(include_str!("../../layouts/three_bins.toml")).unwrap()
    }

    fn env() -> WarehouseEnv {
        WarehouseEnv::with_seed(&layout(), 17).unwrap()
    }

    fn act(env: &mut WarehouseEnv, action: Action) -> Step {
        let index = env.action_space().encode(action).unwrap();
        env.step(index).unwrap()
    }

    fn walk(env: &mut WarehouseEnv, moves: &[Direction]) {
        for direction in moves {
            let step = act(env, Action::Move(*direction));
            assert_eq!(step.reward, NEUTRAL_ACTION, "blocked moving {:?}", direction);
        }
    }

    #[test]
    fn action_space_has_moves_loads_and_unloads() {
        let env = env();
        let space = env.action_space();
        assert_eq!(env.max_items_in_env(), 12);
        assert_eq!(space.len(), 28);
        assert_eq!(space.decode(0), Some(Action::Move(Direction::Up)));
        assert_eq!(space.decode(3), Some(Action::Move(Direction::Right)));
        assert_eq!(space.decode(4), Some(Action::Load(1)));
        assert_eq!(space.decode(15), Some(Action::Load(12)));
        assert_eq!(space.decode(16), Some(Action::Unload(1)));
        assert_eq!(space.decode(27), Some(Action::Unload(12)));
        assert_eq!(space.decode(28), None);
        assert_eq!(space.encode(Action::Unload(13)), None);
        assert_eq!(space.encode(Action::Load(0)), None);
        for index in 0..space.len() {
            assert_eq!(space.encode(space.decode(index).unwrap()), Some(index));
        }
    }

    #[test]
    fn observation_has_reserved_trailing_channel() {
        let mut env = env();
        let obs = env.reset(ResetMode::Strict).unwrap();
        assert_eq!(obs.shape(), (5, 7, 27));
        assert!(obs.nonzero_in_channel(26).is_empty());
        assert_eq!(
            obs.nonzero_in_channel(BLOCKED_CHANNEL).len(),
            env.floor().blocked_positions().count()
        );
        assert_eq!(
            obs.nonzero_in_channel(AGENT_CHANNEL),
            vec![(Position::new(4, 3), 1)]
        );
    }

    #[test]
    fn step_before_reset_is_rejected() {
        let mut env = env();
        assert_eq!(env.step(0), Err(EnvError::NoActiveTransaction));
    }

    #[test]
    fn out_of_range_action_is_rejected() {
        let mut env = env();
        env.reset(ResetMode::Strict).unwrap();
        assert_eq!(
            env.step(28),
            Err(EnvError::ActionOutOfRange {
                action: 28,
                size: 28
            })
        );
    }

    #[test]
    fn invalid_action_leaves_observation_unchanged() {
        let mut env = env();
        let before = env.reset(ResetMode::Strict).unwrap();

        // agent starts on the bottom row
        let step = act(&mut env, Action::Move(Direction::Down));
        assert_eq!(step.reward, INVALID_ACTION);
        assert_eq!(step.observation, before);

        let step = act(&mut env, Action::Unload(1));
        assert_eq!(step.reward, INVALID_ACTION);
        assert_eq!(step.observation, before);
        assert_eq!(env.invalid_action_count(), 2);

        // the first transaction on an empty warehouse is a put still waiting in Staging-In
        env.reset(ResetMode::Lenient).unwrap();
        assert_eq!(env.invalid_action_count(), 0);
    }

    #[test]
    fn pick_completes_on_second_delivery_and_stays_done() {
        let mut env = env();
        env.bins[0].place_item(Item::new(3));
        env.bins[1].place_item(Item::new(7));
        env.agent = Agent::new(Position::new(1, 1));
        let obs = env
            .apply_transaction(Transaction::pick(vec![3, 7]), ResetMode::Strict)
            .unwrap();
        assert_eq!(
            obs.nonzero_in_channel(env.slot_channel(3)),
            vec![
                (Position::new(1, 1), 1),
                (Position::new(3, 0), -1),
                (Position::new(3, 1), 1),
                (Position::new(4, 1), -1),
            ]
        );

        let step = act(&mut env, Action::Load(3));
        assert_eq!(step.reward, NEUTRAL_ACTION);
        assert_eq!(step.observation.get(Position::new(1, 1), 1 + 3), Some(1));
        walk(&mut env, &[Direction::Left, Direction::Down, Direction::Down]);
        let step = act(&mut env, Action::Unload(3));
        assert_eq!(step.reward, GOOD_ACTION);
        assert!(!step.done);

        walk(&mut env, &[Direction::Right, Direction::Right, Direction::Right]);
        let step = act(&mut env, Action::Load(7));
        assert_eq!(step.reward, NEUTRAL_ACTION);
        walk(&mut env, &[Direction::Left, Direction::Left, Direction::Left]);
        let step = act(&mut env, Action::Unload(7));
        assert_eq!(step.reward, GOOD_ACTION);
        assert!(step.done);
        assert_eq!(env.delivered_item_count(), 2);

        let step = act(&mut env, Action::Move(Direction::Left));
        assert_eq!(step.reward, INVALID_ACTION);
        assert!(step.done);
        assert_eq!(env.delivered_item_count(), 2);
        assert!(env.bins().iter().all(Bin::is_empty));
    }

    #[test]
    fn put_completes_once_every_item_is_binned() {
        let mut env = env();
        env.agent = Agent::new(Position::new(1, 6));
        let obs = env
            .apply_transaction(Transaction::put([2, 5]), ResetMode::Strict)
            .unwrap();
        assert_eq!(obs.get(Position::new(1, 6), env.slot_channel(2)), Some(1));
        assert_eq!(obs.get(Position::new(0, 5), env.slot_channel(5)), Some(1));
        assert_eq!(obs.get(Position::new(3, 1), env.slot_channel(5)), Some(-1));

        let step = act(&mut env, Action::Load(2));
        assert_eq!(step.reward, GOOD_ACTION);
        walk(&mut env, &[Direction::Left]);
        let step = act(&mut env, Action::Unload(2));
        assert_eq!(step.reward, GOOD_ACTION);
        assert!(!step.done);
        assert!(env.bins()[2].contains(2));

        walk(&mut env, &[Direction::Right]);
        let step = act(&mut env, Action::Load(5));
        assert_eq!(step.reward, GOOD_ACTION);
        walk(&mut env, &[Direction::Left]);
        let step = act(&mut env, Action::Unload(5));
        assert_eq!(step.reward, GOOD_ACTION);
        assert!(step.done);
        assert_eq!(env.delivered_item_count(), 2);

        // taking an item back out does not reopen the episode
        let step = act(&mut env, Action::Load(5));
        assert_eq!(step.reward, NEUTRAL_ACTION);
        assert!(step.done);
    }

    #[test]
    fn first_removal_bonus_is_not_repeated() {
        let mut env = env();
        env.bins[0].place_item(Item::new(3));
        env.agent = Agent::new(Position::new(1, 1));
        env.apply_transaction(Transaction::pick(vec![3]), ResetMode::Strict)
            .unwrap();

        let step = act(&mut env, Action::Load(3));
        assert_eq!(step.reward, NEUTRAL_ACTION);
        assert!(
            env.agent()
                .carried_item()
                .unwrap()
                .first_remove_from_bin_rewarded()
        );

        let step = act(&mut env, Action::Unload(3));
        assert_eq!(step.reward, NEUTRAL_ACTION);
        let step = act(&mut env, Action::Load(3));
        assert_eq!(step.reward, NEUTRAL_ACTION);
        assert!(
            env.agent()
                .carried_item()
                .unwrap()
                .first_remove_from_bin_rewarded()
        );
    }

    #[test]
    fn strict_reset_requires_empty_hands() {
        let mut env = env();
        env.bins[0].place_item(Item::new(3));
        env.agent = Agent::new(Position::new(1, 1));
        env.apply_transaction(Transaction::pick(vec![3]), ResetMode::Strict)
            .unwrap();
        act(&mut env, Action::Load(3));

        assert_eq!(
            env.reset(ResetMode::Strict),
            Err(EnvError::AgentCarrying { slot: 3 })
        );
        assert!(env.transaction().is_some());

        env.reset(ResetMode::Lenient).unwrap();
        assert!(env.agent().is_empty_handed());
        assert!(env.transaction().is_some());
        assert!(!env.is_done());
    }

    #[test]
    fn strict_reset_requires_empty_staging() {
        let mut env = env();
        env.apply_transaction(Transaction::put([1, 2]), ResetMode::Strict)
            .unwrap();
        assert_eq!(
            env.reset(ResetMode::Strict),
            Err(EnvError::Staging(StagingError::StagingInOccupied { count: 2 }))
        );

        env.reset(ResetMode::Lenient).unwrap();
        env.bins[1].place_item(Item::new(4));
        env.apply_transaction(Transaction::pick(vec![4]), ResetMode::Lenient)
            .unwrap();
        assert_eq!(
            env.reset(ResetMode::Strict),
            Err(EnvError::StagingOutPending { count: 1 })
        );
    }

    #[test]
    fn incompatible_transactions_are_rejected() {
        let mut env = env();
        env.bins[0].place_item(Item::new(3));
        assert!(matches!(
            env.apply_transaction(Transaction::put([3]), ResetMode::Strict),
            Err(EnvError::IncompatibleTransaction { .. })
        ));
        assert!(matches!(
            env.apply_transaction(Transaction::pick(vec![4]), ResetMode::Strict),
            Err(EnvError::IncompatibleTransaction { .. })
        ));
        assert!(matches!(
            env.apply_transaction(Transaction::put([13]), ResetMode::Strict),
            Err(EnvError::IncompatibleTransaction { .. })
        ));
    }

    #[test]
    fn transactions_are_bounded_by_capacity() {
        let mut env = env();
        for slot in 1..=10 {
            env.bins[slot % 3].place_item(Item::new(slot));
        }

        // bin-slot-size is 4
        let err = env
            .apply_transaction(Transaction::pick(vec![1, 2, 3, 4, 5]), ResetMode::Strict)
            .unwrap_err();
        assert!(
            matches!(&err, EnvError::IncompatibleTransaction { reason, .. } if reason.contains("bin-slot-size")),
            "{err}"
        );

        // 10 of 12 places are used
        let err = env
            .apply_transaction(Transaction::put([11, 12, 13]), ResetMode::Strict)
            .unwrap_err();
        assert!(
            matches!(&err, EnvError::IncompatibleTransaction { reason, .. } if reason.contains("free places")),
            "{err}"
        );
        assert!(env.transaction().is_none());
        assert!(env.staging_in().is_empty());

        env.apply_transaction(Transaction::put([11, 12]), ResetMode::Strict)
            .unwrap();
        assert_eq!(env.staging_in().len(), 2);
    }

    #[test]
    fn mutating_invalid_action_is_reported_without_counting() {
        let mut env = env();
        env.reset(ResetMode::Strict).unwrap();
        let before = env.observation();
        let mut after = before.clone();
        after.set(Position::new(0, 0), AGENT_CHANNEL, 1);

        assert_eq!(
            env.record_invalid_action(7, &before, &after),
            Err(EnvError::InvalidActionMutatedState { action: 7 })
        );
        assert_eq!(env.invalid_action_count(), 0);

        env.record_invalid_action(7, &before, &before).unwrap();
        assert_eq!(env.invalid_action_count(), 1);
    }

    #[test]
    fn blocked_channel_is_constant_over_an_episode() {
        let mut env = env();
        let initial = env.reset(ResetMode::Strict).unwrap();
        let blocked = initial.nonzero_in_channel(BLOCKED_CHANNEL);
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..500 {
            let action = rng.random_range(0..env.action_space().len());
            let step = env.step(action).unwrap();
            assert_eq!(step.observation.nonzero_in_channel(BLOCKED_CHANNEL), blocked);
            assert!(step.observation.nonzero_in_channel(26).is_empty());
            if step.done {
                env.reset(ResetMode::Lenient).unwrap();
            }
        }
    }

    #[test]
    fn view_exposes_render_objects() {
        let mut env = env();
        env.reset(ResetMode::Strict).unwrap();
        let view = env.view();
        assert_eq!(view.bins.len(), 3);
        assert_eq!(view.transaction, env.transaction());
        assert_eq!(view.agent.position(), Position::new(4, 3));

        let stored = stored_slots(&view);
        let expected = view.staging_in.len();
        assert_eq!(stored.len(), expected);
    }
}
