use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    Direction, GOOD_ACTION, INVALID_ACTION, NEUTRAL_ACTION, Position, Reward, Slot,
    item::Item,
    map::{Cell, Grid},
    storage::{Bin, StagingIn, StagingOut, Station},
};

/// The warehouse worker: a position and at most one carried item.
///
/// Every operation returns the reward for the attempt. An attempt that earns
/// [`INVALID_ACTION`] leaves the agent and all containers untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    position: Position,
    carried_item: Option<Item>,
}

impl Agent {
    pub fn new(position: Position) -> Self {
        Agent {
            position,
            carried_item: None,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn carried_item(&self) -> Option<&Item> {
        self.carried_item.as_ref()
    }

    pub fn is_empty_handed(&self) -> bool {
        self.carried_item.is_none()
    }

    /// Gives up the carried item, if any.
    pub(crate) fn drop_item(&mut self) -> Option<Item> {
        self.carried_item.take()
    }

    /// Moves one cell in `direction` unless the target is off the grid or blocked.
    pub fn move_in(&mut self, direction: Direction, floor: &Grid<Cell>) -> Reward {
        match self.position.step(direction) {
            Some(target) if floor.is_walkable(target) => {
                self.position = target;
                NEUTRAL_ACTION
            }
            _ => INVALID_ACTION,
        }
    }

    /// Picks up the item stored under `slot` from a bin or Staging-In next to the agent.
    ///
    /// Bins are searched first, in their fixed order.
    pub fn load_item(
        &mut self,
        bins: &mut [Bin],
        staging_in: &mut StagingIn,
        staging_out: &StagingOut,
        slot: Slot,
    ) -> Reward {
        if self.carried_item.is_some() {
            return INVALID_ACTION;
        }

        let position = self.position;
        if let Some(bin) = bins
            .iter_mut()
            .find(|b| b.is_loading_position(position) && b.contains(slot))
        {
            let Some(mut item) = bin.remove_item(slot) else {
                return INVALID_ACTION;
            };
            let requested = staging_out
                .transaction()
                .is_some_and(|pick| pick.contains(item.slot()));
            if requested && item.claim_first_remove_from_bin() {
                debug!("Item {} removed from a bin for the first time", item);
            }
            self.carried_item = Some(item);
            // A positive bonus for the first removal destabilises training.
            return NEUTRAL_ACTION;
        }

        if staging_in.is_loading_position(position) {
            if let Some(item) = staging_in.remove_item(slot) {
                debug!("Item {} taken from Staging-In", item);
                self.carried_item = Some(item);
                return GOOD_ACTION;
            }
        }

        INVALID_ACTION
    }

    /// Puts the carried item down into a bin or delivers it to Staging-Out.
    ///
    /// A bin only accepts the unload when `slot` names the carried item; bins are
    /// searched first, in their fixed order. Staging-Out accepts any owed `slot`
    /// and takes whatever the agent carries.
    pub fn unload_item(
        &mut self,
        bins: &mut [Bin],
        staging_in: &StagingIn,
        staging_out: &mut StagingOut,
        slot: Slot,
    ) -> Reward {
        let Some(carried) = self.carried_item.as_ref() else {
            return INVALID_ACTION;
        };

        let position = self.position;
        let bin = if carried.slot() == slot {
            bins.iter_mut().find(|b| b.is_loading_position(position))
        } else {
            None
        };
        if let Some(bin) = bin {
            let Some(mut item) = self.carried_item.take() else {
                return INVALID_ACTION;
            };
            let requested = staging_in
                .transaction()
                .is_some_and(|put| put.contains(item.slot()));
            let first_placement = requested && item.claim_first_place_in_bin();
            bin.place_item(item);
            if first_placement {
                debug!("Item {} placed in a bin for the first time", slot);
                return GOOD_ACTION;
            }
            return NEUTRAL_ACTION;
        }

        if staging_out.is_loading_position(position) && staging_out.receive(slot) {
            if let Some(item) = self.carried_item.take() {
                debug!("Slot {} delivered to Staging-Out, agent gave up item {}", slot, item);
            }
            return GOOD_ACTION;
        }

        INVALID_ACTION
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.carried_item {
            Some(item) => write!(f, "Agent at {} with Item {}", self.position, item),
            None => write!(f, "Agent at {} with no Item", self.position),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{PickTransaction, Transaction};

    // 3x3 floor: bin at (0, 0), Staging-In at (0, 2), Staging-Out at (2, 2).
    struct Fixture {
        floor: Grid<Cell>,
        bins: Vec<Bin>,
        staging_in: StagingIn,
        staging_out: StagingOut,
    }

    fn fixture() -> Fixture {
        let mut floor: Grid<Cell> = Grid::new(3, 3);
        floor[Position::new(0, 0)] = Cell::Bin(0);
        floor[Position::new(0, 2)] = Cell::StagingIn;
        floor[Position::new(2, 2)] = Cell::StagingOut;
        Fixture {
            floor,
            bins: vec![Bin::new(Position::new(0, 0), vec![Position::new(0, 1)])],
            staging_in: StagingIn::new(Position::new(0, 2), vec![Position::new(0, 1)]),
            staging_out: StagingOut::new(Position::new(2, 2), vec![Position::new(2, 1)]),
        }
    }

    #[test]
    fn moves_are_bounded_by_grid_and_stations() {
        let f = fixture();
        let mut agent = Agent::new(Position::new(1, 0));

        assert_eq!(agent.move_in(Direction::Up, &f.floor), INVALID_ACTION);
        assert_eq!(agent.move_in(Direction::Left, &f.floor), INVALID_ACTION);
        assert_eq!(agent.position(), Position::new(1, 0));

        assert_eq!(agent.move_in(Direction::Down, &f.floor), NEUTRAL_ACTION);
        assert_eq!(agent.move_in(Direction::Down, &f.floor), INVALID_ACTION);
        assert_eq!(agent.move_in(Direction::Right, &f.floor), NEUTRAL_ACTION);
        assert_eq!(agent.move_in(Direction::Right, &f.floor), INVALID_ACTION);
        assert_eq!(agent.position(), Position::new(2, 1));
    }

    #[test]
    fn load_requires_empty_hands_and_adjacency() {
        let mut f = fixture();
        f.bins[0].place_item(Item::new(1));
        f.bins[0].place_item(Item::new(2));

        let mut far = Agent::new(Position::new(2, 0));
        let reward = far.load_item(&mut f.bins, &mut f.staging_in, &f.staging_out, 1);
        assert_eq!(reward, INVALID_ACTION);

        let mut agent = Agent::new(Position::new(0, 1));
        let reward = agent.load_item(&mut f.bins, &mut f.staging_in, &f.staging_out, 3);
        assert_eq!(reward, INVALID_ACTION);

        let reward = agent.load_item(&mut f.bins, &mut f.staging_in, &f.staging_out, 1);
        assert_eq!(reward, NEUTRAL_ACTION);
        assert_eq!(agent.carried_item().map(Item::slot), Some(1));

        let reward = agent.load_item(&mut f.bins, &mut f.staging_in, &f.staging_out, 2);
        assert_eq!(reward, INVALID_ACTION);
        assert_eq!(f.bins[0].slots().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn first_removal_of_picked_item_is_flagged_once() {
        let mut f = fixture();
        f.bins[0].place_item(Item::new(3));
        f.staging_out.apply_pick(&PickTransaction { slot_ids: vec![3] });

        let mut agent = Agent::new(Position::new(0, 1));
        let reward = agent.load_item(&mut f.bins, &mut f.staging_in, &f.staging_out, 3);
        assert_eq!(reward, NEUTRAL_ACTION);
        assert!(agent.carried_item().unwrap().first_remove_from_bin_rewarded());

        let reward = agent.unload_item(&mut f.bins, &f.staging_in, &mut f.staging_out, 3);
        assert_eq!(reward, NEUTRAL_ACTION);
        let reward = agent.load_item(&mut f.bins, &mut f.staging_in, &f.staging_out, 3);
        assert_eq!(reward, NEUTRAL_ACTION);
        assert!(agent.carried_item().unwrap().first_remove_from_bin_rewarded());
    }

    #[test]
    fn put_items_earn_the_placement_bonus_once() {
        let mut f = fixture();
        let Transaction::Put(put) = Transaction::put([5]) else {
            unreachable!()
        };
        f.staging_in.apply_put(&put).unwrap();

        let mut agent = Agent::new(Position::new(0, 1));
        let reward = agent.load_item(&mut f.bins, &mut f.staging_in, &f.staging_out, 5);
        assert_eq!(reward, GOOD_ACTION);
        assert!(f.staging_in.is_empty());

        let reward = agent.unload_item(&mut f.bins, &f.staging_in, &mut f.staging_out, 4);
        assert_eq!(reward, INVALID_ACTION);
        let reward = agent.unload_item(&mut f.bins, &f.staging_in, &mut f.staging_out, 5);
        assert_eq!(reward, GOOD_ACTION);
        assert!(agent.is_empty_handed());

        agent.load_item(&mut f.bins, &mut f.staging_in, &f.staging_out, 5);
        let reward = agent.unload_item(&mut f.bins, &f.staging_in, &mut f.staging_out, 5);
        assert_eq!(reward, NEUTRAL_ACTION);
    }

    #[test]
    fn delivery_to_staging_out_consumes_the_item() {
        let mut f = fixture();
        f.staging_out.apply_pick(&PickTransaction {
            slot_ids: vec![3, 7],
        });

        let mut agent = Agent::new(Position::new(2, 1));
        agent.carried_item = Some(Item::new(7));
        let reward = agent.unload_item(&mut f.bins, &f.staging_in, &mut f.staging_out, 9);
        assert_eq!(reward, INVALID_ACTION);
        assert_eq!(agent.carried_item(), Some(&Item::new(7)));
        assert_eq!(f.staging_out.incoming(), &[3, 7]);

        let reward = agent.unload_item(&mut f.bins, &f.staging_in, &mut f.staging_out, 7);
        assert_eq!(reward, GOOD_ACTION);
        assert!(agent.is_empty_handed());
        assert_eq!(f.staging_out.incoming(), &[3]);
    }

    #[test]
    fn staging_out_accepts_any_owed_slot_regardless_of_carried_item() {
        let mut f = fixture();
        f.staging_out.apply_pick(&PickTransaction {
            slot_ids: vec![3, 7],
        });

        let mut agent = Agent::new(Position::new(2, 1));
        agent.carried_item = Some(Item::new(9));
        let reward = agent.unload_item(&mut f.bins, &f.staging_in, &mut f.staging_out, 7);
        assert_eq!(reward, GOOD_ACTION);
        assert!(agent.is_empty_handed());
        assert_eq!(f.staging_out.incoming(), &[3]);

        // empty hands are still invalid even though slot 3 is owed
        let reward = agent.unload_item(&mut f.bins, &f.staging_in, &mut f.staging_out, 3);
        assert_eq!(reward, INVALID_ACTION);
        assert_eq!(f.staging_out.incoming(), &[3]);
    }

    #[test]
    fn bin_unload_requires_the_carried_slot() {
        let mut f = fixture();
        let mut agent = Agent::new(Position::new(0, 1));
        agent.carried_item = Some(Item::new(2));

        let reward = agent.unload_item(&mut f.bins, &f.staging_in, &mut f.staging_out, 4);
        assert_eq!(reward, INVALID_ACTION);
        assert!(f.bins[0].is_empty());
        assert_eq!(agent.carried_item(), Some(&Item::new(2)));

        let reward = agent.unload_item(&mut f.bins, &f.staging_in, &mut f.staging_out, 2);
        assert_eq!(reward, NEUTRAL_ACTION);
        assert!(f.bins[0].contains(2));
    }

    #[test]
    fn unload_without_item_is_invalid() {
        let mut f = fixture();
        let mut agent = Agent::new(Position::new(0, 1));
        let reward = agent.unload_item(&mut f.bins, &f.staging_in, &mut f.staging_out, 1);
        assert_eq!(reward, INVALID_ACTION);
        assert_eq!(agent.to_string(), "Agent at (0, 1) with no Item");
    }
}
