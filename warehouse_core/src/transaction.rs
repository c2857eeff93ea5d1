use std::collections::BTreeSet;
use std::fmt;

use log::debug;
use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::{Slot, item::Item, storage::Bin};

/// Raised when the current occupancy admits neither a pick nor a put.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error(
        "layout cannot sustain a transaction: capacity {max_items_in_env}, {used} slots in use"
    )]
    Infeasible { max_items_in_env: usize, used: usize },
}

/// Remove the named items from the warehouse through Staging-Out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickTransaction {
    pub slot_ids: Vec<Slot>,
}

impl PickTransaction {
    pub fn contains(&self, slot: Slot) -> bool {
        self.slot_ids.contains(&slot)
    }
}

/// Bring fresh items into the warehouse through Staging-In.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutTransaction {
    pub items: Vec<Item>,
}

impl PutTransaction {
    pub fn contains(&self, slot: Slot) -> bool {
        self.items.iter().any(|item| item.slot() == slot)
    }

    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.items.iter().map(Item::slot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Pick,
    Put,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Pick => f.write_str("Pick"),
            TransactionKind::Put => f.write_str("Put"),
        }
    }
}

/// The unit of work of one episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transaction {
    Pick(PickTransaction),
    Put(PutTransaction),
}

impl Transaction {
    pub fn pick(slot_ids: Vec<Slot>) -> Self {
        Transaction::Pick(PickTransaction { slot_ids })
    }

    pub fn put(slots: impl IntoIterator<Item = Slot>) -> Self {
        Transaction::Put(PutTransaction {
            items: slots.into_iter().map(Item::new).collect(),
        })
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            Transaction::Pick(_) => TransactionKind::Pick,
            Transaction::Put(_) => TransactionKind::Put,
        }
    }

    /// Slot identities the transaction moves, in generation order.
    pub fn slots(&self) -> Vec<Slot> {
        match self {
            Transaction::Pick(pick) => pick.slot_ids.clone(),
            Transaction::Put(put) => put.slots().collect(),
        }
    }

    /// Number of items the transaction moves.
    pub fn len(&self) -> usize {
        match self {
            Transaction::Pick(pick) => pick.slot_ids.len(),
            Transaction::Put(put) => put.items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: Vec<String> = self.slots().iter().map(ToString::to_string).collect();
        write!(f, "{} with Items {}", self.kind(), slots.join(", "))
    }
}

/// Generates a new transaction from the current bin occupancy.
///
/// Items carried by the agent are ignored: a transaction is only generated
/// while the agent is empty-handed.
pub fn create_transaction<R: Rng + ?Sized>(
    rng: &mut R,
    max_items_in_env: usize,
    bin_slot_size: usize,
    bins: &[Bin],
) -> Result<Transaction, TransactionError> {
    let used: Vec<Slot> = bins.iter().flat_map(Bin::slots).collect();
    let put_possible = max_items_in_env > used.len();
    let pick_possible = !used.is_empty();

    let transaction = match (pick_possible, put_possible) {
        (true, true) => {
            if rng.random_bool(0.5) {
                create_pick_transaction(rng, &used, bin_slot_size)
            } else {
                create_put_transaction(rng, &used, max_items_in_env, bin_slot_size)
            }
        }
        (true, false) => create_pick_transaction(rng, &used, bin_slot_size),
        (false, true) => create_put_transaction(rng, &used, max_items_in_env, bin_slot_size),
        (false, false) => {
            return Err(TransactionError::Infeasible {
                max_items_in_env,
                used: used.len(),
            });
        }
    };
    debug!("Generated transaction: {}", transaction);
    Ok(transaction)
}

fn create_pick_transaction<R: Rng + ?Sized>(
    rng: &mut R,
    used: &[Slot],
    bin_slot_size: usize,
) -> Transaction {
    let count = rng.random_range(1..=bin_slot_size.min(used.len()));
    let slot_ids = index::sample(rng, used.len(), count)
        .into_iter()
        .map(|i| used[i])
        .collect();
    Transaction::pick(slot_ids)
}

fn create_put_transaction<R: Rng + ?Sized>(
    rng: &mut R,
    used: &[Slot],
    max_items_in_env: usize,
    bin_slot_size: usize,
) -> Transaction {
    let count = rng.random_range(1..=bin_slot_size.min(max_items_in_env - used.len()));
    let used: BTreeSet<Slot> = used.iter().copied().collect();
    // slots are 1-based
    let free: Vec<Slot> = (1..=max_items_in_env)
        .filter(|slot| !used.contains(slot))
        .collect();
    Transaction::put(
        index::sample(rng, free.len(), count)
            .into_iter()
            .map(|i| free[i]),
    )
}
