//! Item lifecycle and exclusive ownership.
//!
//! Every item has exactly one [`Owner`] at any instant. Carrying is modelled as
//! ownership by an actor; the renderer derives world transforms from the owner,
//! the core never stores them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, WorkcellError};

/// Which mirrored half of the cell a station sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// `+1` for left, `-1` for right. Multiplies configured angles.
    pub fn sign(self) -> f64 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "side")]
pub enum StationId {
    Source,
    Processing(Side),
    Storage(Side),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub usize);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

/// Exclusive custodian of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Owner {
    Station(StationId),
    Actor(ActorId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemKind {
    Raw,
    Transformed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub kind: ItemKind,
    pub owner: Owner,
}

impl Item {
    pub fn is_transformed(&self) -> bool {
        self.kind == ItemKind::Transformed
    }
}

/// Registry of live items keyed by id. Iteration order is id order so
/// snapshots are stable.
#[derive(Debug, Default)]
pub struct ItemRegistry {
    items: BTreeMap<ItemId, Item>,
    next_id: u64,
    spawned: u64,
    transfers: u64,
    transforms: u64,
    destroyed: u64,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a raw item owned by `station`.
    pub fn spawn(&mut self, station: StationId) -> ItemId {
        self.next_id += 1;
        let id = ItemId(self.next_id);
        self.items.insert(
            id,
            Item {
                id,
                kind: ItemKind::Raw,
                owner: Owner::Station(station),
            },
        );
        self.spawned += 1;
        id
    }

    /// Unconditionally reassigns `id` to `owner`. Callers check
    /// `owner_of(id) != Some(owner)` first so the transfer fires once per
    /// latch.
    pub fn transfer(&mut self, id: ItemId, owner: Owner) -> Result<()> {
        let item = self.item_mut(id)?;
        item.owner = owner;
        self.transfers += 1;
        Ok(())
    }

    /// Flips the item to [`ItemKind::Transformed`], keeping id and owner.
    pub fn transform(&mut self, id: ItemId) -> Result<()> {
        let item = self.item_mut(id)?;
        item.kind = ItemKind::Transformed;
        self.transforms += 1;
        Ok(())
    }

    pub fn destroy(&mut self, id: ItemId) -> Result<Item> {
        let item = self
            .items
            .remove(&id)
            .ok_or_else(|| WorkcellError::invariant(format!("cannot destroy unknown {id}")))?;
        self.destroyed += 1;
        Ok(item)
    }

    /// Destroys every item and zeroes the counters. Ids restart at 1.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn owner_of(&self, id: ItemId) -> Option<Owner> {
        self.items.get(&id).map(|item| item.owner)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn items_owned_by(&self, owner: Owner) -> impl Iterator<Item = &Item> {
        self.items.values().filter(move |item| item.owner == owner)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    pub fn transfers(&self) -> u64 {
        self.transfers
    }

    pub fn transforms(&self) -> u64 {
        self.transforms
    }

    pub fn destroyed(&self) -> u64 {
        self.destroyed
    }

    /// Cross-checks actor custody against the registry. `carrying` lists every
    /// actor with the item it believes it holds.
    ///
    /// # Errors
    ///
    /// Returns [`WorkcellError::InvariantViolation`] when an actor claims an
    /// item the registry assigns elsewhere, or the registry assigns an item to
    /// an actor that does not claim it.
    pub fn verify(&self, carrying: &[(ActorId, Option<ItemId>)]) -> Result<()> {
        for (actor, held) in carrying {
            if let Some(id) = held {
                match self.owner_of(*id) {
                    Some(Owner::Actor(owner)) if owner == *actor => {}
                    Some(other) => {
                        return Err(WorkcellError::invariant(format!(
                            "{actor} carries {id} but the registry assigns it to {other:?}"
                        )))
                    }
                    None => {
                        return Err(WorkcellError::invariant(format!(
                            "{actor} carries {id} which no longer exists"
                        )))
                    }
                }
            }
        }

        for item in self.items.values() {
            if let Owner::Actor(owner) = item.owner {
                let claimed = carrying
                    .iter()
                    .any(|(actor, held)| *actor == owner && *held == Some(item.id));
                if !claimed {
                    return Err(WorkcellError::invariant(format!(
                        "{} is owned by {owner} which does not carry it",
                        item.id
                    )));
                }
            }
        }
        Ok(())
    }

    fn item_mut(&mut self, id: ItemId) -> Result<&mut Item> {
        self.items
            .get_mut(&id)
            .ok_or_else(|| WorkcellError::invariant(format!("unknown {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARM: ActorId = ActorId(0);

    #[test]
    fn spawn_assigns_sequential_ids_at_station() {
        let mut registry = ItemRegistry::new();
        let first = registry.spawn(StationId::Source);
        let second = registry.spawn(StationId::Source);

        assert_eq!(first, ItemId(1));
        assert_eq!(second, ItemId(2));
        let item = registry.get(first).unwrap();
        assert_eq!(item.kind, ItemKind::Raw);
        assert_eq!(item.owner, Owner::Station(StationId::Source));
    }

    #[test]
    fn transform_preserves_identity_and_owner() {
        let mut registry = ItemRegistry::new();
        let id = registry.spawn(StationId::Processing(Side::Left));
        registry.transform(id).unwrap();

        let item = registry.get(id).unwrap();
        assert!(item.is_transformed());
        assert_eq!(item.owner, Owner::Station(StationId::Processing(Side::Left)));
        assert_eq!(registry.transforms(), 1);
    }

    #[test]
    fn transfer_of_unknown_item_is_an_invariant_violation() {
        let mut registry = ItemRegistry::new();
        let err = registry.transfer(ItemId(9), Owner::Actor(ARM)).unwrap_err();
        assert!(matches!(err, WorkcellError::InvariantViolation(_)));
    }

    #[test]
    fn verify_accepts_consistent_custody() {
        let mut registry = ItemRegistry::new();
        let id = registry.spawn(StationId::Source);
        registry.transfer(id, Owner::Actor(ARM)).unwrap();

        registry.verify(&[(ARM, Some(id))]).unwrap();
    }

    #[test]
    fn verify_rejects_unclaimed_actor_item() {
        let mut registry = ItemRegistry::new();
        let id = registry.spawn(StationId::Source);
        registry.transfer(id, Owner::Actor(ARM)).unwrap();

        let err = registry.verify(&[(ARM, None)]).unwrap_err();
        assert!(format!("{err}").contains("does not carry"));
    }

    #[test]
    fn verify_rejects_claim_on_station_item() {
        let mut registry = ItemRegistry::new();
        let id = registry.spawn(StationId::Source);

        assert!(registry.verify(&[(ARM, Some(id))]).is_err());
    }

    #[test]
    fn clear_drops_everything() {
        let mut registry = ItemRegistry::new();
        let id = registry.spawn(StationId::Source);
        registry.transfer(id, Owner::Actor(ARM)).unwrap();
        registry.clear();

        assert!(registry.is_empty());
        assert_eq!(registry.transfers(), 0);
        assert_eq!(registry.spawn(StationId::Source), ItemId(1));
    }
}
