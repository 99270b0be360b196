//! Identity registry
//!
//! Owns the owner→entity and entity→(tier, stake, active) relationships.
//! External collaborators write stake and activation changes; the governance
//! engines only read this state and, on an approved promotion, update a tier.
//!
//! Lookups go through an owner index (owner → sorted set of entity ids) so
//! aggregating an owner's entities is O(owned entities), never a full-table
//! scan. Entities reference their owner by id, not by pointer.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GovernanceError, GovernanceResult};
use crate::tier::Tier;

/// Opaque owner handle. An owner may control many entities; every entity
/// belongs to exactly one owner.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

impl OwnerId {
    /// Convenience constructor.
    pub fn new(id: impl Into<String>) -> Self {
        OwnerId(id.into())
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequential entity id assigned by the registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single stake acquisition. Token seasoning ages each lot independently,
/// so adding stake never refreshes the age of stake already held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeLot {
    /// Amount acquired in this lot
    pub amount: u64,
    /// Unix seconds at which the lot was acquired
    pub acquired_at: u64,
}

/// A registered, tiered identity capable of holding stake and reputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Registry-assigned id
    pub id: EntityId,
    /// The single owner of this entity
    pub owner: OwnerId,
    /// Current capability tier
    pub tier: Tier,
    /// Stake acquisitions, oldest first
    pub stake_lots: Vec<StakeLot>,
    /// Inactive entities contribute no voting power
    pub active: bool,
    /// Unix seconds at registration
    pub created_at: u64,
}

impl Entity {
    /// Total stake across all lots.
    pub fn total_stake(&self) -> u64 {
        self.stake_lots.iter().map(|lot| lot.amount).sum()
    }
}

/// In-memory registry of entities and the owner index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityRegistry {
    entities: HashMap<EntityId, Entity>,
    by_owner: HashMap<OwnerId, BTreeSet<EntityId>>,
    next_id: u64,
}

impl IdentityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new entity for `owner` at `tier` with an initial stake lot.
    ///
    /// Fails with `InvalidTier` for `Tier::None` (the ladder floor is not
    /// assignable) and with `TooManyEntities` when a per-owner cap is
    /// configured and reached.
    pub fn register_entity(
        &mut self,
        owner: OwnerId,
        tier: Tier,
        stake: u64,
        now: u64,
        max_per_owner: Option<usize>,
    ) -> GovernanceResult<EntityId> {
        if tier == Tier::None {
            return Err(GovernanceError::InvalidTier(tier));
        }
        if let Some(cap) = max_per_owner {
            let owned = self.by_owner.get(&owner).map_or(0, |set| set.len());
            if owned >= cap {
                return Err(GovernanceError::TooManyEntities(owner));
            }
        }

        let id = EntityId(self.next_id);
        self.next_id += 1;

        let mut stake_lots = Vec::new();
        if stake > 0 {
            stake_lots.push(StakeLot {
                amount: stake,
                acquired_at: now,
            });
        }

        let entity = Entity {
            id,
            owner: owner.clone(),
            tier,
            stake_lots,
            active: true,
            created_at: now,
        };

        self.entities.insert(id, entity);
        self.by_owner.entry(owner.clone()).or_default().insert(id);

        debug!(entity = %id, owner = %owner.0, ?tier, stake, "registered entity");
        Ok(id)
    }

    /// Append a stake lot to an entity. Seasoning ages the lot from `now`.
    pub fn add_stake(&mut self, id: EntityId, amount: u64, now: u64) -> GovernanceResult<()> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(GovernanceError::EntityNotFound(id))?;
        if amount > 0 {
            entity.stake_lots.push(StakeLot {
                amount,
                acquired_at: now,
            });
        }
        Ok(())
    }

    /// Look up an entity.
    pub fn entity(&self, id: EntityId) -> GovernanceResult<&Entity> {
        self.entities
            .get(&id)
            .ok_or(GovernanceError::EntityNotFound(id))
    }

    /// The tier of an entity.
    pub fn tier_of(&self, id: EntityId) -> GovernanceResult<Tier> {
        self.entity(id).map(|e| e.tier)
    }

    /// The total stake of an entity.
    pub fn stake_of(&self, id: EntityId) -> GovernanceResult<u64> {
        self.entity(id).map(Entity::total_stake)
    }

    /// Iterate over the entities an owner controls, in id order.
    pub fn entities_of<'a>(&'a self, owner: &OwnerId) -> impl Iterator<Item = &'a Entity> + 'a {
        self.by_owner
            .get(owner)
            .into_iter()
            .flat_map(move |ids| ids.iter().filter_map(move |id| self.entities.get(id)))
    }

    /// Iterate over every owner with at least one entity.
    pub fn owners(&self) -> impl Iterator<Item = &OwnerId> {
        self.by_owner.keys()
    }

    /// All entities currently holding `tier`, active ones only.
    pub fn active_entities_at_tier(&self, tier: Tier) -> BTreeSet<EntityId> {
        self.entities
            .values()
            .filter(|e| e.active && e.tier == tier)
            .map(|e| e.id)
            .collect()
    }

    /// Overwrite an entity's tier. Used by the promotion engine on approval
    /// and by external collaborators.
    pub fn set_tier(&mut self, id: EntityId, tier: Tier) -> GovernanceResult<()> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(GovernanceError::EntityNotFound(id))?;
        entity.tier = tier;
        Ok(())
    }

    /// Activate or deactivate an entity.
    pub fn set_active(&mut self, id: EntityId, active: bool) -> GovernanceResult<()> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(GovernanceError::EntityNotFound(id))?;
        entity.active = active;
        Ok(())
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when no entities are registered.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let mut registry = IdentityRegistry::new();
        let owner = OwnerId::new("did:strata:alice");
        let id = registry
            .register_entity(owner.clone(), Tier::Base, 500, 100, None)
            .unwrap();

        assert_eq!(registry.tier_of(id).unwrap(), Tier::Base);
        assert_eq!(registry.stake_of(id).unwrap(), 500);
        assert_eq!(registry.entities_of(&owner).count(), 1);
    }

    #[test]
    fn tier_none_is_not_assignable() {
        let mut registry = IdentityRegistry::new();
        let err = registry
            .register_entity(OwnerId::new("o"), Tier::None, 0, 0, None)
            .unwrap_err();
        assert_eq!(err, GovernanceError::InvalidTier(Tier::None));
    }

    #[test]
    fn per_owner_cap_is_enforced_when_configured() {
        let mut registry = IdentityRegistry::new();
        let owner = OwnerId::new("did:strata:bob");
        registry
            .register_entity(owner.clone(), Tier::Base, 1, 0, Some(2))
            .unwrap();
        registry
            .register_entity(owner.clone(), Tier::Base, 1, 0, Some(2))
            .unwrap();
        let err = registry
            .register_entity(owner.clone(), Tier::Base, 1, 0, Some(2))
            .unwrap_err();
        assert_eq!(err, GovernanceError::TooManyEntities(owner));
    }

    #[test]
    fn stake_lots_accumulate_without_merging() {
        let mut registry = IdentityRegistry::new();
        let id = registry
            .register_entity(OwnerId::new("o"), Tier::Base, 100, 10, None)
            .unwrap();
        registry.add_stake(id, 50, 20).unwrap();
        let entity = registry.entity(id).unwrap();
        assert_eq!(entity.stake_lots.len(), 2);
        assert_eq!(entity.total_stake(), 150);
        assert_eq!(entity.stake_lots[1].acquired_at, 20);
    }

    #[test]
    fn unknown_entity_is_not_found() {
        let registry = IdentityRegistry::new();
        assert_eq!(
            registry.tier_of(EntityId(9)).unwrap_err(),
            GovernanceError::EntityNotFound(EntityId(9))
        );
    }

    #[test]
    fn electorate_filters_by_tier_and_activity() {
        let mut registry = IdentityRegistry::new();
        let a = registry
            .register_entity(OwnerId::new("a"), Tier::Guardian, 1, 0, None)
            .unwrap();
        let b = registry
            .register_entity(OwnerId::new("b"), Tier::Guardian, 1, 0, None)
            .unwrap();
        registry
            .register_entity(OwnerId::new("c"), Tier::Base, 1, 0, None)
            .unwrap();
        registry.set_active(b, false).unwrap();

        let electorate = registry.active_entities_at_tier(Tier::Guardian);
        assert!(electorate.contains(&a));
        assert!(!electorate.contains(&b));
        assert_eq!(electorate.len(), 1);
    }
}
