//! Voting power calculator
//!
//! Pure functions over the identity registry and the reputation store.
//! Nothing here mutates state; the proposal and promotion engines call into
//! this module on demand and at snapshot time.
//!
//! All arithmetic is fixed-point `u128`: stake × score (bp) × tier
//! multiplier. Scores never exceed 10 000 bp and multipliers are small, so
//! products stay far from the `u128` ceiling for any realistic stake.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::{GovernanceConfig, BP_DENOM};
use crate::error::{GovernanceError, GovernanceResult};
use crate::identity::{Entity, IdentityRegistry, OwnerId};
use crate::reputation::ReputationStore;

/// Stake weight of an entity at `now` after token seasoning.
///
/// Each lot ramps linearly from zero to full weight over
/// `seasoning_window_secs`; lots older than the window count fully. A zero
/// window disables seasoning. Ages are computed per acquisition event, so
/// topping up stake never rejuvenates what is already held.
pub fn effective_stake(entity: &Entity, now: u64, window: u64) -> u128 {
    entity
        .stake_lots
        .iter()
        .map(|lot| {
            let amount = u128::from(lot.amount);
            if window == 0 {
                return amount;
            }
            let age = now.saturating_sub(lot.acquired_at);
            if age >= window {
                amount
            } else {
                amount * u128::from(age) / u128::from(window)
            }
        })
        .sum()
}

/// Base voting power of a single entity at `at`:
/// `effective_stake × score_at × tier_multiplier`. Inactive entities hold
/// no power.
pub fn base_power(
    entity: &Entity,
    store: &ReputationStore,
    config: &GovernanceConfig,
    at: u64,
) -> u128 {
    if !entity.active {
        return 0;
    }
    let stake = effective_stake(entity, at, config.seasoning_window_secs);
    let score = u128::from(store.score_of_at(entity.id, at));
    let multiplier = u128::from(config.tier(entity.tier).voting_multiplier);
    stake * score * multiplier
}

/// Uncapped per-owner power: the sum of base power over the owner's
/// entities at `at`.
pub fn raw_power(
    registry: &IdentityRegistry,
    store: &ReputationStore,
    config: &GovernanceConfig,
    owner: &OwnerId,
    at: u64,
) -> u128 {
    registry
        .entities_of(owner)
        .map(|entity| base_power(entity, store, config, at))
        .sum()
}

/// Anti-gaming weighted-average reputation for an owner, in bp.
///
/// `Σ(score × weight) / Σ(weight)` with `weight = effective_stake ×
/// tier_multiplier`. Low-effort entities drag the average down in
/// proportion to the voting weight they would contribute, so splitting
/// stake across throwaway identities cannot unlock reputation-gated
/// actions.
///
/// With zero total weight (no seasoned stake anywhere) this falls back to
/// the simple unweighted mean over the owner's active entities, and to 0
/// for an owner with no entities.
pub fn weighted_reputation(
    registry: &IdentityRegistry,
    store: &ReputationStore,
    config: &GovernanceConfig,
    owner: &OwnerId,
    at: u64,
) -> u32 {
    let mut weighted_sum: u128 = 0;
    let mut weight_sum: u128 = 0;
    let mut plain_sum: u128 = 0;
    let mut active_count: u128 = 0;

    for entity in registry.entities_of(owner) {
        if !entity.active {
            continue;
        }
        let score = u128::from(store.score_of_at(entity.id, at));
        let weight = effective_stake(entity, at, config.seasoning_window_secs)
            * u128::from(config.tier(entity.tier).voting_multiplier);
        weighted_sum += score * weight;
        weight_sum += weight;
        plain_sum += score;
        active_count += 1;
    }

    let average = if weight_sum > 0 {
        weighted_sum / weight_sum
    } else if active_count > 0 {
        plain_sum / active_count
    } else {
        0
    };
    // Both averages are bounded by MAX_SCORE_BP.
    average as u32
}

/// A frozen view of voting power, taken once when a proposal or application
/// is created. All later weight lookups for that object read this map and
/// never recompute from live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerSnapshot {
    /// Instant the snapshot was taken
    pub taken_at: u64,
    /// Sum of uncapped power over all owners at `taken_at`
    pub total_network_power: u128,
    /// `cap_fraction × total_network_power`, the per-owner ceiling
    pub cap_limit: u128,
    /// Capped power per owner; owners absent from the map weigh 0
    owner_power: HashMap<OwnerId, u128>,
}

impl PowerSnapshot {
    /// Take a snapshot: a single full pass over all owners computing every
    /// raw power, the network total, the cap limit, and each owner's capped
    /// power. This is the only place the O(owners) pass happens; per-vote
    /// lookups afterwards are map reads.
    pub fn capture(
        registry: &IdentityRegistry,
        store: &ReputationStore,
        config: &GovernanceConfig,
        now: u64,
    ) -> GovernanceResult<Self> {
        let mut raw: HashMap<OwnerId, u128> = HashMap::new();
        let mut total: u128 = 0;

        for owner in registry.owners() {
            let power = raw_power(registry, store, config, owner, now);
            total = total
                .checked_add(power)
                .ok_or_else(|| GovernanceError::Internal("network power overflow".into()))?;
            raw.insert(owner.clone(), power);
        }

        let cap_limit = total * u128::from(config.cap_fraction_bp) / BP_DENOM;
        let owner_power = raw
            .into_iter()
            .map(|(owner, power)| (owner, power.min(cap_limit)))
            .collect();

        Ok(Self {
            taken_at: now,
            total_network_power: total,
            cap_limit,
            owner_power,
        })
    }

    /// Capped voting power of `owner` in this snapshot.
    pub fn power_of(&self, owner: &OwnerId) -> u128 {
        self.owner_power.get(owner).copied().unwrap_or(0)
    }
}
