//! Governance configuration
//!
//! All thresholds are fixed-point basis points (1 bp = 0.01%) so that every
//! computation affecting an outcome is integer arithmetic. Per-tier
//! parameters are configuration, not code: deployments tune multipliers and
//! promotion thresholds without touching the engine.

use serde::{Deserialize, Serialize};

use crate::tier::Tier;

/// One basis-point unit: 10 000 bp = 100%.
pub const BP_DENOM: u128 = 10_000;

/// How a tally is compared against its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdKind {
    /// Strictly more than half of the votes cast must be in favor
    SimpleMajority,
    /// At least the configured supermajority ratio of votes cast must be in
    /// favor
    Supermajority,
}

/// Resolution of an item whose voting window lapses with zero votes cast.
///
/// A single constant shared by the proposal and promotion engines.
/// Auto-approval is the gatekeeping-prevention choice: an incumbent
/// electorate cannot starve candidates by simply never voting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZeroVotePolicy {
    /// Resolve as approved
    AutoApprove,
    /// Resolve as rejected
    AutoReject,
}

/// Per-tier parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierParams {
    /// Multiplier applied to an entity's stake-weighted power
    pub voting_multiplier: u64,
    /// Minimum reputation (bp) an entity needs to apply for this tier
    pub min_reputation_bp: u32,
    /// Minimum total stake an entity needs to apply for this tier
    pub min_stake: u64,
    /// Threshold the incumbent electorate must reach to approve a
    /// promotion into this tier
    pub promotion_threshold: ThresholdKind,
}

/// Engine-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Upper bound on any single owner's share of total network power (bp)
    pub cap_fraction_bp: u32,
    /// Token seasoning window in seconds; newly acquired stake ramps
    /// linearly to full weight over this window. Zero disables seasoning.
    pub seasoning_window_secs: u64,
    /// Weighted reputation (bp) an owner needs to create a proposal
    pub proposal_reputation_min_bp: u32,
    /// Voting window applied when the caller does not supply one
    pub default_voting_window_secs: u64,
    /// Supermajority ratio as (numerator, denominator), e.g. (2, 3)
    pub supermajority_ratio: (u64, u64),
    /// Shared zero-vote resolution policy
    pub zero_vote_policy: ZeroVotePolicy,
    /// Seconds an entity must wait after a rejected application before
    /// re-applying
    pub reapplication_cooldown_secs: u64,
    /// Optional hard cap on entities per owner; `None` leaves the bound to
    /// external collaborators
    pub max_entities_per_owner: Option<usize>,
    /// Reputation checkpoints kept verbatim per entity
    pub checkpoint_retention: usize,
    /// Of checkpoints older than the retained window, every `stride`-th is
    /// kept as a periodic snapshot
    pub checkpoint_stride: usize,
    /// Parameters per tier, indexed by [`Tier::index`]
    pub tiers: Vec<TierParams>,
}

impl GovernanceConfig {
    /// Parameters for a tier.
    ///
    /// `tiers` always holds one entry per ladder rung; `Default` and serde
    /// round-trips preserve that.
    pub fn tier(&self, tier: Tier) -> &TierParams {
        &self.tiers[tier.index()]
    }
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            cap_fraction_bp: 1_000,             // 10% concentration cap
            seasoning_window_secs: 30 * 86_400, // 30 days
            proposal_reputation_min_bp: 5_000,  // 50% weighted reputation
            default_voting_window_secs: 3 * 86_400,
            supermajority_ratio: (2, 3),
            zero_vote_policy: ZeroVotePolicy::AutoApprove,
            reapplication_cooldown_secs: 7 * 86_400,
            max_entities_per_owner: None,
            checkpoint_retention: 64,
            checkpoint_stride: 8,
            tiers: vec![
                // None: never holds power, never a promotion target
                TierParams {
                    voting_multiplier: 0,
                    min_reputation_bp: 0,
                    min_stake: 0,
                    promotion_threshold: ThresholdKind::SimpleMajority,
                },
                // Base
                TierParams {
                    voting_multiplier: 1,
                    min_reputation_bp: 0,
                    min_stake: 0,
                    promotion_threshold: ThresholdKind::SimpleMajority,
                },
                // Validator
                TierParams {
                    voting_multiplier: 2,
                    min_reputation_bp: 4_000,
                    min_stake: 10_000,
                    promotion_threshold: ThresholdKind::SimpleMajority,
                },
                // Guardian
                TierParams {
                    voting_multiplier: 5,
                    min_reputation_bp: 6_000,
                    min_stake: 50_000,
                    promotion_threshold: ThresholdKind::Supermajority,
                },
                // Oracle
                TierParams {
                    voting_multiplier: 10,
                    min_reputation_bp: 8_000,
                    min_stake: 250_000,
                    promotion_threshold: ThresholdKind::Supermajority,
                },
            ],
        }
    }
}
