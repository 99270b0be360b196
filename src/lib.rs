//! Strata governance
//!
//! Reputation-weighted governance and tier-promotion engine. The crate
//! computes voting power for owners who may control many registered
//! entities, aggregates that power for proposal voting, and runs
//! election-style promotion workflows between capability tiers.
//!
//! Persistent ledger execution, identity credential issuance, and the
//! reputation oracle itself are external collaborators: they feed
//! owner→entity mappings, stake amounts, and reputation submissions into
//! the engine, which exposes proposal, voting, and promotion operations
//! back to them. All amounts and scores are fixed-point integers; no
//! floating point touches any value that affects an outcome.
//!
//! Entry point: [`GovernanceEngine`].

pub mod config;
pub mod error;
pub mod governance;
pub mod identity;
pub mod power;
pub mod reputation;
pub mod tier;

use std::sync::atomic::{AtomicU64, Ordering};

pub use config::{GovernanceConfig, ThresholdKind, TierParams, ZeroVotePolicy};
pub use error::{ErrorKind, GovernanceError, GovernanceResult};
pub use governance::promotion::{
    ApplicationId, ApplicationStatus, ApplicationVote, PromotionApplication, TierChange,
};
pub use governance::proposals::{Proposal, ProposalId, ProposalStatus, Vote};
pub use governance::GovernanceEngine;
pub use identity::{Entity, EntityId, IdentityRegistry, OwnerId, StakeLot};
pub use power::PowerSnapshot;
pub use reputation::{Checkpoint, ReputationScore, ReputationStore, MAX_SCORE_BP};
pub use tier::Tier;

/// Time source for the engine, in unix seconds.
///
/// The engine never reads wall-clock time directly; a ledger host supplies
/// block time through this seam and tests supply a [`ManualClock`].
pub trait Clock: Send + Sync {
    /// Current time in unix seconds.
    fn now(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        // Pre-epoch wall clocks clamp to zero rather than wrapping.
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// A settable clock for tests and deterministic replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// A clock starting at `now` unix seconds.
    pub fn starting_at(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Set the current time.
    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Advance the current time by `secs`.
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::starting_at(100);
        assert_eq!(clock.now(), 100);
        clock.advance(50);
        assert_eq!(clock.now(), 150);
        clock.set(10);
        assert_eq!(clock.now(), 10);
    }

    #[test]
    fn system_clock_is_past_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
