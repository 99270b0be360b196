//! Governance engines
//!
//! [`ProposalEngine`](proposals::ProposalEngine) runs open-electorate
//! proposals, [`TierPromotionEngine`](promotion::TierPromotionEngine) runs
//! closed-electorate promotion elections, and [`GovernanceEngine`] composes
//! them with the identity registry and reputation store behind the external
//! interface.
//!
//! The engine is a sequential state-transition function: every write
//! operation is applied atomically in a single total order, because voting
//! tallies and concentration caps are order-sensitive aggregates. There is
//! no hidden global state; each [`GovernanceEngine`] instance is fully
//! independent.

pub mod promotion;
pub mod proposals;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::{GovernanceConfig, ThresholdKind, ZeroVotePolicy};
use crate::error::GovernanceResult;
use crate::identity::{EntityId, IdentityRegistry, OwnerId};
use crate::power::{self, PowerSnapshot};
use crate::reputation::ReputationStore;
use crate::tier::Tier;
use crate::{Clock, SystemClock};

use promotion::{
    ApplicationId, ApplicationStatus, ApplicationVote, PromotionApplication, TierChange,
    TierPromotionEngine,
};
use proposals::{Proposal, ProposalEngine, ProposalId, ProposalStatus, Vote};

/// Decide whether a tally passes its threshold.
///
/// Shared by both engines so zero-vote handling cannot drift between them:
/// an empty tally resolves per the configured [`ZeroVotePolicy`], simple
/// majority needs strictly more weight in favor, and supermajority needs
/// `votes_for / total >= num / denom` evaluated in integer cross products.
pub(crate) fn resolve_outcome(
    votes_for: u128,
    votes_against: u128,
    threshold: ThresholdKind,
    config: &GovernanceConfig,
) -> bool {
    let total = votes_for + votes_against;
    if total == 0 {
        return match config.zero_vote_policy {
            ZeroVotePolicy::AutoApprove => true,
            ZeroVotePolicy::AutoReject => false,
        };
    }
    match threshold {
        ThresholdKind::SimpleMajority => votes_for > votes_against,
        ThresholdKind::Supermajority => {
            let (num, denom) = config.supermajority_ratio;
            votes_for * u128::from(denom) >= total * u128::from(num)
        }
    }
}

/// The external interface of the governance subsystem.
///
/// Collaborators (the ledger, the reputation oracle, identity issuance)
/// call these operations; the engine reads owner/entity/reputation state
/// and writes only proposal and application state of its own.
pub struct GovernanceEngine {
    config: GovernanceConfig,
    clock: Arc<dyn Clock>,
    registry: IdentityRegistry,
    reputation: ReputationStore,
    proposals: ProposalEngine,
    promotions: TierPromotionEngine,
}

impl GovernanceEngine {
    /// Create an engine with the system clock.
    pub fn new(config: GovernanceConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an engine with an explicit clock, e.g. a manual clock in
    /// tests or a block-time clock under a ledger.
    pub fn with_clock(config: GovernanceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            registry: IdentityRegistry::new(),
            reputation: ReputationStore::new(),
            proposals: ProposalEngine::new(),
            promotions: TierPromotionEngine::new(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    // ── Identity operations (written by external collaborators) ──

    /// Register a new entity for `owner` at `tier` with an initial stake.
    pub fn register_entity(
        &mut self,
        owner: OwnerId,
        tier: Tier,
        stake: u64,
    ) -> GovernanceResult<EntityId> {
        let now = self.clock.now();
        self.registry.register_entity(
            owner,
            tier,
            stake,
            now,
            self.config.max_entities_per_owner,
        )
    }

    /// Add a stake lot to an entity; seasoning ages it from now.
    pub fn add_stake(&mut self, entity_id: EntityId, amount: u64) -> GovernanceResult<()> {
        let now = self.clock.now();
        self.registry.add_stake(entity_id, amount, now)
    }

    /// Activate or deactivate an entity.
    pub fn set_entity_active(&mut self, entity_id: EntityId, active: bool) -> GovernanceResult<()> {
        self.registry.set_active(entity_id, active)
    }

    /// Read-only view of the registry.
    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    // ── Reputation operations (oracle submissions) ──

    /// Record a reputation oracle submission for an entity.
    pub fn submit_reputation(
        &mut self,
        entity_id: EntityId,
        components: BTreeMap<String, u32>,
        timestamp: u64,
    ) -> GovernanceResult<u32> {
        self.registry.entity(entity_id)?;
        let score = self
            .reputation
            .submit_update(entity_id, components, timestamp)?;
        self.reputation.compact(
            entity_id,
            self.config.checkpoint_retention,
            self.config.checkpoint_stride,
        );
        Ok(score)
    }

    /// Read-only view of the reputation store.
    pub fn reputation(&self) -> &ReputationStore {
        &self.reputation
    }

    // ── Power queries ──

    /// Current capped voting power of an owner.
    ///
    /// The concentration cap needs the network total, so this takes the
    /// same full pass a snapshot does; callers polling many owners should
    /// take one [`PowerSnapshot`] instead.
    pub fn get_voting_power(&self, owner: &OwnerId) -> GovernanceResult<u128> {
        let snapshot = self.power_snapshot()?;
        Ok(snapshot.power_of(owner))
    }

    /// Current anti-gaming weighted reputation of an owner, in bp.
    pub fn get_weighted_reputation(&self, owner: &OwnerId) -> u32 {
        let now = self.clock.now();
        power::weighted_reputation(&self.registry, &self.reputation, &self.config, owner, now)
    }

    /// Take a power snapshot of the current instant.
    pub fn power_snapshot(&self) -> GovernanceResult<PowerSnapshot> {
        let now = self.clock.now();
        PowerSnapshot::capture(&self.registry, &self.reputation, &self.config, now)
    }

    // ── Proposal operations ──

    /// Create a proposal; the power snapshot is frozen here.
    pub fn create_proposal(
        &mut self,
        proposer: OwnerId,
        threshold: ThresholdKind,
        voting_window_secs: Option<u64>,
    ) -> GovernanceResult<ProposalId> {
        let now = self.clock.now();
        self.proposals.create(
            &self.registry,
            &self.reputation,
            &self.config,
            proposer,
            threshold,
            voting_window_secs,
            now,
        )
    }

    /// Cast an owner's vote on a proposal.
    pub fn cast_vote(
        &mut self,
        proposal_id: ProposalId,
        voter: OwnerId,
        in_favor: bool,
    ) -> GovernanceResult<()> {
        let now = self.clock.now();
        self.proposals.cast_vote(proposal_id, voter, in_favor, now)
    }

    /// Finalize a proposal after its deadline.
    pub fn finalize_proposal(&mut self, proposal_id: ProposalId) -> GovernanceResult<ProposalStatus> {
        let now = self.clock.now();
        self.proposals.finalize(&self.config, proposal_id, now)
    }

    /// Mark an approved proposal executed.
    pub fn execute_proposal(&mut self, proposal_id: ProposalId) -> GovernanceResult<()> {
        let now = self.clock.now();
        self.proposals.execute(proposal_id, now)
    }

    /// Look up a proposal.
    pub fn proposal(&self, proposal_id: ProposalId) -> GovernanceResult<&Proposal> {
        self.proposals.proposal(proposal_id)
    }

    /// All proposals, newest first.
    pub fn list_proposals(&self) -> Vec<&Proposal> {
        self.proposals.list()
    }

    /// Votes recorded for a proposal.
    pub fn proposal_votes(&self, proposal_id: ProposalId) -> GovernanceResult<Vec<&Vote>> {
        self.proposals.votes(proposal_id)
    }

    // ── Promotion operations ──

    /// Open a promotion application for an entity.
    pub fn apply_for_promotion(
        &mut self,
        entity_id: EntityId,
        target_tier: Tier,
    ) -> GovernanceResult<ApplicationId> {
        let now = self.clock.now();
        self.promotions.apply(
            &self.registry,
            &self.reputation,
            &self.config,
            entity_id,
            target_tier,
            now,
        )
    }

    /// Cast an incumbent entity's vote on an application.
    pub fn vote_on_application(
        &mut self,
        application_id: ApplicationId,
        voter_entity: EntityId,
        in_favor: bool,
    ) -> GovernanceResult<()> {
        let now = self.clock.now();
        self.promotions
            .vote(application_id, voter_entity, in_favor, now)
    }

    /// Finalize an application after its deadline; approval applies the
    /// tier change.
    pub fn finalize_application(
        &mut self,
        application_id: ApplicationId,
    ) -> GovernanceResult<ApplicationStatus> {
        let now = self.clock.now();
        self.promotions
            .finalize(&mut self.registry, &self.config, application_id, now)
    }

    /// Look up an application.
    pub fn application(
        &self,
        application_id: ApplicationId,
    ) -> GovernanceResult<&PromotionApplication> {
        self.promotions.application(application_id)
    }

    /// All applications, newest first.
    pub fn list_applications(&self) -> Vec<&PromotionApplication> {
        self.promotions.list()
    }

    /// Votes recorded for an application.
    pub fn application_votes(
        &self,
        application_id: ApplicationId,
    ) -> GovernanceResult<Vec<&ApplicationVote>> {
        self.promotions.votes(application_id)
    }

    /// The tier-change audit log, oldest first.
    pub fn tier_changes(&self) -> &[TierChange] {
        self.promotions.tier_changes()
    }

    // ── Maintenance ──

    /// Finalize every proposal and application whose deadline has passed.
    /// Intended for a periodic sweep by the hosting node.
    pub fn process_due(
        &mut self,
    ) -> (
        Vec<(ProposalId, ProposalStatus)>,
        Vec<(ApplicationId, ApplicationStatus)>,
    ) {
        let now = self.clock.now();
        let proposals = self.proposals.process_due(&self.config, now);
        let applications = self
            .promotions
            .process_due(&mut self.registry, &self.config, now);
        if !proposals.is_empty() || !applications.is_empty() {
            debug!(
                proposals = proposals.len(),
                applications = applications.len(),
                "deadline sweep finalized items"
            );
        }
        (proposals, applications)
    }
}
