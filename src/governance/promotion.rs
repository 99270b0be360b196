//! Tier promotion engine
//!
//! Promotion applications are closed-electorate elections: only entities
//! already holding the target tier at the moment the application opens may
//! vote, one entity one vote. The electorate is frozen into the
//! application, so later tier churn cannot change who is eligible.
//!
//! Gatekeeping prevention: a voting window that lapses with zero votes cast
//! resolves per the same zero-vote policy the proposal engine uses, which
//! defaults to auto-approval. Incumbents cannot preserve their exclusivity
//! by silently ignoring every candidate.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GovernanceConfig;
use crate::error::{GovernanceError, GovernanceResult};
use crate::governance::resolve_outcome;
use crate::identity::{EntityId, IdentityRegistry};
use crate::reputation::ReputationStore;
use crate::tier::Tier;

/// Sequential application id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ApplicationId(pub u64);

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a promotion application.
///
/// `Approved` and `Rejected` are terminal; an approval's tier change is
/// applied in the same finalization step, so a finalized application's
/// status already reflects its effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    /// Open for incumbent votes until the deadline
    Open,
    /// Finalized; the entity was promoted
    Approved,
    /// Finalized; the entity stays at its current tier
    Rejected,
}

/// An entity's request to advance one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionApplication {
    /// Engine-assigned id
    pub id: ApplicationId,
    /// The applying entity
    pub entity_id: EntityId,
    /// Tier held when the application opened
    pub current_tier: Tier,
    /// Tier applied for; always one step above `current_tier`
    pub target_tier: Tier,
    /// Unix seconds at opening
    pub opened_at: u64,
    /// Unix seconds after which votes are rejected
    pub voting_deadline: u64,
    /// Entities eligible to vote, frozen at opening
    pub electorate: BTreeSet<EntityId>,
    /// Votes in favor (one entity, one vote)
    pub votes_for: u64,
    /// Votes against
    pub votes_against: u64,
    /// Current lifecycle state
    pub status: ApplicationStatus,
    /// Unix seconds of finalization, if any
    pub finalized_at: Option<u64>,
}

/// A recorded application vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationVote {
    /// The application voted on
    pub application_id: ApplicationId,
    /// The voting incumbent entity
    pub voter: EntityId,
    /// Direction of the vote
    pub in_favor: bool,
    /// Unix seconds at which the vote was cast
    pub cast_at: u64,
}

/// An applied tier change, kept as an audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierChange {
    /// The promoted entity
    pub entity_id: EntityId,
    /// Tier before the change
    pub from: Tier,
    /// Tier after the change
    pub to: Tier,
    /// Unix seconds of the change
    pub at: u64,
    /// Why the change happened
    pub reason: String,
}

/// Manages promotion applications and the tier-change audit log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierPromotionEngine {
    applications: HashMap<ApplicationId, PromotionApplication>,
    votes: HashMap<ApplicationId, HashMap<EntityId, ApplicationVote>>,
    /// Open application per entity; at most one at a time
    open_by_entity: HashMap<EntityId, ApplicationId>,
    /// Unix seconds of each entity's most recent rejection
    last_rejection: HashMap<EntityId, u64>,
    tier_changes: Vec<TierChange>,
    next_id: u64,
}

impl TierPromotionEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a promotion application for `entity_id` into `target_tier`.
    ///
    /// The target must be exactly one tier above the entity's current tier
    /// and the entity must be active and clear the target tier's stake and
    /// reputation floors. Re-application inside the rejection cooldown
    /// fails with `CooldownActive`; a second application while one is open
    /// fails with `ApplicationPending`.
    pub fn apply(
        &mut self,
        registry: &IdentityRegistry,
        store: &ReputationStore,
        config: &GovernanceConfig,
        entity_id: EntityId,
        target_tier: Tier,
        now: u64,
    ) -> GovernanceResult<ApplicationId> {
        let entity = registry.entity(entity_id)?;

        // Index entries are removed at finalization, so an entry here is
        // always a still-open application.
        if self.open_by_entity.contains_key(&entity_id) {
            return Err(GovernanceError::ApplicationPending(entity_id));
        }
        if let Some(rejected_at) = self.last_rejection.get(&entity_id) {
            let until = rejected_at + config.reapplication_cooldown_secs;
            if now < until {
                return Err(GovernanceError::CooldownActive { until });
            }
        }

        if !entity.active {
            return Err(GovernanceError::RequirementsNotMet(format!(
                "entity {} is inactive",
                entity_id
            )));
        }
        if entity.tier.next() != Some(target_tier) {
            return Err(GovernanceError::RequirementsNotMet(format!(
                "cannot move from {} to {}; promotions advance one tier",
                entity.tier, target_tier
            )));
        }

        let params = config.tier(target_tier);
        let stake = entity.total_stake();
        if stake < params.min_stake {
            return Err(GovernanceError::RequirementsNotMet(format!(
                "stake {} below the {} floor of {}",
                stake, target_tier, params.min_stake
            )));
        }
        let score = store.score_of(entity_id);
        if score < params.min_reputation_bp {
            return Err(GovernanceError::RequirementsNotMet(format!(
                "reputation {} bp below the {} floor of {} bp",
                score, target_tier, params.min_reputation_bp
            )));
        }

        // Freeze the electorate: incumbents of the target tier, minus the
        // applicant itself should it somehow already sit there.
        let mut electorate = registry.active_entities_at_tier(target_tier);
        electorate.remove(&entity_id);

        let id = ApplicationId(self.next_id);
        self.next_id += 1;

        let application = PromotionApplication {
            id,
            entity_id,
            current_tier: entity.tier,
            target_tier,
            opened_at: now,
            voting_deadline: now + config.default_voting_window_secs,
            electorate,
            votes_for: 0,
            votes_against: 0,
            status: ApplicationStatus::Open,
            finalized_at: None,
        };
        self.applications.insert(id, application);
        self.open_by_entity.insert(entity_id, id);

        info!(application = %id, entity = %entity_id, target = %target_tier, "promotion application opened");
        Ok(id)
    }

    /// Cast an incumbent's vote on an application. Eligibility comes from
    /// the electorate frozen at opening.
    pub fn vote(
        &mut self,
        id: ApplicationId,
        voter: EntityId,
        in_favor: bool,
        now: u64,
    ) -> GovernanceResult<()> {
        let application = self
            .applications
            .get_mut(&id)
            .ok_or(GovernanceError::ApplicationNotFound(id))?;

        if application.status != ApplicationStatus::Open || now > application.voting_deadline {
            return Err(GovernanceError::VotingClosed);
        }
        if !application.electorate.contains(&voter) {
            return Err(GovernanceError::NotEligibleVoter(voter));
        }

        let ballots = self.votes.entry(id).or_default();
        if ballots.contains_key(&voter) {
            return Err(GovernanceError::AlreadyVoted);
        }

        if in_favor {
            application.votes_for += 1;
        } else {
            application.votes_against += 1;
        }
        ballots.insert(
            voter,
            ApplicationVote {
                application_id: id,
                voter,
                in_favor,
                cast_at: now,
            },
        );

        debug!(application = %id, voter = %voter, in_favor, "application vote recorded");
        Ok(())
    }

    /// Finalize an application after its deadline.
    ///
    /// The threshold comes from the target tier's configuration. Approval
    /// writes the new tier through the registry and appends a tier-change
    /// audit record; rejection starts the re-application cooldown.
    pub fn finalize(
        &mut self,
        registry: &mut IdentityRegistry,
        config: &GovernanceConfig,
        id: ApplicationId,
        now: u64,
    ) -> GovernanceResult<ApplicationStatus> {
        let application = self
            .applications
            .get_mut(&id)
            .ok_or(GovernanceError::ApplicationNotFound(id))?;

        if application.status != ApplicationStatus::Open {
            return Err(GovernanceError::VotingClosed);
        }
        if now <= application.voting_deadline {
            return Err(GovernanceError::VotingStillOpen {
                deadline: application.voting_deadline,
            });
        }

        let approved = resolve_outcome(
            u128::from(application.votes_for),
            u128::from(application.votes_against),
            config.tier(application.target_tier).promotion_threshold,
            config,
        );

        application.finalized_at = Some(now);
        self.open_by_entity.remove(&application.entity_id);

        if approved {
            application.status = ApplicationStatus::Approved;
            registry.set_tier(application.entity_id, application.target_tier)?;
            let zero_votes = application.votes_for + application.votes_against == 0;
            self.tier_changes.push(TierChange {
                entity_id: application.entity_id,
                from: application.current_tier,
                to: application.target_tier,
                at: now,
                reason: if zero_votes {
                    "promotion auto-approved: no incumbent votes cast".to_string()
                } else {
                    format!(
                        "promotion election passed {} to {}",
                        application.votes_for, application.votes_against
                    )
                },
            });
        } else {
            application.status = ApplicationStatus::Rejected;
            self.last_rejection.insert(application.entity_id, now);
        }

        info!(
            application = %id,
            entity = %application.entity_id,
            status = ?application.status,
            votes_for = application.votes_for,
            votes_against = application.votes_against,
            "application finalized"
        );
        Ok(application.status)
    }

    /// Look up an application.
    pub fn application(&self, id: ApplicationId) -> GovernanceResult<&PromotionApplication> {
        self.applications
            .get(&id)
            .ok_or(GovernanceError::ApplicationNotFound(id))
    }

    /// All applications, newest first.
    pub fn list(&self) -> Vec<&PromotionApplication> {
        let mut all: Vec<&PromotionApplication> = self.applications.values().collect();
        all.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
        all
    }

    /// Votes recorded for an application.
    pub fn votes(&self, id: ApplicationId) -> GovernanceResult<Vec<&ApplicationVote>> {
        self.application(id)?;
        Ok(self
            .votes
            .get(&id)
            .map(|ballots| ballots.values().collect())
            .unwrap_or_default())
    }

    /// The tier-change audit log, oldest first.
    pub fn tier_changes(&self) -> &[TierChange] {
        &self.tier_changes
    }

    /// Finalize every open application whose deadline has passed. Returns
    /// the transitions made.
    pub fn process_due(
        &mut self,
        registry: &mut IdentityRegistry,
        config: &GovernanceConfig,
        now: u64,
    ) -> Vec<(ApplicationId, ApplicationStatus)> {
        let due: Vec<ApplicationId> = self
            .applications
            .values()
            .filter(|a| a.status == ApplicationStatus::Open && a.voting_deadline < now)
            .map(|a| a.id)
            .collect();

        let mut transitions = Vec::new();
        for id in due {
            if let Ok(status) = self.finalize(registry, config, id, now) {
                transitions.push((id, status));
            }
        }
        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZeroVotePolicy;
    use crate::identity::OwnerId;
    use std::collections::BTreeMap;

    fn test_config() -> GovernanceConfig {
        GovernanceConfig {
            default_voting_window_secs: 100,
            reapplication_cooldown_secs: 1_000,
            ..GovernanceConfig::default()
        }
    }

    fn seed_entity(
        registry: &mut IdentityRegistry,
        store: &mut ReputationStore,
        owner: &str,
        tier: Tier,
        stake: u64,
        score: u32,
    ) -> EntityId {
        let id = registry
            .register_entity(OwnerId::new(owner), tier, stake, 0, None)
            .unwrap();
        if score > 0 {
            store
                .submit_update(id, BTreeMap::from([("overall".to_string(), score)]), 1)
                .unwrap();
        }
        id
    }

    // A Base entity qualified for Validator, plus `incumbents` Validators.
    fn setup(
        incumbents: usize,
    ) -> (
        IdentityRegistry,
        ReputationStore,
        GovernanceConfig,
        EntityId,
        Vec<EntityId>,
    ) {
        let mut registry = IdentityRegistry::new();
        let mut store = ReputationStore::new();
        let config = test_config();
        let applicant = seed_entity(
            &mut registry,
            &mut store,
            "applicant",
            Tier::Base,
            20_000,
            5_000,
        );
        let voters = (0..incumbents)
            .map(|i| {
                seed_entity(
                    &mut registry,
                    &mut store,
                    &format!("incumbent-{}", i),
                    Tier::Validator,
                    20_000,
                    5_000,
                )
            })
            .collect();
        (registry, store, config, applicant, voters)
    }

    #[test]
    fn application_requires_the_next_tier() {
        let (registry, store, config, applicant, _) = setup(1);
        let mut engine = TierPromotionEngine::new();
        let err = engine
            .apply(&registry, &store, &config, applicant, Tier::Guardian, 10)
            .unwrap_err();
        assert!(matches!(err, GovernanceError::RequirementsNotMet(_)));
    }

    #[test]
    fn application_requires_stake_and_reputation_floors() {
        let mut registry = IdentityRegistry::new();
        let mut store = ReputationStore::new();
        let config = test_config();
        let poor = seed_entity(&mut registry, &mut store, "poor", Tier::Base, 100, 9_000);
        let unknown = seed_entity(&mut registry, &mut store, "new", Tier::Base, 20_000, 0);

        let mut engine = TierPromotionEngine::new();
        assert!(matches!(
            engine
                .apply(&registry, &store, &config, poor, Tier::Validator, 10)
                .unwrap_err(),
            GovernanceError::RequirementsNotMet(_)
        ));
        assert!(matches!(
            engine
                .apply(&registry, &store, &config, unknown, Tier::Validator, 10)
                .unwrap_err(),
            GovernanceError::RequirementsNotMet(_)
        ));
    }

    #[test]
    fn election_promotes_on_majority() {
        let (mut registry, store, config, applicant, voters) = setup(3);
        let mut engine = TierPromotionEngine::new();
        let id = engine
            .apply(&registry, &store, &config, applicant, Tier::Validator, 10)
            .unwrap();

        engine.vote(id, voters[0], true, 20).unwrap();
        engine.vote(id, voters[1], true, 20).unwrap();
        engine.vote(id, voters[2], false, 20).unwrap();

        let status = engine.finalize(&mut registry, &config, id, 200).unwrap();
        assert_eq!(status, ApplicationStatus::Approved);
        assert_eq!(registry.tier_of(applicant).unwrap(), Tier::Validator);

        let changes = engine.tier_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].from, Tier::Base);
        assert_eq!(changes[0].to, Tier::Validator);
    }

    #[test]
    fn electorate_is_frozen_at_opening() {
        let (mut registry, mut store, config, applicant, voters) = setup(1);
        let mut engine = TierPromotionEngine::new();
        let id = engine
            .apply(&registry, &store, &config, applicant, Tier::Validator, 10)
            .unwrap();

        // An entity promoted to Validator after the application opened is
        // not part of this electorate.
        let late = seed_entity(
            &mut registry,
            &mut store,
            "late",
            Tier::Validator,
            20_000,
            5_000,
        );
        assert_eq!(
            engine.vote(id, late, true, 20).unwrap_err(),
            GovernanceError::NotEligibleVoter(late)
        );
        engine.vote(id, voters[0], true, 20).unwrap();
    }

    #[test]
    fn outsiders_and_duplicates_are_rejected() {
        let (registry, store, config, applicant, voters) = setup(2);
        let mut engine = TierPromotionEngine::new();
        let id = engine
            .apply(&registry, &store, &config, applicant, Tier::Validator, 10)
            .unwrap();

        // The applicant is not in its own electorate.
        assert_eq!(
            engine.vote(id, applicant, true, 20).unwrap_err(),
            GovernanceError::NotEligibleVoter(applicant)
        );
        engine.vote(id, voters[0], true, 20).unwrap();
        assert_eq!(
            engine.vote(id, voters[0], true, 21).unwrap_err(),
            GovernanceError::AlreadyVoted
        );
    }

    #[test]
    fn zero_votes_auto_approve_by_default() {
        let (mut registry, store, config, applicant, _) = setup(3);
        assert_eq!(config.zero_vote_policy, ZeroVotePolicy::AutoApprove);

        let mut engine = TierPromotionEngine::new();
        let id = engine
            .apply(&registry, &store, &config, applicant, Tier::Validator, 10)
            .unwrap();
        let status = engine.finalize(&mut registry, &config, id, 200).unwrap();
        assert_eq!(status, ApplicationStatus::Approved);
        assert_eq!(registry.tier_of(applicant).unwrap(), Tier::Validator);
    }

    #[test]
    fn rejection_starts_the_cooldown() {
        let (mut registry, store, config, applicant, voters) = setup(2);
        let mut engine = TierPromotionEngine::new();
        let id = engine
            .apply(&registry, &store, &config, applicant, Tier::Validator, 10)
            .unwrap();
        engine.vote(id, voters[0], false, 20).unwrap();
        engine.vote(id, voters[1], false, 20).unwrap();

        let status = engine.finalize(&mut registry, &config, id, 200).unwrap();
        assert_eq!(status, ApplicationStatus::Rejected);
        assert_eq!(registry.tier_of(applicant).unwrap(), Tier::Base);

        // Re-applying inside the cooldown fails with the lapse time.
        assert_eq!(
            engine
                .apply(&registry, &store, &config, applicant, Tier::Validator, 500)
                .unwrap_err(),
            GovernanceError::CooldownActive { until: 1_200 }
        );
        // After the cooldown it succeeds again.
        engine
            .apply(&registry, &store, &config, applicant, Tier::Validator, 1_300)
            .unwrap();
    }

    #[test]
    fn only_one_open_application_per_entity() {
        let (registry, store, config, applicant, _) = setup(1);
        let mut engine = TierPromotionEngine::new();
        engine
            .apply(&registry, &store, &config, applicant, Tier::Validator, 10)
            .unwrap();
        assert_eq!(
            engine
                .apply(&registry, &store, &config, applicant, Tier::Validator, 20)
                .unwrap_err(),
            GovernanceError::ApplicationPending(applicant)
        );
    }

    #[test]
    fn deadline_sweep_finalizes_due_applications() {
        let (mut registry, store, config, applicant, voters) = setup(1);
        let mut engine = TierPromotionEngine::new();
        let id = engine
            .apply(&registry, &store, &config, applicant, Tier::Validator, 10)
            .unwrap();
        engine.vote(id, voters[0], true, 20).unwrap();

        let transitions = engine.process_due(&mut registry, &config, 500);
        assert_eq!(transitions, vec![(id, ApplicationStatus::Approved)]);
    }
}
