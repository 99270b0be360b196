//! Proposal engine
//!
//! General governance proposals with an open electorate. A proposal freezes
//! a power snapshot at creation; every vote weight is read from that
//! snapshot, never from live state. Status is a finite state machine:
//! `Pending → Approved | Rejected → Executed`, immutable once finalized.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{GovernanceConfig, ThresholdKind};
use crate::error::{GovernanceError, GovernanceResult};
use crate::governance::resolve_outcome;
use crate::identity::{IdentityRegistry, OwnerId};
use crate::power::{weighted_reputation, PowerSnapshot};
use crate::reputation::ReputationStore;

/// Sequential proposal id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProposalId(pub u64);

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Open for voting until the deadline
    Pending,
    /// Finalized with a passing tally
    Approved,
    /// Finalized with a failing tally
    Rejected,
    /// Approved and marked executed by a collaborator
    Executed,
}

/// A governance proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Engine-assigned id
    pub id: ProposalId,
    /// Owner that created the proposal
    pub proposer: OwnerId,
    /// Unix seconds at creation; also the snapshot instant
    pub created_at: u64,
    /// Unix seconds after which votes are rejected
    pub voting_deadline: u64,
    /// Threshold the tally is compared against at finalization
    pub threshold: ThresholdKind,
    /// Weighted tally in favor
    pub votes_for: u128,
    /// Weighted tally against
    pub votes_against: u128,
    /// Current lifecycle state
    pub status: ProposalStatus,
    /// Unix seconds of finalization, if any
    pub finalized_at: Option<u64>,
    /// Power snapshot frozen at creation
    pub snapshot: PowerSnapshot,
}

/// A recorded vote. At most one per `(proposal, owner)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// The proposal voted on
    pub proposal_id: ProposalId,
    /// The voting owner
    pub voter: OwnerId,
    /// Capped power at the proposal's snapshot
    pub weight: u128,
    /// Direction of the vote
    pub in_favor: bool,
    /// Unix seconds at which the vote was cast
    pub cast_at: u64,
}

/// Manages proposal state. Reads identity and reputation state through the
/// calculator; writes only its own tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalEngine {
    proposals: HashMap<ProposalId, Proposal>,
    votes: HashMap<ProposalId, HashMap<OwnerId, Vote>>,
    next_id: u64,
}

impl ProposalEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a proposal and take its power snapshot.
    ///
    /// The proposer must clear the weighted-reputation gate; the weighted
    /// average (not the best single entity) is what counts, so spreading
    /// stake over throwaway identities does not help.
    pub fn create(
        &mut self,
        registry: &IdentityRegistry,
        store: &ReputationStore,
        config: &GovernanceConfig,
        proposer: OwnerId,
        threshold: ThresholdKind,
        voting_window_secs: Option<u64>,
        now: u64,
    ) -> GovernanceResult<ProposalId> {
        let reputation = weighted_reputation(registry, store, config, &proposer, now);
        if reputation < config.proposal_reputation_min_bp {
            return Err(GovernanceError::NotEligibleProposer(proposer));
        }

        let snapshot = PowerSnapshot::capture(registry, store, config, now)?;
        let window = voting_window_secs.unwrap_or(config.default_voting_window_secs);

        let id = ProposalId(self.next_id);
        self.next_id += 1;

        let proposal = Proposal {
            id,
            proposer: proposer.clone(),
            created_at: now,
            voting_deadline: now + window,
            threshold,
            votes_for: 0,
            votes_against: 0,
            status: ProposalStatus::Pending,
            finalized_at: None,
            snapshot,
        };
        self.proposals.insert(id, proposal);

        info!(proposal = %id, proposer = %proposer, ?threshold, "proposal created");
        Ok(id)
    }

    /// Cast a vote. The weight is the voter's capped power in the
    /// proposal's snapshot; owners absent from the snapshot weigh zero but
    /// the vote is still recorded.
    pub fn cast_vote(
        &mut self,
        id: ProposalId,
        voter: OwnerId,
        in_favor: bool,
        now: u64,
    ) -> GovernanceResult<()> {
        let proposal = self
            .proposals
            .get_mut(&id)
            .ok_or(GovernanceError::ProposalNotFound(id))?;

        if proposal.status != ProposalStatus::Pending || now > proposal.voting_deadline {
            return Err(GovernanceError::VotingClosed);
        }

        let ballots = self.votes.entry(id).or_default();
        if ballots.contains_key(&voter) {
            return Err(GovernanceError::AlreadyVoted);
        }

        let weight = proposal.snapshot.power_of(&voter);
        if in_favor {
            proposal.votes_for += weight;
        } else {
            proposal.votes_against += weight;
        }
        ballots.insert(
            voter.clone(),
            Vote {
                proposal_id: id,
                voter: voter.clone(),
                weight,
                in_favor,
                cast_at: now,
            },
        );

        debug!(proposal = %id, voter = %voter, in_favor, weight, "vote recorded");
        Ok(())
    }

    /// Finalize a proposal after its deadline.
    ///
    /// Simple majority passes on strictly more weight in favor;
    /// supermajority passes at or above the configured ratio. A zero-vote
    /// tally resolves per the shared zero-vote policy. Finalization is
    /// terminal: a second call is a state conflict.
    pub fn finalize(
        &mut self,
        config: &GovernanceConfig,
        id: ProposalId,
        now: u64,
    ) -> GovernanceResult<ProposalStatus> {
        let proposal = self
            .proposals
            .get_mut(&id)
            .ok_or(GovernanceError::ProposalNotFound(id))?;

        if proposal.status != ProposalStatus::Pending {
            return Err(GovernanceError::VotingClosed);
        }
        if now <= proposal.voting_deadline {
            return Err(GovernanceError::VotingStillOpen {
                deadline: proposal.voting_deadline,
            });
        }

        let approved = resolve_outcome(
            proposal.votes_for,
            proposal.votes_against,
            proposal.threshold,
            config,
        );
        proposal.status = if approved {
            ProposalStatus::Approved
        } else {
            ProposalStatus::Rejected
        };
        proposal.finalized_at = Some(now);

        info!(
            proposal = %id,
            status = ?proposal.status,
            votes_for = proposal.votes_for,
            votes_against = proposal.votes_against,
            "proposal finalized"
        );
        Ok(proposal.status)
    }

    /// Mark an approved proposal executed. The engine records the status
    /// transition only; carrying out the proposal's effect belongs to the
    /// calling collaborator.
    pub fn execute(&mut self, id: ProposalId, now: u64) -> GovernanceResult<()> {
        let proposal = self
            .proposals
            .get_mut(&id)
            .ok_or(GovernanceError::ProposalNotFound(id))?;
        match proposal.status {
            ProposalStatus::Approved => {
                proposal.status = ProposalStatus::Executed;
                info!(proposal = %id, at = now, "proposal executed");
                Ok(())
            }
            ProposalStatus::Pending => Err(GovernanceError::VotingStillOpen {
                deadline: proposal.voting_deadline,
            }),
            _ => Err(GovernanceError::VotingClosed),
        }
    }

    /// Look up a proposal.
    pub fn proposal(&self, id: ProposalId) -> GovernanceResult<&Proposal> {
        self.proposals
            .get(&id)
            .ok_or(GovernanceError::ProposalNotFound(id))
    }

    /// All proposals, newest first.
    pub fn list(&self) -> Vec<&Proposal> {
        let mut all: Vec<&Proposal> = self.proposals.values().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Votes recorded for a proposal.
    pub fn votes(&self, id: ProposalId) -> GovernanceResult<Vec<&Vote>> {
        self.proposal(id)?;
        Ok(self
            .votes
            .get(&id)
            .map(|ballots| ballots.values().collect())
            .unwrap_or_default())
    }

    /// Finalize every pending proposal whose deadline has passed. Returns
    /// the transitions made.
    pub fn process_due(
        &mut self,
        config: &GovernanceConfig,
        now: u64,
    ) -> Vec<(ProposalId, ProposalStatus)> {
        let due: Vec<ProposalId> = self
            .proposals
            .values()
            .filter(|p| p.status == ProposalStatus::Pending && p.voting_deadline < now)
            .map(|p| p.id)
            .collect();

        let mut transitions = Vec::new();
        for id in due {
            if let Ok(status) = self.finalize(config, id, now) {
                transitions.push((id, status));
            }
        }
        transitions
    }
}
