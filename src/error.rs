//! Error types for governance operations
//!
//! Every public operation returns a discriminated [`GovernanceError`]; the
//! engine never panics on bad input and never uses errors as control flow.
//! [`GovernanceError::kind`] classifies each variant for callers that decide
//! retry behaviour by class rather than by variant.

use thiserror::Error;

use crate::governance::promotion::ApplicationId;
use crate::governance::proposals::ProposalId;
use crate::identity::{EntityId, OwnerId};
use crate::tier::Tier;

/// Broad classification of a governance error.
///
/// Validation and eligibility failures are never worth retrying;
/// state-conflict failures mean the caller's view is stale and a single
/// re-fetch-and-retry is reasonable; not-found failures are fatal to the
/// calling operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller-correctable input problem
    Validation,
    /// The caller's view of engine state is stale
    StateConflict,
    /// Referenced object does not exist
    NotFound,
    /// Policy rejection, not retryable
    Eligibility,
    /// Internal invariant breach; treated as fatal
    Internal,
}

/// Error type for all governance operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    /// Tier is unknown or not assignable at registration
    #[error("invalid tier: {0}")]
    InvalidTier(Tier),

    /// A reputation component is out of bounds or the breakdown is empty
    #[error("invalid reputation components: {0}")]
    InvalidComponents(String),

    /// Promotion requirements (stake, reputation, tier step) are not met
    #[error("promotion requirements not met: {0}")]
    RequirementsNotMet(String),

    /// The configured per-owner entity cap has been reached
    #[error("owner {0} has reached the configured entity limit")]
    TooManyEntities(OwnerId),

    /// A vote already exists for this voter on this item
    #[error("already voted")]
    AlreadyVoted,

    /// Reputation submission is not newer than the last checkpoint
    #[error("stale reputation submission for entity {0}")]
    StaleSubmission(EntityId),

    /// The voting window has passed or the item is already finalized
    #[error("voting is closed")]
    VotingClosed,

    /// Finalization attempted before the voting deadline
    #[error("voting is still open until {deadline}")]
    VotingStillOpen {
        /// Unix seconds at which voting closes
        deadline: u64,
    },

    /// Re-application attempted inside the rejection cooldown window
    #[error("re-application cooldown active until {until}")]
    CooldownActive {
        /// Unix seconds at which the cooldown lapses
        until: u64,
    },

    /// The entity already has an application open
    #[error("entity {0} already has an open promotion application")]
    ApplicationPending(EntityId),

    /// Unknown entity id
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Unknown proposal id
    #[error("proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    /// Unknown application id
    #[error("application not found: {0}")]
    ApplicationNotFound(ApplicationId),

    /// Proposer does not clear the weighted-reputation gate
    #[error("owner {0} is not eligible to create proposals")]
    NotEligibleProposer(OwnerId),

    /// Voter is outside the application's electorate
    #[error("entity {0} is not eligible to vote on this application")]
    NotEligibleVoter(EntityId),

    /// Internal invariant breach; the operation was aborted
    #[error("internal governance error: {0}")]
    Internal(String),
}

impl GovernanceError {
    /// The taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GovernanceError::InvalidTier(_)
            | GovernanceError::InvalidComponents(_)
            | GovernanceError::RequirementsNotMet(_)
            | GovernanceError::TooManyEntities(_) => ErrorKind::Validation,

            GovernanceError::AlreadyVoted
            | GovernanceError::StaleSubmission(_)
            | GovernanceError::VotingClosed
            | GovernanceError::VotingStillOpen { .. }
            | GovernanceError::CooldownActive { .. }
            | GovernanceError::ApplicationPending(_) => ErrorKind::StateConflict,

            GovernanceError::EntityNotFound(_)
            | GovernanceError::ProposalNotFound(_)
            | GovernanceError::ApplicationNotFound(_) => ErrorKind::NotFound,

            GovernanceError::NotEligibleProposer(_)
            | GovernanceError::NotEligibleVoter(_) => ErrorKind::Eligibility,

            GovernanceError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Result alias used throughout the crate.
pub type GovernanceResult<T> = Result<T, GovernanceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EntityId;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(
            GovernanceError::InvalidTier(Tier::None).kind(),
            ErrorKind::Validation
        );
        assert_eq!(GovernanceError::AlreadyVoted.kind(), ErrorKind::StateConflict);
        assert_eq!(
            GovernanceError::EntityNotFound(EntityId(7)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            GovernanceError::NotEligibleVoter(EntityId(1)).kind(),
            ErrorKind::Eligibility
        );
        assert_eq!(
            GovernanceError::Internal("cap underflow".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn display_is_stable() {
        let err = GovernanceError::VotingStillOpen { deadline: 42 };
        assert_eq!(err.to_string(), "voting is still open until 42");
    }
}
