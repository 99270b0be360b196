//! Reputation store
//!
//! Owns per-entity reputation scores and their historical checkpoints.
//! Scores are bounded basis-point integers mutated only by oracle
//! submissions; the governance engines read them, at current time or at a
//! snapshot instant, and never write them.
//!
//! The historical lookup is a correctness requirement, not an optimization:
//! without it a participant could raise their reputation after a proposal
//! snapshot and retroactively inflate voting power already counted.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GovernanceError, GovernanceResult};
use crate::identity::EntityId;

/// Maximum score in basis points (100%).
pub const MAX_SCORE_BP: u32 = 10_000;

/// A recorded (timestamp, score) pair. Checkpoints are append-only and
/// strictly increasing in `at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unix seconds of the submission
    pub at: u64,
    /// Overall score at that instant, in bp
    pub score: u32,
}

/// Current reputation state for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationScore {
    /// The scored entity
    pub entity_id: EntityId,
    /// Overall score in bp, the mean of the component scores
    pub score: u32,
    /// Named sub-component scores from the latest submission, in bp
    pub components: BTreeMap<String, u32>,
    /// Timestamp of the latest submission
    pub updated_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ReputationRecord {
    latest: ReputationScore,
    checkpoints: Vec<Checkpoint>,
}

/// Store of reputation scores and checkpoints, keyed by entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReputationStore {
    records: HashMap<EntityId, ReputationRecord>,
}

impl ReputationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an oracle submission for `entity_id`.
    ///
    /// The overall score is the integer mean of the component scores.
    /// Fails with `InvalidComponents` if the breakdown is empty or any
    /// component exceeds [`MAX_SCORE_BP`], and with `StaleSubmission` if
    /// `timestamp` is not strictly newer than the last checkpoint. The
    /// monotonic-timestamp rule is what keeps checkpoints already read by a
    /// finalized proposal immutable.
    ///
    /// Returns the new overall score.
    pub fn submit_update(
        &mut self,
        entity_id: EntityId,
        components: BTreeMap<String, u32>,
        timestamp: u64,
    ) -> GovernanceResult<u32> {
        if components.is_empty() {
            return Err(GovernanceError::InvalidComponents(
                "empty component breakdown".into(),
            ));
        }
        for (name, value) in &components {
            if *value > MAX_SCORE_BP {
                return Err(GovernanceError::InvalidComponents(format!(
                    "component {} = {} exceeds {} bp",
                    name, value, MAX_SCORE_BP
                )));
            }
        }

        if let Some(record) = self.records.get(&entity_id) {
            if let Some(last) = record.checkpoints.last() {
                if timestamp <= last.at {
                    return Err(GovernanceError::StaleSubmission(entity_id));
                }
            }
        }

        // Component values are bounded by MAX_SCORE_BP so the sum fits u64
        // comfortably; the mean stays in bounds.
        let sum: u64 = components.values().map(|v| u64::from(*v)).sum();
        let score = (sum / components.len() as u64) as u32;

        let record = self
            .records
            .entry(entity_id)
            .or_insert_with(|| ReputationRecord {
                latest: ReputationScore {
                    entity_id,
                    score: 0,
                    components: BTreeMap::new(),
                    updated_at: 0,
                },
                checkpoints: Vec::new(),
            });

        record.latest.score = score;
        record.latest.components = components;
        record.latest.updated_at = timestamp;
        record.checkpoints.push(Checkpoint {
            at: timestamp,
            score,
        });

        debug!(entity = %entity_id, score, at = timestamp, "reputation updated");
        Ok(score)
    }

    /// Current score of an entity, 0 if it has never been scored.
    pub fn score_of(&self, entity_id: EntityId) -> u32 {
        self.records
            .get(&entity_id)
            .map_or(0, |record| record.latest.score)
    }

    /// The score in effect at `at`: the latest checkpoint at or before that
    /// instant, 0 before the first checkpoint. Binary search over the
    /// sorted checkpoint sequence.
    pub fn score_of_at(&self, entity_id: EntityId, at: u64) -> u32 {
        let Some(record) = self.records.get(&entity_id) else {
            return 0;
        };
        let idx = record.checkpoints.partition_point(|cp| cp.at <= at);
        if idx == 0 {
            0
        } else {
            record.checkpoints[idx - 1].score
        }
    }

    /// The latest full score record, with component breakdown.
    pub fn latest(&self, entity_id: EntityId) -> Option<&ReputationScore> {
        self.records.get(&entity_id).map(|record| &record.latest)
    }

    /// Number of checkpoints currently held for an entity.
    pub fn checkpoint_count(&self, entity_id: EntityId) -> usize {
        self.records
            .get(&entity_id)
            .map_or(0, |record| record.checkpoints.len())
    }

    /// Compact an entity's history: keep the newest `retention` checkpoints
    /// verbatim and, of the older tail, every `stride`-th entry as a
    /// periodic snapshot. `score_of_at` keeps the same interface regardless
    /// of retention.
    pub fn compact(&mut self, entity_id: EntityId, retention: usize, stride: usize) {
        let Some(record) = self.records.get_mut(&entity_id) else {
            return;
        };
        let total = record.checkpoints.len();
        if total <= retention || retention == 0 {
            return;
        }
        let cut = total - retention;
        let stride = stride.max(1);
        let mut kept: Vec<Checkpoint> = record.checkpoints[..cut]
            .iter()
            .enumerate()
            .filter(|(i, _)| i % stride == 0)
            .map(|(_, cp)| *cp)
            .collect();
        kept.extend_from_slice(&record.checkpoints[cut..]);
        record.checkpoints = kept;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(pairs: &[(&str, u32)]) -> BTreeMap<String, u32> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    #[test]
    fn update_sets_mean_score() {
        let mut store = ReputationStore::new();
        let id = EntityId(1);
        let score = store
            .submit_update(id, components(&[("uptime", 8000), ("accuracy", 6000)]), 100)
            .unwrap();
        assert_eq!(score, 7000);
        assert_eq!(store.score_of(id), 7000);
        assert_eq!(store.latest(id).unwrap().updated_at, 100);
    }

    #[test]
    fn out_of_bounds_component_is_rejected() {
        let mut store = ReputationStore::new();
        let err = store
            .submit_update(EntityId(1), components(&[("uptime", 10_001)]), 100)
            .unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidComponents(_)));
    }

    #[test]
    fn empty_breakdown_is_rejected() {
        let mut store = ReputationStore::new();
        let err = store
            .submit_update(EntityId(1), BTreeMap::new(), 100)
            .unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidComponents(_)));
    }

    #[test]
    fn stale_submission_is_rejected() {
        let mut store = ReputationStore::new();
        let id = EntityId(1);
        store
            .submit_update(id, components(&[("uptime", 5000)]), 100)
            .unwrap();
        let err = store
            .submit_update(id, components(&[("uptime", 6000)]), 100)
            .unwrap_err();
        assert_eq!(err, GovernanceError::StaleSubmission(id));
    }

    #[test]
    fn historical_lookup_finds_checkpoint_in_effect() {
        let mut store = ReputationStore::new();
        let id = EntityId(1);
        store
            .submit_update(id, components(&[("uptime", 2000)]), 100)
            .unwrap();
        store
            .submit_update(id, components(&[("uptime", 8000)]), 200)
            .unwrap();

        assert_eq!(store.score_of_at(id, 50), 0);
        assert_eq!(store.score_of_at(id, 100), 2000);
        assert_eq!(store.score_of_at(id, 150), 2000);
        assert_eq!(store.score_of_at(id, 200), 8000);
        assert_eq!(store.score_of_at(id, 10_000), 8000);
    }

    #[test]
    fn unknown_entity_scores_zero() {
        let store = ReputationStore::new();
        assert_eq!(store.score_of(EntityId(42)), 0);
        assert_eq!(store.score_of_at(EntityId(42), 1_000), 0);
    }

    #[test]
    fn compaction_keeps_recent_history_exact() {
        let mut store = ReputationStore::new();
        let id = EntityId(1);
        for i in 0..100u64 {
            store
                .submit_update(id, components(&[("uptime", (i as u32) * 100)]), i + 1)
                .unwrap();
        }
        store.compact(id, 10, 8);

        // Recent window is untouched.
        assert_eq!(store.score_of_at(id, 100), 9900);
        assert_eq!(store.score_of_at(id, 95), 9400);
        // Older lookups still resolve to some retained checkpoint at or
        // before the query time.
        let old = store.score_of_at(id, 50);
        assert!(old <= 4900);
        assert!(store.checkpoint_count(id) < 100);
    }
}
