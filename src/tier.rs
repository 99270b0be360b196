//! Capability tiers
//!
//! Tiers form an ordered ladder. Each tier carries a voting multiplier and
//! promotion thresholds, all of which live in [`crate::config::TierParams`]
//! rather than on the enum itself so deployments can tune them.

use serde::{Deserialize, Serialize};

/// An ordered capability level.
///
/// `Tier::None` is the floor for entities that have not yet been admitted to
/// the ladder; it cannot be assigned at registration and carries no voting
/// weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Not yet admitted; zero voting weight
    None,
    /// Entry tier
    Base,
    /// Mid tier
    Validator,
    /// Upper tier
    Guardian,
    /// Top tier
    Oracle,
}

impl Tier {
    /// All tiers in ascending order.
    pub const ALL: [Tier; 5] = [
        Tier::None,
        Tier::Base,
        Tier::Validator,
        Tier::Guardian,
        Tier::Oracle,
    ];

    /// Position on the ladder, used to index per-tier configuration.
    pub fn index(self) -> usize {
        match self {
            Tier::None => 0,
            Tier::Base => 1,
            Tier::Validator => 2,
            Tier::Guardian => 3,
            Tier::Oracle => 4,
        }
    }

    /// The tier immediately above this one, if any.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::None => Some(Tier::Base),
            Tier::Base => Some(Tier::Validator),
            Tier::Validator => Some(Tier::Guardian),
            Tier::Guardian => Some(Tier::Oracle),
            Tier::Oracle => None,
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::None
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Tier::None => "none",
            Tier::Base => "base",
            Tier::Validator => "validator",
            Tier::Guardian => "guardian",
            Tier::Oracle => "oracle",
        };
        write!(f, "{}", name)
    }
}
