//! Adaptive complexity tiers.
//!
//! Boundaries start at `low_max=3, med_max=6` and are re-derived from the
//! outcome log once enough `(complexity, iterations)` samples exist.
//! Invariant: `1 <= low_max < med_max <= 8`.

use crate::error::Result;
use crate::outcome::OutcomeRecord;
use crate::{io, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    pub fn all() -> [Tier; 3] {
        [Tier::Low, Tier::Medium, Tier::High]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Low => "low",
            Tier::Medium => "medium",
            Tier::High => "high",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ComplexityBuckets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityBuckets {
    pub low_max: u32,
    pub med_max: u32,
    #[serde(default)]
    pub samples: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl Default for ComplexityBuckets {
    fn default() -> Self {
        Self {
            low_max: 3,
            med_max: 6,
            samples: 0,
            updated: None,
        }
    }
}

impl ComplexityBuckets {
    pub fn load(root: &Path) -> Self {
        let b: Self =
            io::load_json_or_default(&paths::model_path(root, paths::COMPLEXITY_CLUSTERS_FILE));
        if b.is_valid() {
            b
        } else {
            tracing::warn!(
                low_max = b.low_max,
                med_max = b.med_max,
                "persisted complexity boundaries out of range, using defaults"
            );
            Self::default()
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        io::write_json(
            &paths::model_path(root, paths::COMPLEXITY_CLUSTERS_FILE),
            self,
        )
    }

    pub fn is_valid(&self) -> bool {
        1 <= self.low_max && self.low_max < self.med_max && self.med_max <= 8
    }

    pub fn tier_for(&self, complexity: f64) -> Tier {
        if complexity <= self.low_max as f64 {
            Tier::Low
        } else if complexity <= self.med_max as f64 {
            Tier::Medium
        } else {
            Tier::High
        }
    }
}

/// Re-derive boundaries from the outcome log.
///
/// Returns `None` (keep current boundaries) when fewer than `min_samples`
/// rows have `iterations > 0`.
pub fn rebucket(
    outcomes: &[OutcomeRecord],
    min_samples: usize,
    now: DateTime<Utc>,
) -> Option<ComplexityBuckets> {
    let mut complexities: Vec<u32> = outcomes
        .iter()
        .filter(|r| r.iterations > 0)
        .map(|r| r.complexity)
        .collect();
    let n = complexities.len();
    if n < min_samples.max(3) {
        tracing::debug!(samples = n, min_samples, "not enough samples to rebucket");
        return None;
    }
    complexities.sort_unstable();

    let low_max = complexities[n / 3 - 1].clamp(1, 5);
    let med_max = complexities[2 * n / 3 - 1].clamp(low_max + 1, 8);

    tracing::info!(low_max, med_max, samples = n, "complexity boundaries updated");
    Some(ComplexityBuckets {
        low_max,
        med_max,
        samples: n,
        updated: Some(now),
    })
}
