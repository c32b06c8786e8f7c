use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A migration that ran against a target, as stored in its ledger.
///
/// Records order by `version`, the migration's intrinsic position, never by
/// the time they executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    #[serde(rename = "@type")]
    pub migration_type: String,
    pub version: u64,
    #[serde(rename = "executedAt")]
    pub executed_at: DateTime<Utc>,
}

impl MigrationRecord {
    pub fn new(migration_type: impl Into<String>, version: u64) -> Self {
        Self {
            migration_type: migration_type.into(),
            version,
            executed_at: Utc::now(),
        }
    }

    pub fn executed_at(mut self, executed_at: DateTime<Utc>) -> Self {
        self.executed_at = executed_at;
        self
    }
}

impl Ord for MigrationRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| self.migration_type.cmp(&other.migration_type))
            .then_with(|| self.executed_at.cmp(&other.executed_at))
    }
}

impl PartialOrd for MigrationRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
