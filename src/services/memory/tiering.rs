//! Age-Based Tiering
//!
//! Classifies artifacts and events into hot/warm/cold/archived bands by age
//! and decides when compaction is due. Nothing here deletes data: archiving
//! only marks eligibility for a retention sweep run by the caller.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::services::memory::store::ArtifactStore;
use crate::utils::error::{AppError, AppResult};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Storage tier of a piece of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Hot,
    Warm,
    Cold,
    Archived,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Hot => write!(f, "hot"),
            Tier::Warm => write!(f, "warm"),
            Tier::Cold => write!(f, "cold"),
            Tier::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hot" => Ok(Tier::Hot),
            "warm" => Ok(Tier::Warm),
            "cold" => Ok(Tier::Cold),
            "archived" => Ok(Tier::Archived),
            _ => Err(format!("Unknown tier: {}", s)),
        }
    }
}

/// Retention and compaction thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPolicy {
    /// Database size above which compaction is due
    pub max_db_size_mb: u64,
    /// Events older than this are due for compaction
    pub event_retention_days: i64,
    /// Events folded into one summary
    pub compaction_ratio: usize,
    /// Age at which data becomes archivable
    pub archive_after_days: i64,
    /// Whether schedulers should compact without being asked
    pub auto_compact: bool,
    /// Upper bound (exclusive) of the hot band
    pub hot_days: i64,
    /// Upper bound (exclusive) of the warm band
    pub warm_days: i64,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            max_db_size_mb: 100,
            event_retention_days: 90,
            compaction_ratio: 10,
            archive_after_days: 180,
            auto_compact: true,
            hot_days: 30,
            warm_days: 90,
        }
    }
}

impl TierPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.compaction_ratio == 0 {
            return Err("tier_policy.compaction_ratio must be positive".to_string());
        }
        if self.max_db_size_mb == 0 {
            return Err("tier_policy.max_db_size_mb must be positive".to_string());
        }
        if self.hot_days <= 0 || self.event_retention_days <= 0 {
            return Err("tier_policy day thresholds must be positive".to_string());
        }
        if self.hot_days >= self.warm_days {
            return Err("tier_policy.hot_days must be less than warm_days".to_string());
        }
        if self.archive_after_days < self.warm_days {
            return Err(
                "tier_policy.archive_after_days must not be less than warm_days".to_string(),
            );
        }
        Ok(())
    }

    /// Oldest timestamp still inside the event retention window.
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.event_retention_days)
    }
}

/// Per-tier counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    pub hot: usize,
    pub warm: usize,
    pub cold: usize,
    pub archived: usize,
}

impl TierStats {
    pub fn total(&self) -> usize {
        self.hot + self.warm + self.cold + self.archived
    }

    pub fn count(&self, tier: Tier) -> usize {
        match tier {
            Tier::Hot => self.hot,
            Tier::Warm => self.warm,
            Tier::Cold => self.cold,
            Tier::Archived => self.archived,
        }
    }

    fn slot(&mut self, tier: Tier) -> &mut usize {
        match tier {
            Tier::Hot => &mut self.hot,
            Tier::Warm => &mut self.warm,
            Tier::Cold => &mut self.cold,
            Tier::Archived => &mut self.archived,
        }
    }
}

/// Classifies data into tiers and tracks tier counts.
///
/// Invoked synchronously by the caller; it never schedules work itself.
#[derive(Debug, Clone)]
pub struct TierManager {
    policy: TierPolicy,
    stats: TierStats,
}

impl TierManager {
    pub fn new(policy: TierPolicy) -> AppResult<Self> {
        policy.validate().map_err(AppError::validation)?;
        Ok(Self {
            policy,
            stats: TierStats::default(),
        })
    }

    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    pub fn stats(&self) -> TierStats {
        self.stats
    }

    /// Tier of data last written at `timestamp`.
    ///
    /// Timestamps in the future count as age zero.
    pub fn classify(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Tier {
        let age_days = (now - timestamp).num_days().max(0);
        if age_days < self.policy.hot_days {
            Tier::Hot
        } else if age_days < self.policy.warm_days {
            Tier::Warm
        } else if age_days < self.policy.archive_after_days {
            Tier::Cold
        } else {
            Tier::Archived
        }
    }

    /// Whether data written at `timestamp` is old enough to archive.
    pub fn is_archivable(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.classify(timestamp, now) == Tier::Archived
    }

    /// Count one more item in `tier`.
    pub fn record(&mut self, tier: Tier) {
        *self.stats.slot(tier) += 1;
    }

    /// Move one item between tiers.
    pub fn move_to_tier(&mut self, from: Tier, to: Tier) -> AppResult<()> {
        if from == to {
            return Ok(());
        }
        let source = self.stats.slot(from);
        if *source == 0 {
            return Err(AppError::validation(format!(
                "no items in tier '{}' to move to '{}'",
                from, to
            )));
        }
        *source -= 1;
        *self.stats.slot(to) += 1;
        tracing::debug!(from = %from, to = %to, "Moved item between tiers");
        Ok(())
    }

    /// Mark one item of `from` as archived.
    pub fn archive(&mut self, from: Tier) -> AppResult<()> {
        self.move_to_tier(from, Tier::Archived)
    }

    /// Bring one archived item back into the hot tier.
    pub fn restore(&mut self) -> AppResult<()> {
        self.move_to_tier(Tier::Archived, Tier::Hot)
    }

    /// Recount every stored artifact by its `indexed_at`.
    pub fn rebuild_stats(&mut self, store: &ArtifactStore, now: DateTime<Utc>) -> AppResult<TierStats> {
        let mut stats = TierStats::default();
        for artifact in store.list_all()? {
            *stats.slot(self.classify(artifact.indexed_at, now)) += 1;
        }
        self.stats = stats;
        tracing::debug!(
            hot = stats.hot,
            warm = stats.warm,
            cold = stats.cold,
            archived = stats.archived,
            "Rebuilt tier statistics"
        );
        Ok(stats)
    }

    /// Compaction is due when the database is over its size budget, or when
    /// any event is older than the retention window. Either alone suffices.
    pub fn needs_compaction(
        &self,
        db_size_bytes: u64,
        oldest_event: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let over_size = db_size_bytes > self.policy.max_db_size_mb.saturating_mul(BYTES_PER_MB);
        let expired = oldest_event
            .map(|ts| ts < self.policy.retention_cutoff(now))
            .unwrap_or(false);
        over_size || expired
    }

    /// `needs_compaction` gated by the policy's `auto_compact` switch.
    pub fn should_auto_compact(
        &self,
        db_size_bytes: u64,
        oldest_event: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        self.policy.auto_compact && self.needs_compaction(db_size_bytes, oldest_event, now)
    }
}
