//! hrag Quota - Daily per-user allowances
//!
//! Each user gets a fixed number of uploads and queries per UTC day. Three
//! keys per user are kept in the counter store:
//!
//! - `user:{id}:pdf_count`
//! - `query:{id}:query_count`
//! - `user:{id}:updated_at` (last counted action, RFC 3339)
//!
//! When `updated_at` falls on an earlier day both counters are dropped
//! before the next increment, so allowances renew lazily on first use.
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use hrag_core::{HragError, LimitsConfig, Namespace, QuotaKind, Result};
use serde::Serialize;
use tracing::{debug, warn};

pub mod history;
pub mod store;

pub use history::{HistoryEntry, QueryHistory};
pub use store::{CounterStore, MemoryCounterStore, RedisCounterStore};

// ============================================================================
// Keys
// ============================================================================

fn count_key(namespace: &Namespace, kind: QuotaKind) -> String {
    match kind {
        QuotaKind::Upload => format!("user:{namespace}:pdf_count"),
        QuotaKind::Query => format!("query:{namespace}:query_count"),
    }
}

fn updated_key(namespace: &Namespace) -> String {
    format!("user:{namespace}:updated_at")
}

/// Parse a stored timestamp; naive values are read as UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ============================================================================
// Decisions
// ============================================================================

/// Daily limits
#[derive(Debug, Clone, Copy)]
pub struct QuotaLimits {
    pub uploads_per_day: u32,
    pub queries_per_day: u32,
}

impl QuotaLimits {
    pub fn limit(&self, kind: QuotaKind) -> u32 {
        match kind {
            QuotaKind::Upload => self.uploads_per_day,
            QuotaKind::Query => self.queries_per_day,
        }
    }
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for QuotaLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            uploads_per_day: config.uploads_per_day,
            queries_per_day: config.queries_per_day,
        }
    }
}

/// Outcome of one counted action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaDecision {
    pub kind: QuotaKind,
    pub allowed: bool,
    /// Counter value after this action
    pub used: u32,
    pub limit: u32,
}

impl QuotaDecision {
    /// Actions left today
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    /// Turn a denial into `HragError::RateLimited`
    pub fn into_result(self) -> Result<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(HragError::RateLimited {
                kind: self.kind,
                limit: self.limit,
            })
        }
    }
}

/// Today's usage for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub uploads_used: u32,
    pub uploads_limit: u32,
    pub queries_used: u32,
    pub queries_limit: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Daily Quota
// ============================================================================

/// Per-user daily counters over a `CounterStore`
#[derive(Clone)]
pub struct DailyQuota {
    store: Arc<dyn CounterStore>,
    limits: QuotaLimits,
}

impl DailyQuota {
    pub fn new(store: Arc<dyn CounterStore>, limits: QuotaLimits) -> Self {
        Self { store, limits }
    }

    /// In-memory quota with default limits
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCounterStore::new()), QuotaLimits::default())
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Count one action now
    pub async fn check(&self, namespace: &Namespace, kind: QuotaKind) -> Result<QuotaDecision> {
        self.check_at(namespace, kind, Utc::now()).await
    }

    /// Count one action at `now`
    pub async fn check_at(
        &self,
        namespace: &Namespace,
        kind: QuotaKind,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision> {
        self.reset_if_new_day(namespace, now).await?;

        let limit = self.limits.limit(kind);
        let count = self.store.incr(&count_key(namespace, kind)).await?;
        let used = u32::try_from(count.max(0)).unwrap_or(u32::MAX);

        if used > limit {
            debug!(user = %namespace, %kind, used, limit, "Daily limit exceeded");
            return Ok(QuotaDecision {
                kind,
                allowed: false,
                used,
                limit,
            });
        }

        self.store
            .set(&updated_key(namespace), &now.to_rfc3339())
            .await?;

        Ok(QuotaDecision {
            kind,
            allowed: true,
            used,
            limit,
        })
    }

    /// Current usage without counting anything
    pub async fn usage(&self, namespace: &Namespace) -> Result<QuotaUsage> {
        self.usage_at(namespace, Utc::now()).await
    }

    /// Usage as seen at `now`; counters from an earlier day read as zero
    pub async fn usage_at(&self, namespace: &Namespace, now: DateTime<Utc>) -> Result<QuotaUsage> {
        let updated_at = self.last_updated(namespace).await?;
        let current = matches!(updated_at, Some(Some(t)) if t.date_naive() == now.date_naive());

        let (uploads_used, queries_used) = if current {
            (
                self.read_count(namespace, QuotaKind::Upload).await?,
                self.read_count(namespace, QuotaKind::Query).await?,
            )
        } else {
            (0, 0)
        };

        Ok(QuotaUsage {
            uploads_used: uploads_used.min(self.limits.uploads_per_day),
            uploads_limit: self.limits.uploads_per_day,
            queries_used: queries_used.min(self.limits.queries_per_day),
            queries_limit: self.limits.queries_per_day,
            updated_at: updated_at.flatten(),
        })
    }

    /// Forget all counters of a user
    pub async fn reset(&self, namespace: &Namespace) -> Result<()> {
        self.store
            .delete(&[
                count_key(namespace, QuotaKind::Upload),
                count_key(namespace, QuotaKind::Query),
                updated_key(namespace),
            ])
            .await
    }

    /// `None` if never set, `Some(None)` if unparseable
    async fn last_updated(&self, namespace: &Namespace) -> Result<Option<Option<DateTime<Utc>>>> {
        let raw = self.store.get(&updated_key(namespace)).await?;
        Ok(raw.map(|value| {
            let parsed = parse_timestamp(&value);
            if parsed.is_none() {
                warn!(user = %namespace, value = %value, "Unreadable updated_at, treating as stale");
            }
            parsed
        }))
    }

    async fn reset_if_new_day(&self, namespace: &Namespace, now: DateTime<Utc>) -> Result<()> {
        let stale = match self.last_updated(namespace).await? {
            None => false,
            Some(Some(t)) => t.date_naive() != now.date_naive(),
            Some(None) => true,
        };

        if stale {
            debug!(user = %namespace, "New day, resetting counters");
            self.store
                .delete(&[
                    count_key(namespace, QuotaKind::Upload),
                    count_key(namespace, QuotaKind::Query),
                ])
                .await?;
        }
        Ok(())
    }

    async fn read_count(&self, namespace: &Namespace, kind: QuotaKind) -> Result<u32> {
        let raw = self.store.get(&count_key(namespace, kind)).await?;
        Ok(raw
            .and_then(|v| v.parse::<i64>().ok())
            .map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX))
            .unwrap_or(0))
    }
}

// ============================================================================
// Tests
// ============================================================================
