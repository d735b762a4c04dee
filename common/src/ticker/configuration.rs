// Ticker configuration entity: value-semantic snapshots with partial-update merge

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Partial, wire-facing form of a ticker configuration.
///
/// All timing fields are optional: an absent field on a reconfiguration means
/// "keep the previous value". Delays are milliseconds relative to `epoch`;
/// `epoch` itself is milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerUpdate {
    pub id: String,
    #[serde(default)]
    pub epoch: Option<i64>,
    #[serde(default)]
    pub first: Option<i64>,
    #[serde(default)]
    pub interval: Option<i64>,
    #[serde(default)]
    pub last: Option<i64>,
}

impl TickerUpdate {
    /// Convenience constructor for programmatic callers (the bus collaborator
    /// deserializes updates straight from JSON instead).
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            epoch: None,
            first: None,
            interval: None,
            last: None,
        }
    }
}

/// One ticker's stored timing parameters.
///
/// Stored configurations are immutable snapshots: a merge produces a fresh
/// value, it never mutates a shared one. Invariants held by construction:
/// `first >= 0`, `interval > 0` when present, `last >= first` when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerConfiguration {
    pub id: String,
    /// Reference instant (ms since Unix epoch) `first` and `last` are measured from.
    pub epoch: i64,
    /// Delay in ms from `epoch` until the first fire is due.
    pub first: i64,
    /// Repeat period in ms; absent means one-shot.
    pub interval: Option<i64>,
    /// Delay in ms from `epoch` after which the ticker is expired and removed.
    pub last: Option<i64>,
}

fn non_negative(field: &'static str, value: Option<i64>) -> Option<i64> {
    match value {
        Some(v) if v < 0 => {
            debug!(field, value = v, "Dropping negative field from ticker update");
            None
        }
        other => other,
    }
}

impl TickerConfiguration {
    /// Build the initial configuration for an unseen ticker id.
    ///
    /// Defaults: `epoch` is the acceptance instant, `first` is 0. Negative
    /// fields are dropped and a zero `interval` means one-shot. The only hard
    /// rejection is a configuration that is stale on arrival: an expiry that
    /// already lies in the past, or a `last` earlier than `first`.
    pub fn accept(update: &TickerUpdate, now_ms: i64) -> Result<Self, ConfigurationError> {
        if update.id.is_empty() {
            return Err(ConfigurationError::EmptyId);
        }
        let epoch = update.epoch.unwrap_or(now_ms);
        let first = non_negative("first", update.first).unwrap_or(0);
        let interval = match non_negative("interval", update.interval) {
            Some(0) | None => None,
            Some(v) => Some(v),
        };
        let last = non_negative("last", update.last);
        if let Some(last) = last {
            if last < first {
                return Err(ConfigurationError::Rejected {
                    id: update.id.clone(),
                    reason: format!("last ({last}ms) lies before first ({first}ms)"),
                });
            }
            if now_ms.saturating_sub(epoch) >= last {
                return Err(ConfigurationError::Rejected {
                    id: update.id.clone(),
                    reason: format!("expiry at epoch+{last}ms already elapsed"),
                });
            }
        }
        Ok(Self {
            id: update.id.clone(),
            epoch,
            first,
            interval,
            last,
        })
    }

    /// Field-by-field merge of a partial update onto this snapshot.
    ///
    /// Defined fields overwrite, absent fields are retained and invalid
    /// fields (negative values, or a `first`/`last` pair that would cross)
    /// are dropped silently while the rest of the merge proceeds. A zero
    /// `interval` clears the repeat period, turning the ticker one-shot.
    /// An update carrying a different id is ignored entirely.
    pub fn merge(&self, update: &TickerUpdate) -> TickerConfiguration {
        if update.id != self.id {
            debug!(
                stored = %self.id,
                incoming = %update.id,
                "Ignoring update with mismatched ticker id"
            );
            return self.clone();
        }
        let mut merged = self.clone();
        if let Some(epoch) = update.epoch {
            merged.epoch = epoch;
        }
        if let Some(first) = non_negative("first", update.first) {
            if merged.last.is_some_and(|last| first > last) {
                debug!(id = %self.id, first, "Dropping first that would overtake last");
            } else {
                merged.first = first;
            }
        }
        match non_negative("interval", update.interval) {
            Some(0) => merged.interval = None,
            Some(v) => merged.interval = Some(v),
            None => {}
        }
        if let Some(last) = non_negative("last", update.last) {
            if last < merged.first {
                debug!(id = %self.id, last, "Dropping last that lies before first");
            } else {
                merged.last = Some(last);
            }
        }
        merged
    }

    /// Milliseconds elapsed since `epoch` at the given instant. Saturating:
    /// `epoch` arrives from the wire and may sit at the far ends of `i64`.
    pub fn elapsed(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.epoch)
    }

    pub fn first_reached(&self, now_ms: i64) -> bool {
        self.elapsed(now_ms) >= self.first
    }

    /// Inclusive cutoff: once `elapsed >= last` no further tick is delivered.
    pub fn expired(&self, now_ms: i64) -> bool {
        self.last.is_some_and(|last| self.elapsed(now_ms) >= last)
    }

    pub fn is_one_shot(&self) -> bool {
        self.interval.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn update(id: &str) -> TickerUpdate {
        TickerUpdate::new(id)
    }

    #[test]
    fn test_accept_applies_defaults() {
        let cfg = TickerConfiguration::accept(&update("a"), NOW).unwrap();
        assert_eq!(cfg.epoch, NOW);
        assert_eq!(cfg.first, 0);
        assert_eq!(cfg.interval, None);
        assert_eq!(cfg.last, None);
    }

    #[test]
    fn test_accept_rejects_empty_id() {
        let err = TickerConfiguration::accept(&update(""), NOW).unwrap_err();
        assert!(matches!(err, ConfigurationError::EmptyId));
    }

    #[test]
    fn test_accept_drops_negative_fields() {
        let mut u = update("a");
        u.first = Some(-5);
        u.interval = Some(-1000);
        u.last = Some(-1);
        let cfg = TickerConfiguration::accept(&u, NOW).unwrap();
        assert_eq!(cfg.first, 0);
        assert_eq!(cfg.interval, None);
        assert_eq!(cfg.last, None);
    }

    #[test]
    fn test_accept_treats_zero_interval_as_one_shot() {
        let mut u = update("a");
        u.interval = Some(0);
        let cfg = TickerConfiguration::accept(&u, NOW).unwrap();
        assert!(cfg.is_one_shot());
    }

    #[test]
    fn test_accept_rejects_elapsed_expiry() {
        let mut u = update("a");
        u.epoch = Some(NOW - 5_000);
        u.last = Some(1_000);
        let err = TickerConfiguration::accept(&u, NOW).unwrap_err();
        assert!(matches!(err, ConfigurationError::Rejected { .. }));
    }

    #[test]
    fn test_accept_rejects_last_before_first() {
        let mut u = update("a");
        u.first = Some(5_000);
        u.last = Some(1_000);
        let err = TickerConfiguration::accept(&u, NOW).unwrap_err();
        assert!(matches!(err, ConfigurationError::Rejected { .. }));
    }

    #[test]
    fn test_accept_handles_extreme_epochs() {
        // An epoch at the bottom of the range saturates instead of wrapping;
        // with an expiry window it is simply stale.
        let mut u = update("a");
        u.epoch = Some(i64::MIN);
        u.last = Some(5);
        let err = TickerConfiguration::accept(&u, NOW).unwrap_err();
        assert!(matches!(err, ConfigurationError::Rejected { .. }));

        let mut u = update("a");
        u.epoch = Some(i64::MIN);
        let cfg = TickerConfiguration::accept(&u, NOW).unwrap();
        assert_eq!(cfg.elapsed(NOW), i64::MAX);

        let mut u = update("a");
        u.epoch = Some(i64::MAX);
        let cfg = TickerConfiguration::accept(&u, NOW).unwrap();
        assert!(!cfg.first_reached(NOW));
        assert!(!cfg.expired(NOW));
    }

    #[test]
    fn test_accept_allows_future_expiry() {
        let mut u = update("a");
        u.last = Some(1_000);
        let cfg = TickerConfiguration::accept(&u, NOW).unwrap();
        assert_eq!(cfg.last, Some(1_000));
        assert!(!cfg.expired(NOW));
        assert!(cfg.expired(NOW + 1_000));
    }

    #[test]
    fn test_merge_retains_absent_fields() {
        let mut u = update("a");
        u.first = Some(100);
        u.interval = Some(1_000);
        let cfg = TickerConfiguration::accept(&u, NOW).unwrap();

        let mut partial = update("a");
        partial.interval = Some(2_000);
        let merged = cfg.merge(&partial);
        assert_eq!(merged.first, 100);
        assert_eq!(merged.interval, Some(2_000));
        assert_eq!(merged.epoch, NOW);
    }

    #[test]
    fn test_merge_drops_invalid_fields_only() {
        let mut u = update("a");
        u.first = Some(100);
        u.interval = Some(1_000);
        let cfg = TickerConfiguration::accept(&u, NOW).unwrap();

        let mut partial = update("a");
        partial.first = Some(-1);
        partial.interval = Some(500);
        let merged = cfg.merge(&partial);
        assert_eq!(merged.first, 100);
        assert_eq!(merged.interval, Some(500));
    }

    #[test]
    fn test_merge_zero_interval_clears_repeat() {
        let mut u = update("a");
        u.interval = Some(1_000);
        let cfg = TickerConfiguration::accept(&u, NOW).unwrap();
        let mut partial = update("a");
        partial.interval = Some(0);
        assert!(cfg.merge(&partial).is_one_shot());
    }

    #[test]
    fn test_merge_ignores_mismatched_id() {
        let cfg = TickerConfiguration::accept(&update("a"), NOW).unwrap();
        let mut partial = update("b");
        partial.first = Some(99);
        assert_eq!(cfg.merge(&partial), cfg);
    }

    #[test]
    fn test_merge_keeps_last_at_or_after_first() {
        let mut u = update("a");
        u.first = Some(1_000);
        let cfg = TickerConfiguration::accept(&u, NOW).unwrap();

        let mut partial = update("a");
        partial.last = Some(500);
        let merged = cfg.merge(&partial);
        assert_eq!(merged.last, None);

        partial.last = Some(1_000);
        let merged = cfg.merge(&partial);
        assert_eq!(merged.last, Some(1_000));
    }

    #[test]
    fn test_merge_drops_first_that_would_overtake_last() {
        let mut u = update("a");
        u.last = Some(2_000);
        let cfg = TickerConfiguration::accept(&u, NOW).unwrap();

        let mut partial = update("a");
        partial.first = Some(3_000);
        let merged = cfg.merge(&partial);
        assert_eq!(merged.first, 0);
        assert_eq!(merged.last, Some(2_000));
    }

    #[test]
    fn test_predicates() {
        let mut u = update("a");
        u.first = Some(500);
        u.last = Some(2_000);
        let cfg = TickerConfiguration::accept(&u, NOW).unwrap();
        assert_eq!(cfg.elapsed(NOW + 300), 300);
        assert!(!cfg.first_reached(NOW + 499));
        assert!(cfg.first_reached(NOW + 500));
        assert!(!cfg.expired(NOW + 1_999));
        assert!(cfg.expired(NOW + 2_000));
    }
}
