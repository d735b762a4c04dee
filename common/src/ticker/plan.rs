// Scheduling engine: pure computation of a ticker's next wake-up

use crate::ticker::configuration::TickerConfiguration;

/// What a fire task should do when its wake-up instant arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeKind {
    /// A tick is due, subject to the expiry and premature-fire checks.
    Fire,
    /// No tick is due; re-evaluate expiry against the then-current configuration.
    ExpiryCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirePlan {
    /// Clock value (ms since Unix epoch) at which the task must wake.
    pub wake_ms: i64,
    pub kind: WakeKind,
}

/// Compute when a ticker must next wake up.
///
/// Periodic targets are fixed-rate and drift-corrected: they are the instants
/// `epoch + first + k * interval`, anchored at the configuration rather than
/// at actual fire times. Once a tick has been delivered, a reschedule only
/// ever targets a strictly-future instant, so reconfiguring a live ticker
/// never delivers a tick at the moment of the reconfiguration itself.
///
/// A first-fire instant that already elapsed is clamped to `now`: the ticker
/// fires once as soon as it can, it does not fire catch-up ticks.
///
/// Returns `None` only for a one-shot with no `last` whose single fire has
/// been delivered; the caller removes the ticker instead of sleeping.
pub fn fire_plan(
    cfg: &TickerConfiguration,
    now_ms: i64,
    first_delivered: bool,
) -> Option<FirePlan> {
    // Saturating throughout: `epoch` is wire-supplied and may sit at the far
    // ends of `i64`; a saturated target just sleeps until cancellation.
    let due = cfg.epoch.saturating_add(cfg.first);
    if !first_delivered || now_ms < due {
        return Some(FirePlan {
            wake_ms: due.max(now_ms),
            kind: WakeKind::Fire,
        });
    }
    match (cfg.interval, cfg.last) {
        (Some(interval), _) => {
            // Next anchored instant `due + k * interval`, computed from `now`
            // so a saturated `due` still yields a strictly-future target.
            let since_due = now_ms.saturating_sub(due);
            Some(FirePlan {
                wake_ms: now_ms.saturating_add(interval - since_due % interval),
                kind: WakeKind::Fire,
            })
        }
        (None, Some(last)) => Some(FirePlan {
            wake_ms: cfg.epoch.saturating_add(last).max(now_ms),
            kind: WakeKind::ExpiryCheck,
        }),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticker::configuration::TickerUpdate;

    const NOW: i64 = 1_700_000_000_000;

    fn config(first: i64, interval: Option<i64>, last: Option<i64>) -> TickerConfiguration {
        let mut update = TickerUpdate::new("a");
        update.epoch = Some(NOW);
        update.first = Some(first);
        update.interval = interval;
        update.last = last;
        TickerConfiguration::accept(&update, NOW).unwrap()
    }

    #[test]
    fn test_first_fire_waits_for_due_instant() {
        let cfg = config(5_000, None, None);
        let plan = fire_plan(&cfg, NOW, false).unwrap();
        assert_eq!(plan.wake_ms, NOW + 5_000);
        assert_eq!(plan.kind, WakeKind::Fire);
    }

    #[test]
    fn test_elapsed_first_fire_is_clamped_to_now() {
        let cfg = config(0, None, None);
        let plan = fire_plan(&cfg, NOW + 7_000, false).unwrap();
        assert_eq!(plan.wake_ms, NOW + 7_000);
        assert_eq!(plan.kind, WakeKind::Fire);
    }

    #[test]
    fn test_periodic_targets_are_anchored() {
        let cfg = config(500, Some(1_000), None);
        // Fired at 500; asking at 600 must target 1500, not 1600.
        let plan = fire_plan(&cfg, NOW + 600, true).unwrap();
        assert_eq!(plan.wake_ms, NOW + 1_500);
    }

    #[test]
    fn test_periodic_target_on_boundary_is_strictly_future() {
        let cfg = config(0, Some(1_000), None);
        let plan = fire_plan(&cfg, NOW + 2_000, true).unwrap();
        assert_eq!(plan.wake_ms, NOW + 3_000);
    }

    #[test]
    fn test_delivered_one_shot_without_last_has_no_plan() {
        let cfg = config(0, None, None);
        assert_eq!(fire_plan(&cfg, NOW + 10, true), None);
    }

    #[test]
    fn test_delivered_one_shot_with_last_waits_for_expiry() {
        let cfg = config(0, None, Some(2_000));
        let plan = fire_plan(&cfg, NOW + 10, true).unwrap();
        assert_eq!(plan.wake_ms, NOW + 2_000);
        assert_eq!(plan.kind, WakeKind::ExpiryCheck);
    }

    #[test]
    fn test_extreme_epochs_yield_sane_plans() {
        let mut cfg = config(0, Some(1_000), None);
        cfg.epoch = i64::MIN;
        let plan = fire_plan(&cfg, NOW, true).unwrap();
        // Saturated anchor, but the target stays strictly future and within
        // one period of now.
        assert!(plan.wake_ms > NOW);
        assert!(plan.wake_ms <= NOW + 1_000);

        cfg.epoch = i64::MAX;
        let plan = fire_plan(&cfg, NOW, false).unwrap();
        assert_eq!(plan.wake_ms, i64::MAX);
        assert_eq!(plan.kind, WakeKind::Fire);
    }

    #[test]
    fn test_future_first_after_delivery_rearms() {
        // A reconfiguration moved `first` into the future again.
        let mut cfg = config(0, None, Some(10_000));
        cfg.first = 4_000;
        let plan = fire_plan(&cfg, NOW + 1_000, true).unwrap();
        assert_eq!(plan.wake_ms, NOW + 4_000);
        assert_eq!(plan.kind, WakeKind::Fire);
    }
}
