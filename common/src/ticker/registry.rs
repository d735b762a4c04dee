// Ticker registry: id -> ticker map, per-ticker merge/reschedule, fire tasks

use crate::errors::ConfigurationError;
use crate::telemetry;
use crate::ticker::configuration::{TickerConfiguration, TickerUpdate};
use crate::ticker::plan::{fire_plan, WakeKind};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Millisecond clock anchored to the tokio time driver.
///
/// Wall-clock milliseconds are captured once at construction; from then on
/// elapsed time is measured with `tokio::time::Instant`, so a paused test
/// runtime observes a fully virtual, internally consistent clock.
#[derive(Debug, Clone)]
pub struct Clock {
    base_ms: i64,
    origin: tokio::time::Instant,
}

impl Clock {
    /// Clock starting at the current wall-clock time.
    pub fn system() -> Self {
        Self::anchored_at(chrono::Utc::now().timestamp_millis())
    }

    /// Clock whose "now" starts at the given Unix-epoch millisecond value.
    pub fn anchored_at(base_ms: i64) -> Self {
        Self {
            base_ms,
            origin: tokio::time::Instant::now(),
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.base_ms + self.origin.elapsed().as_millis() as i64
    }

    /// Sleep until the given clock value; returns immediately if it has passed.
    pub async fn sleep_until_ms(&self, target_ms: i64) {
        let now = self.now_ms();
        if target_ms > now {
            tokio::time::sleep(Duration::from_millis((target_ms - now) as u64)).await;
        }
    }
}

/// Callback capability through which the registry reports outward.
///
/// Implementations are shared across tickers and must tolerate concurrent
/// invocation. For a single ticker id the registry guarantees merge-ordered
/// configuration announcements, time-ordered ticks, and a removal
/// notification as the final event of the id's lifetime.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TickerSink: Send + Sync {
    async fn on_configuration_updated(&self, configuration: TickerConfiguration);
    async fn on_tick(&self, id: String, elapsed_ms: i64);
    async fn on_configuration_removed(&self, id: String);
}

struct Shared {
    tickers: Mutex<BTreeMap<String, Arc<Ticker>>>,
    sink: Arc<dyn TickerSink>,
    clock: Clock,
}

impl Shared {
    fn map(&self) -> MutexGuard<'_, BTreeMap<String, Arc<Ticker>>> {
        self.tickers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delete the map entry and announce removal as the id's final event.
    /// The caller holds the ticker's state lock with `removed` already set.
    async fn finish_removal(&self, id: &str) {
        let remaining = {
            let mut map = self.map();
            map.remove(id);
            map.len()
        };
        telemetry::record_ticker_removed();
        telemetry::update_active_tickers(remaining);
        self.sink.on_configuration_removed(id.to_string()).await;
    }
}

struct TickerState {
    configuration: TickerConfiguration,
    /// Bumped on every reschedule; a fire task waking under a stale
    /// generation returns without delivering anything.
    generation: u64,
    task: Option<JoinHandle<()>>,
    /// The "armed" configuration-updated announcement was made.
    first_announced: bool,
    /// At least one tick has been delivered; switches scheduling from
    /// "clamp to now" to "next strictly-future anchored target".
    first_delivered: bool,
    removed: bool,
}

enum Reconfigure {
    Applied,
    /// The ticker raced with its own removal; the caller starts over.
    Gone,
}

struct Ticker {
    id: String,
    shared: Weak<Shared>,
    state: tokio::sync::Mutex<TickerState>,
}

impl Ticker {
    fn new(configuration: TickerConfiguration, shared: Weak<Shared>) -> Arc<Self> {
        Arc::new(Self {
            id: configuration.id.clone(),
            shared,
            state: tokio::sync::Mutex::new(TickerState {
                configuration,
                generation: 0,
                task: None,
                first_announced: false,
                first_delivered: false,
                removed: false,
            }),
        })
    }

    /// Merge a partial update and rebuild the scheduled execution if the fire
    /// timing changed. Serialized per ticker by the state lock; the sink
    /// observes announcements in lock-acquisition order.
    async fn reconfigure(self: &Arc<Self>, update: &TickerUpdate) -> Reconfigure {
        let mut state = self.state.lock().await;
        if state.removed {
            return Reconfigure::Gone;
        }
        let Some(shared) = self.shared.upgrade() else {
            return Reconfigure::Gone;
        };
        let merged = state.configuration.merge(update);
        if merged == state.configuration {
            debug!(id = %self.id, "Identical resubmission, nothing to announce");
            return Reconfigure::Applied;
        }
        let timing_changed = merged.epoch != state.configuration.epoch
            || merged.first != state.configuration.first
            || merged.interval != state.configuration.interval;
        state.configuration = merged.clone();
        shared.sink.on_configuration_updated(merged).await;

        let now = shared.clock.now_ms();
        if state.configuration.expired(now) {
            info!(id = %self.id, "Reconfiguration expired the ticker, removing");
            self.remove_locked(&mut state, &shared, true).await;
            return Reconfigure::Applied;
        }
        if timing_changed {
            self.reschedule_locked(&mut state);
        }
        Reconfigure::Applied
    }

    /// Stop the scheduled execution and request removal. Returns false if the
    /// ticker was already gone.
    async fn cancel(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock().await;
        if state.removed {
            return false;
        }
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        self.remove_locked(&mut state, &shared, true).await;
        true
    }

    /// Install a fresh fire task under a new generation, aborting the old
    /// one. An aborted task that never started is guaranteed never to fire;
    /// one that is mid-delivery finishes first, since delivery happens under
    /// the state lock the caller is holding.
    fn reschedule_locked(self: &Arc<Self>, state: &mut TickerState) {
        state.generation += 1;
        if let Some(task) = state.task.take() {
            task.abort();
        }
        let generation = state.generation;
        let ticker = Arc::clone(self);
        state.task = Some(tokio::spawn(ticker.run(generation)));
    }

    /// `abort_task` is false when called from the fire task itself, which
    /// must not be killed before it finishes announcing the removal.
    async fn remove_locked(&self, state: &mut TickerState, shared: &Shared, abort_task: bool) {
        state.removed = true;
        if let Some(task) = state.task.take() {
            if abort_task {
                task.abort();
            }
        }
        shared.finish_removal(&self.id).await;
    }

    /// Fire loop: sleep to the next planned wake-up, then re-check the world
    /// under the state lock before delivering anything.
    async fn run(self: Arc<Self>, generation: u64) {
        loop {
            let plan = {
                let mut state = self.state.lock().await;
                if state.generation != generation || state.removed {
                    return;
                }
                let Some(shared) = self.shared.upgrade() else {
                    return;
                };
                let plan = fire_plan(
                    &state.configuration,
                    shared.clock.now_ms(),
                    state.first_delivered,
                );
                match plan {
                    Some(plan) => plan,
                    None => {
                        // Delivered one-shot with nothing left to wait for.
                        // Reached when a reconfiguration cleared the repeat
                        // period after the fire; the ticker is done.
                        self.remove_locked(&mut state, &shared, false).await;
                        return;
                    }
                }
            };
            let Some(shared) = self.shared.upgrade() else {
                return;
            };
            shared.clock.sleep_until_ms(plan.wake_ms).await;

            let mut state = self.state.lock().await;
            if state.generation != generation || state.removed {
                return;
            }
            let now = shared.clock.now_ms();
            let configuration = state.configuration.clone();

            if configuration.expired(now) {
                debug!(
                    id = %self.id,
                    elapsed = configuration.elapsed(now),
                    "Expiry reached, removing instead of firing"
                );
                self.remove_locked(&mut state, &shared, false).await;
                return;
            }
            if plan.kind == WakeKind::ExpiryCheck {
                // `last` was extended while we slept; take another lap.
                continue;
            }
            if !configuration.first_reached(now) {
                // Not reachable through the registry today: every `first`
                // change rebuilds the task and the generation check above
                // catches the superseded one. Guards the wake path against
                // ever turning an early wake into an early tick.
                warn!(id = %self.id, "Premature fire suppressed, rescheduling");
                continue;
            }
            if !state.first_announced {
                state.first_announced = true;
                shared
                    .sink
                    .on_configuration_updated(configuration.clone())
                    .await;
            }
            state.first_delivered = true;
            if !self.deliver_tick(&shared, configuration.elapsed(now)).await {
                self.remove_locked(&mut state, &shared, false).await;
                return;
            }
            telemetry::record_tick(&self.id);
            if configuration.interval.is_none() && configuration.last.is_none() {
                // One-shot with no expiry window: done right after its fire.
                self.remove_locked(&mut state, &shared, false).await;
                return;
            }
        }
    }

    /// Deliver a tick on its own task so a panicking sink cannot take the
    /// fire loop down with it. Returns false when the ticker must be
    /// force-removed.
    async fn deliver_tick(&self, shared: &Shared, elapsed_ms: i64) -> bool {
        let sink = Arc::clone(&shared.sink);
        let id = self.id.clone();
        match tokio::spawn(async move { sink.on_tick(id, elapsed_ms).await }).await {
            Ok(()) => true,
            Err(join_err) => {
                error!(
                    id = %self.id,
                    panicked = join_err.is_panic(),
                    "Tick delivery failed, forcing removal"
                );
                false
            }
        }
    }
}

/// Registry of named tickers.
///
/// Owns the id -> ticker map and is the only entry point collaborators use:
/// `configure` merges or creates, `cancel` retires, and every outcome is
/// reported through the injected [`TickerSink`]. All operations return
/// quickly; timer waits happen inside per-ticker tokio tasks.
pub struct TickerRegistry {
    shared: Arc<Shared>,
}

impl TickerRegistry {
    pub fn new(sink: Arc<dyn TickerSink>, clock: Clock) -> Self {
        Self {
            shared: Arc::new(Shared {
                tickers: Mutex::new(BTreeMap::new()),
                sink,
                clock,
            }),
        }
    }

    /// Create or reconfigure the ticker named by `update.id`.
    ///
    /// Safe under concurrent calls: different ids never contend, calls for
    /// the same id are serialized by the per-ticker lock. A removed id is
    /// terminal; a later configure creates a brand-new ticker.
    #[instrument(skip(self, update), fields(id = %update.id))]
    pub async fn configure(&self, update: TickerUpdate) -> Result<(), ConfigurationError> {
        if update.id.is_empty() {
            return Err(ConfigurationError::EmptyId);
        }
        loop {
            let existing = self.shared.map().get(&update.id).cloned();
            match existing {
                Some(ticker) => match ticker.reconfigure(&update).await {
                    Reconfigure::Applied => return Ok(()),
                    // Raced with the ticker's own removal; start over.
                    Reconfigure::Gone => continue,
                },
                None => {
                    if self.try_create(&update).await? {
                        return Ok(());
                    }
                    // Lost a creation race; merge into the winner instead.
                }
            }
        }
    }

    /// Cancel the ticker named `id`; unknown ids are a harmless no-op, since
    /// cancellation is expected to race with natural expiry.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: &str) {
        let existing = self.shared.map().get(id).cloned();
        match existing {
            Some(ticker) => {
                if ticker.cancel().await {
                    info!(id, "Ticker cancelled");
                }
            }
            None => debug!(id, "Cancel for unknown ticker id ignored"),
        }
    }

    /// Point-in-time copy of the current id -> configuration state.
    pub async fn snapshot(&self) -> BTreeMap<String, TickerConfiguration> {
        let tickers: Vec<Arc<Ticker>> = self.shared.map().values().cloned().collect();
        let mut configurations = BTreeMap::new();
        for ticker in tickers {
            let state = ticker.state.lock().await;
            if !state.removed {
                configurations.insert(ticker.id.clone(), state.configuration.clone());
            }
        }
        configurations
    }

    /// Abort every fire task and drop all tickers without emitting callbacks.
    /// For process teardown, when the sink's transport is going away.
    pub async fn shutdown(&self) {
        let tickers: Vec<Arc<Ticker>> = {
            let mut map = self.shared.map();
            std::mem::take(&mut *map).into_values().collect()
        };
        for ticker in tickers {
            let mut state = ticker.state.lock().await;
            state.removed = true;
            if let Some(task) = state.task.take() {
                task.abort();
            }
        }
        telemetry::update_active_tickers(0);
        info!("Ticker registry shut down");
    }

    async fn try_create(&self, update: &TickerUpdate) -> Result<bool, ConfigurationError> {
        let now = self.shared.clock.now_ms();
        let configuration = TickerConfiguration::accept(update, now)?;
        let ticker = Ticker::new(configuration.clone(), Arc::downgrade(&self.shared));
        // Hold the new ticker's state lock (uncontended) across insertion and
        // arming, so a concurrent reconfigure cannot observe it half-built.
        let mut state = ticker.state.lock().await;
        {
            let mut map = self.shared.map();
            if map.contains_key(&update.id) {
                return Ok(false);
            }
            map.insert(update.id.clone(), Arc::clone(&ticker));
            telemetry::update_active_tickers(map.len());
        }
        info!(id = %update.id, "Ticker created");
        self.shared
            .sink
            .on_configuration_updated(configuration)
            .await;
        ticker.reschedule_locked(&mut state);
        Ok(true)
    }
}
