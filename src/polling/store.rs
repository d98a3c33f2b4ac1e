//! # Polling Store
//!
//! A timer-driven fetch loop with a cached result and status flags.
//!
//! ## Lifecycle
//!
//! ```text
//!            start()                     tick / refresh()
//!   Idle ───────────────► Loading ───────────────────────► Ready
//!                            │                               │
//!                            └──── fetch failed ────► Errored┘ (next tick retries)
//! ```
//!
//! - `start()` spawns one timer task; the first fetch runs immediately.
//! - A failed cycle never stops the timer. There is no backoff.
//! - Cycles of one store never overlap: the task awaits each cycle before
//!   waiting for the next tick, and ticks missed while a slow fetch runs are
//!   skipped.
//! - `stop()` is cooperative. A fetch that is already in flight finishes and
//!   publishes its result.
//!
//! ## Staleness Dedup
//!
//! A store built with [`PollingStore::deduplicated`] compares a token taken from
//! every successful fetch with the last accepted token. A repeat is reported as
//! [`CycleOutcome::NoNewData`]: the snapshot is dropped and
//! [`NO_NEW_DATA`] is published as the error, while the remembered token is
//! kept. Fetch failures never touch the remembered token.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;

/// Default fetch interval for telemetry stores
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Error text published when the device repeats its last sample
pub const NO_NEW_DATA: &str = "No new data available";

/// Something a [`PollingStore`] can fetch from
#[async_trait]
pub trait Source: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    /// Fetch one value
    async fn fetch(&self) -> Result<Self::Value>;
}

/// Extracts the dedup token from a fetched value
pub type TokenFn<V> = fn(&V) -> &str;

/// Store status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    Loading,
    Ready,
    Errored,
}

/// Latest accepted value
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot<T> {
    pub value: T,
    pub observed_at: Instant,
    /// Evaluated against the store's `stale_after` age when read through
    /// [`PollingStore::snapshot`]; always false in published state
    pub is_stale: bool,
}

impl<T> TelemetrySnapshot<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            observed_at: Instant::now(),
            is_stale: false,
        }
    }

    /// Age of the snapshot
    pub fn age(&self) -> Duration {
        self.observed_at.elapsed()
    }
}

/// Observable state of a polling store
#[derive(Debug, Clone, PartialEq)]
pub struct PollingState<T> {
    pub status: Status,
    pub last_error: Option<String>,
    pub snapshot: Option<TelemetrySnapshot<T>>,
}

impl<T> Default for PollingState<T> {
    fn default() -> Self {
        Self {
            status: Status::Idle,
            last_error: None,
            snapshot: None,
        }
    }
}

impl<T> PollingState<T> {
    /// True while a fetch is in flight
    pub fn is_loading(&self) -> bool {
        self.status == Status::Loading
    }
}

/// Result of one fetch cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new value replaced the snapshot
    Fresh,
    /// The device repeated its last sample
    NoNewData,
    /// The fetch failed with this message
    Failed(String),
}

struct Shared<S: Source> {
    name: &'static str,
    source: S,
    state: watch::Sender<PollingState<S::Value>>,
    dedup: Option<TokenFn<S::Value>>,
    last_token: Mutex<Option<String>>,
}

struct Timer {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Generic polling store
///
/// # Examples
///
/// ```no_run
/// use df_companion::polling::{PollingStore, Source};
/// # use async_trait::async_trait;
/// # struct Uptime;
/// # #[async_trait]
/// # impl Source for Uptime {
/// #     type Value = u64;
/// #     async fn fetch(&self) -> df_companion::error::Result<u64> { Ok(1) }
/// # }
///
/// # #[tokio::main]
/// # async fn main() {
/// let store = PollingStore::new("uptime", Uptime);
/// store.start();
/// let mut updates = store.subscribe();
/// updates.changed().await.unwrap();
/// println!("{:?}", updates.borrow().status);
/// store.stop();
/// # }
/// ```
pub struct PollingStore<S: Source> {
    shared: Arc<Shared<S>>,
    interval: Duration,
    stale_after: Option<Duration>,
    timer: Mutex<Option<Timer>>,
}

impl<S: Source> PollingStore<S> {
    /// Create a store polling `source` every [`DEFAULT_POLL_INTERVAL`]
    pub fn new(name: &'static str, source: S) -> Self {
        Self::build(name, source, None)
    }

    /// Create a store with staleness dedup keyed on `token`
    pub fn deduplicated(name: &'static str, source: S, token: TokenFn<S::Value>) -> Self {
        Self::build(name, source, Some(token))
    }

    fn build(name: &'static str, source: S, dedup: Option<TokenFn<S::Value>>) -> Self {
        let (state, _) = watch::channel(PollingState::default());
        Self {
            shared: Arc::new(Shared {
                name,
                source,
                state,
                dedup,
                last_token: Mutex::new(None),
            }),
            interval: DEFAULT_POLL_INTERVAL,
            stale_after: None,
            timer: Mutex::new(None),
        }
    }

    /// Use a different fetch interval
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "polling interval must be non-zero");
        self.interval = interval;
        self
    }

    /// Mark snapshots older than `max_age` as stale when read
    #[must_use]
    pub fn with_stale_after(mut self, max_age: Duration) -> Self {
        self.stale_after = Some(max_age);
        self
    }

    /// Store name used in logs
    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Fetch interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling
    ///
    /// Fetches once immediately, then every interval. Calling `start()` on a
    /// running store does nothing. Must be called inside a Tokio runtime.
    pub fn start(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::clone(&self.shared),
            self.interval,
            cancel.clone(),
        ));
        *timer = Some(Timer { handle, cancel });

        info!("{} store started ({} ms interval)", self.shared.name, self.interval.as_millis());
    }

    /// Stop polling
    ///
    /// Cached data is kept. A fetch already in flight is not aborted.
    pub fn stop(&self) {
        let timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(timer) = timer {
            timer.cancel.cancel();
            drop(timer.handle);
            info!("{} store stopped", self.shared.name);
        }
    }

    /// True while a timer is registered
    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run one fetch cycle now, independent of the timer
    pub async fn refresh(&self) -> CycleOutcome {
        self.shared.cycle().await
    }

    /// Reset snapshot, status, error and dedup token
    ///
    /// The timer keeps running.
    pub fn clear(&self) {
        *self
            .shared
            .last_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.shared.state.send_replace(PollingState::default());
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<PollingState<S::Value>> {
        self.shared.state.subscribe()
    }

    /// Current state
    pub fn state(&self) -> PollingState<S::Value> {
        self.shared.state.borrow().clone()
    }

    /// Current snapshot with `is_stale` evaluated
    pub fn snapshot(&self) -> Option<TelemetrySnapshot<S::Value>> {
        let mut snapshot = self.shared.state.borrow().snapshot.clone()?;
        snapshot.is_stale = self
            .stale_after
            .is_some_and(|max_age| snapshot.age() > max_age);
        Some(snapshot)
    }

    /// Last accepted dedup token
    pub fn last_token(&self) -> Option<String> {
        self.shared
            .last_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<S: Source> Drop for PollingStore<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S: Source> Shared<S> {
    async fn cycle(&self) -> CycleOutcome {
        self.state.send_modify(|s| {
            s.status = Status::Loading;
            s.last_error = None;
        });

        match self.source.fetch().await {
            Ok(value) => self.accept(value),
            Err(e) => {
                let message = e.to_string();
                debug!("{} fetch failed: {}", self.name, message);
                self.state.send_modify(|s| {
                    s.snapshot = None;
                    s.last_error = Some(message.clone());
                    s.status = Status::Errored;
                });
                CycleOutcome::Failed(message)
            }
        }
    }

    fn accept(&self, value: S::Value) -> CycleOutcome {
        if let Some(token_of) = self.dedup {
            let token = token_of(&value);
            let mut last = self.last_token.lock().unwrap_or_else(PoisonError::into_inner);

            if last.as_deref() == Some(token) {
                debug!("{} repeated sample, token {}", self.name, token);
                self.state.send_modify(|s| {
                    s.snapshot = None;
                    s.last_error = Some(NO_NEW_DATA.to_string());
                    s.status = Status::Errored;
                });
                return CycleOutcome::NoNewData;
            }

            debug!("{} new sample, token {}", self.name, token);
            *last = Some(token.to_string());
        }

        self.state.send_modify(|s| {
            s.snapshot = Some(TelemetrySnapshot::new(value));
            s.last_error = None;
            s.status = Status::Ready;
        });
        CycleOutcome::Fresh
    }
}

async fn run<S: Source>(shared: Arc<Shared<S>>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        shared.cycle().await;
    }

    debug!("{} timer task exited", shared.name);
}
