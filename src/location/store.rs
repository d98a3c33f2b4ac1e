//! # Location Store
//!
//! Tracks the device position from a [`HardwareLocator`], falling back to an
//! [`IpGeolocator`] when the hardware is missing or refuses.
//!
//! ```text
//!   NotStarted ──start()──► Watching ──accuracy > 100 m / error──► Degraded
//!        │                     │                                     │
//!        │ no hardware         └───────────── stop() ───────────────┴──► Stopped
//!        └──────────────► Degraded (IP lookup only)
//! ```
//!
//! - `has_hardware` stays false once cleared by a degraded fix or an error,
//!   until [`LocationStore::clear`] or the next `start()`.
//! - Permission and availability errors trigger one IP lookup each; timeouts
//!   do not. The hardware watch stays registered either way.
//! - An IP lookup in flight is never cancelled.

use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    DeviceFix, HardwareError, HardwareLocator, IpGeolocator, LocationReading, LocationSource,
    PositionWatch, IP_FALLBACK_ACCURACY_M,
};
use crate::error::{DfCompanionError, Result};

/// Error recorded when the capability probe fails
pub const HARDWARE_UNAVAILABLE: &str = "Geolocation hardware not available";

/// Lifecycle of the hardware watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchPhase {
    #[default]
    NotStarted,
    Watching,
    Degraded,
    Stopped,
}

/// Observable location state
#[derive(Debug, Clone, PartialEq)]
pub struct LocationState {
    pub reading: Option<LocationReading>,
    pub error: Option<String>,
    pub is_loading: bool,
    pub has_hardware: bool,
    pub phase: WatchPhase,
}

impl Default for LocationState {
    fn default() -> Self {
        Self {
            reading: None,
            error: None,
            is_loading: false,
            has_hardware: true,
            phase: WatchPhase::NotStarted,
        }
    }
}

struct Shared<G> {
    geolocator: G,
    state: watch::Sender<LocationState>,
}

struct WatchTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Position store with IP fallback
pub struct LocationStore<H, G> {
    hardware: H,
    shared: Arc<Shared<G>>,
    task: Mutex<Option<WatchTask>>,
}

impl<H: HardwareLocator, G: IpGeolocator> LocationStore<H, G> {
    pub fn new(hardware: H, geolocator: G) -> Self {
        let (state, _) = watch::channel(LocationState::default());
        Self {
            hardware,
            shared: Arc::new(Shared { geolocator, state }),
            task: Mutex::new(None),
        }
    }

    /// Start watching the hardware position
    ///
    /// Without hardware, records [`HARDWARE_UNAVAILABLE`] and runs one IP
    /// lookup in the background. Must be called inside a Tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.hardware.is_available() {
            warn!("Geolocation hardware not available, using IP fallback");
            self.shared.state.send_modify(|s| {
                s.error = Some(HARDWARE_UNAVAILABLE.to_string());
                s.has_hardware = false;
                if task.is_none() {
                    s.phase = WatchPhase::Degraded;
                }
            });
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                let _ = shared.fallback_ip().await;
            });
            return;
        }

        if task.is_some() {
            return;
        }

        self.shared.state.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
            s.has_hardware = true;
            s.phase = WatchPhase::Watching;
        });

        let cancel = CancellationToken::new();
        let watch = self.hardware.watch();
        let handle = tokio::spawn(run(Arc::clone(&self.shared), watch, cancel.clone()));
        *task = Some(WatchTask { handle, cancel });

        info!("Location store started");
    }

    /// Cancel the hardware watch; no-op when not watching
    pub fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.cancel.cancel();
            drop(task.handle);
            self.shared.state.send_modify(|s| s.phase = WatchPhase::Stopped);
            info!("Location store stopped");
        }
    }

    /// True while a hardware watch is registered
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Reset reading, error, loading and `has_hardware`
    ///
    /// An active watch keeps running.
    pub fn clear(&self) {
        let phase = if self.is_running() {
            WatchPhase::Watching
        } else {
            WatchPhase::NotStarted
        };
        self.shared.state.send_replace(LocationState {
            phase,
            ..LocationState::default()
        });
    }

    /// Run one IP lookup now
    ///
    /// # Errors
    ///
    /// Returns `Location` carrying the recorded error text; the prior
    /// reading is kept.
    pub async fn fallback_ip(&self) -> Result<LocationReading> {
        self.shared.fallback_ip().await
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<LocationState> {
        self.shared.state.subscribe()
    }

    /// Current state
    pub fn state(&self) -> LocationState {
        self.shared.state.borrow().clone()
    }
}

impl<H, G> Drop for LocationStore<H, G> {
    fn drop(&mut self) {
        let task = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.cancel.cancel();
        }
    }
}

impl<G: IpGeolocator> Shared<G> {
    fn on_fix(&self, fix: DeviceFix) {
        let reading = LocationReading {
            lat: fix.lat,
            lon: fix.lon,
            accuracy_meters: fix.accuracy_meters,
            heading_degrees: fix.heading_degrees.unwrap_or(0.0),
            timestamp: fix.timestamp,
            source: LocationSource::Device,
        };
        let degraded = reading.is_degraded();
        if degraded {
            debug!("Degraded fix: accuracy {} m", reading.accuracy_meters);
        }

        self.state.send_modify(|s| {
            s.reading = Some(reading);
            s.is_loading = false;
            if degraded {
                s.has_hardware = false;
                s.phase = WatchPhase::Degraded;
            }
        });
    }

    async fn on_error(&self, err: HardwareError) {
        warn!("Geolocation error: {}", err);
        self.state.send_modify(|s| {
            s.error = Some(err.to_string());
            s.is_loading = false;
            s.has_hardware = false;
            s.phase = WatchPhase::Degraded;
        });

        if err.triggers_fallback() {
            warn!("GPS unavailable, falling back to IP location");
            let _ = self.fallback_ip().await;
        }
    }

    async fn fallback_ip(&self) -> Result<LocationReading> {
        match self.geolocator.locate().await {
            Ok(location) => {
                let reading = LocationReading {
                    lat: location.latitude,
                    lon: location.longitude,
                    accuracy_meters: IP_FALLBACK_ACCURACY_M,
                    heading_degrees: 0.0,
                    timestamp: Utc::now(),
                    source: LocationSource::IpFallback,
                };
                self.state.send_modify(|s| {
                    s.reading = Some(reading.clone());
                    s.error = None;
                    s.is_loading = false;
                    s.has_hardware = false;
                });
                info!(
                    "Using IP fallback location: {}, {}",
                    location.city.as_deref().unwrap_or("unknown city"),
                    location.country_name.as_deref().unwrap_or("unknown country")
                );
                Ok(reading)
            }
            Err(e) => {
                let message = format!("Failed to get location: {}", e);
                warn!("IP fallback failed: {}", e);
                self.state.send_modify(|s| {
                    s.error = Some(message.clone());
                    s.is_loading = false;
                });
                Err(DfCompanionError::Location(message))
            }
        }
    }
}

async fn run<G: IpGeolocator>(shared: Arc<Shared<G>>, mut watch: PositionWatch, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = watch.next() => event,
        };

        match event {
            Some(Ok(fix)) => shared.on_fix(fix),
            Some(Err(e)) => shared.on_error(e).await,
            None => {
                debug!("Hardware watch closed");
                break;
            }
        }
    }

    watch.cancel();
}

#[cfg(test)]
pub(crate) mod mocks {
    //! Hardware locator fed by the test

    use super::*;
    use crate::location::watch::{self, PositionSender};

    /// Locator whose watches are driven through [`FakeHardware::sender`]
    #[derive(Default)]
    pub struct FakeHardware {
        pub available: bool,
        pub sender: Mutex<Option<PositionSender>>,
        pub watches: std::sync::atomic::AtomicUsize,
    }

    impl FakeHardware {
        pub fn available() -> Self {
            Self {
                available: true,
                ..Default::default()
            }
        }

        pub fn sender(&self) -> PositionSender {
            self.sender.lock().unwrap().clone().expect("watch() not called")
        }
    }

    impl HardwareLocator for Arc<FakeHardware> {
        fn is_available(&self) -> bool {
            self.available
        }

        fn watch(&self) -> PositionWatch {
            self.watches.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let (tx, watch) = watch::channel(8);
            *self.sender.lock().unwrap() = Some(tx);
            watch
        }
    }
}
