//! # Serial GNSS Receiver
//!
//! [`HardwareLocator`] reading NMEA 0183 from a USB or UART receiver.
//!
//! The first openable port of the configured list is used. Fixes are emitted
//! on each valid `RMC`; silence longer than the fix timeout is reported as
//! [`HardwareError::Timeout`] and the receiver keeps being read.

use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use super::nmea::NmeaTracker;
use super::watch::{self, PositionSender, PositionWatch};
use super::{HardwareError, HardwareLocator};

/// Default GNSS device paths to try (in order of preference)
pub const DEFAULT_GNSS_PATHS: &[&str] = &[
    "/dev/ttyACM0", // u-blox and other USB CDC receivers
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// Default NMEA baud rate
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default time without a fix before a timeout is reported
pub const DEFAULT_FIX_TIMEOUT: Duration = Duration::from_secs(10);

const WATCH_CAPACITY: usize = 16;

/// Serial NMEA position provider
#[derive(Debug, Clone)]
pub struct SerialGnss {
    paths: Vec<String>,
    baud_rate: u32,
    fix_timeout: Duration,
}

impl Default for SerialGnss {
    fn default() -> Self {
        Self::new(
            DEFAULT_GNSS_PATHS.iter().map(|p| p.to_string()).collect(),
            DEFAULT_BAUD_RATE,
            DEFAULT_FIX_TIMEOUT,
        )
    }
}

impl SerialGnss {
    /// Create a provider trying `paths` in order
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths (e.g., `/dev/ttyACM0`)
    /// * `baud_rate` - NMEA output rate of the receiver
    /// * `fix_timeout` - Longest silence before a timeout is reported
    pub fn new(paths: Vec<String>, baud_rate: u32, fix_timeout: Duration) -> Self {
        Self {
            paths,
            baud_rate,
            fix_timeout,
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Open the first available port
    ///
    /// # Errors
    ///
    /// `PermissionDenied` if any candidate exists but may not be opened and
    /// none could be opened; `PositionUnavailable` otherwise.
    fn open(&self) -> std::result::Result<(String, tokio_serial::SerialStream), HardwareError> {
        let mut denied = None;

        for path in &self.paths {
            debug!("Trying to open GNSS port: {}", path);

            match open_port(path, self.baud_rate) {
                Ok(port) => {
                    info!("Opened GNSS receiver at {} ({} baud)", path, self.baud_rate);
                    return Ok((path.clone(), port));
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    if is_permission_denied(&e) {
                        denied = Some(path.clone());
                    }
                }
            }
        }

        Err(match denied {
            Some(path) => HardwareError::PermissionDenied(format!("Permission denied opening {}", path)),
            None => HardwareError::PositionUnavailable(format!(
                "No GNSS receiver found (tried: {})",
                self.paths.join(", ")
            )),
        })
    }
}

impl HardwareLocator for SerialGnss {
    fn is_available(&self) -> bool {
        self.paths.iter().any(|p| Path::new(p).exists())
    }

    fn watch(&self) -> PositionWatch {
        let (tx, watch) = watch::channel(WATCH_CAPACITY);
        let gnss = self.clone();

        tokio::spawn(async move {
            match gnss.open() {
                Ok((path, port)) => {
                    pump(BufReader::new(port), &tx, gnss.fix_timeout).await;
                    debug!("GNSS watch on {} ended", path);
                }
                Err(e) => {
                    tx.send(Err(e)).await;
                }
            }
        });

        watch
    }
}

fn open_port(path: &str, baud_rate: u32) -> tokio_serial::Result<tokio_serial::SerialStream> {
    tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
}

fn is_permission_denied(e: &tokio_serial::Error) -> bool {
    matches!(
        e.kind(),
        tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied)
    )
}

/// Read NMEA lines until the watch is dropped or the stream ends
pub async fn pump<R>(reader: R, tx: &PositionSender, fix_timeout: Duration)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut tracker = NmeaTracker::new();
    let mut deadline = Instant::now() + fix_timeout;

    loop {
        tokio::select! {
            _ = tx.cancelled() => return,
            _ = tokio::time::sleep_until(deadline) => {
                let message = format!("No GNSS fix within {} s", fix_timeout.as_secs());
                if !tx.send(Err(HardwareError::Timeout(message))).await {
                    return;
                }
                deadline = Instant::now() + fix_timeout;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(fix) = tracker.feed(&line) {
                        debug!(lat = fix.lat, lon = fix.lon, accuracy = fix.accuracy_meters, "GNSS fix");
                        if !tx.send(Ok(fix)).await {
                            return;
                        }
                        deadline = Instant::now() + fix_timeout;
                    }
                }
                Ok(None) => {
                    let message = "GNSS stream closed".to_string();
                    tx.send(Err(HardwareError::PositionUnavailable(message))).await;
                    return;
                }
                Err(e) => {
                    let message = format!("GNSS read failed: {}", e);
                    tx.send(Err(HardwareError::PositionUnavailable(message))).await;
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const GGA: &[u8] = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
    const RMC: &[u8] = b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n";

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_GNSS_PATHS, &["/dev/ttyACM0", "/dev/ttyUSB0"]);
        assert_eq!(DEFAULT_BAUD_RATE, 9600);
        assert_eq!(DEFAULT_FIX_TIMEOUT, Duration::from_secs(10));
    }

    #[test]
    fn test_unavailable_when_no_path_exists() {
        let gnss = SerialGnss::new(
            vec!["/dev/nonexistent_gnss0".into(), "/dev/nonexistent_gnss1".into()],
            9600,
            DEFAULT_FIX_TIMEOUT,
        );
        assert!(!gnss.is_available());
    }

    #[test]
    fn test_open_with_invalid_paths_is_position_unavailable() {
        let gnss = SerialGnss::new(vec!["/dev/nonexistent_gnss0".into()], 9600, DEFAULT_FIX_TIMEOUT);

        match gnss.open() {
            Err(HardwareError::PositionUnavailable(msg)) => {
                assert!(msg.contains("/dev/nonexistent_gnss0"));
            }
            other => panic!("Expected PositionUnavailable, got: {:?}", other.map(|(p, _)| p)),
        }
    }

    #[tokio::test]
    async fn test_watch_reports_open_failure() {
        let gnss = SerialGnss::new(vec![], 9600, DEFAULT_FIX_TIMEOUT);
        let mut watch = gnss.watch();

        let event = watch.next().await.unwrap();
        assert!(matches!(event, Err(HardwareError::PositionUnavailable(_))));
    }

    #[tokio::test]
    async fn test_pump_emits_fix_then_stream_closed() {
        let reader = Builder::new().read(GGA).read(RMC).build();
        let (tx, mut watch) = watch::channel(4);

        pump(BufReader::new(reader), &tx, DEFAULT_FIX_TIMEOUT).await;

        let fix = watch.next().await.unwrap().unwrap();
        assert!((fix.accuracy_meters - 4.5).abs() < 1e-9);
        assert_eq!(fix.heading_degrees, Some(84.4));

        assert!(matches!(
            watch.next().await,
            Some(Err(HardwareError::PositionUnavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_pump_ignores_corrupt_sentences() {
        let reader = Builder::new()
            .read(b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*00\r\n")
            .read(b"noise\r\n")
            .read(RMC)
            .build();
        let (tx, mut watch) = watch::channel(4);

        pump(BufReader::new(reader), &tx, DEFAULT_FIX_TIMEOUT).await;

        let fix = watch.next().await.unwrap().unwrap();
        assert_eq!(fix.accuracy_meters, crate::location::nmea::UNKNOWN_ACCURACY_M);
        assert!(watch.next().await.unwrap().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_reports_timeout_without_fix() {
        let reader = Builder::new().wait(Duration::from_secs(15)).build();
        let (tx, mut watch) = watch::channel(4);

        pump(BufReader::new(reader), &tx, DEFAULT_FIX_TIMEOUT).await;

        let first = watch.next().await.unwrap();
        assert!(matches!(first, Err(HardwareError::Timeout(ref m)) if m.contains("10 s")));
        assert!(matches!(
            watch.next().await,
            Some(Err(HardwareError::PositionUnavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_pump_stops_when_watch_dropped() {
        let reader = Builder::new().wait(Duration::from_secs(3600)).build();
        let (tx, watch) = watch::channel(4);
        drop(watch);

        tokio::time::timeout(Duration::from_secs(1), pump(BufReader::new(reader), &tx, DEFAULT_FIX_TIMEOUT))
            .await
            .expect("pump should return once the watch is dropped");
    }

    // Integration test - only runs if a GNSS receiver is connected
    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_watch_with_real_hardware() {
        let gnss = SerialGnss::default();
        if !gnss.is_available() {
            println!("No GNSS receiver detected (skipping)");
            return;
        }

        let mut watch = gnss.watch();
        let event = tokio::time::timeout(Duration::from_secs(30), watch.next()).await;
        println!("First GNSS event: {:?}", event);
    }
}
