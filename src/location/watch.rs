//! Cancellable position subscription

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{DeviceFix, HardwareError};

/// Item delivered by a hardware watch
pub type PositionEvent = std::result::Result<DeviceFix, HardwareError>;

/// Receiving side of a hardware watch
///
/// Cancelling or dropping the watch signals the producer to stop.
#[derive(Debug)]
pub struct PositionWatch {
    rx: mpsc::Receiver<PositionEvent>,
    cancel: CancellationToken,
}

/// Producing side of a hardware watch
#[derive(Debug, Clone)]
pub struct PositionSender {
    tx: mpsc::Sender<PositionEvent>,
    cancel: CancellationToken,
}

/// Create a watch with room for `capacity` undelivered events
pub fn channel(capacity: usize) -> (PositionSender, PositionWatch) {
    let (tx, rx) = mpsc::channel(capacity);
    let cancel = CancellationToken::new();
    (
        PositionSender {
            tx,
            cancel: cancel.clone(),
        },
        PositionWatch { rx, cancel },
    )
}

impl PositionWatch {
    /// Next event, or `None` once the producer is gone
    pub async fn next(&mut self) -> Option<PositionEvent> {
        self.rx.recv().await
    }

    /// Ask the producer to stop
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that fires when the watch is cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl PositionSender {
    /// Deliver an event; false once the watch is cancelled or dropped
    pub async fn send(&self, event: PositionEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(event).await.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the watch is cancelled or dropped
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fix() -> DeviceFix {
        DeviceFix {
            lat: 1.0,
            lon: 2.0,
            accuracy_meters: 3.0,
            heading_degrees: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let (tx, mut watch) = channel(4);
        assert!(tx.send(Ok(fix())).await);
        assert!(tx.send(Err(HardwareError::Timeout("no fix".into()))).await);
        drop(tx);

        assert!(matches!(watch.next().await, Some(Ok(_))));
        assert!(matches!(watch.next().await, Some(Err(HardwareError::Timeout(_)))));
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_sender() {
        let (tx, watch) = channel(4);
        watch.cancel();
        assert!(tx.is_cancelled());
        assert!(!tx.send(Ok(fix())).await);
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let (tx, watch) = channel(4);
        drop(watch);
        tx.cancelled().await;
        assert!(!tx.send(Ok(fix())).await);
    }
}
