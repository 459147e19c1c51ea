//! Sweep cancellation

use tokio::sync::watch;

/// Create a connected cancellation pair.
///
/// The [`Canceller`] stays with the caller; [`CancelSignal`] clones go to
/// every worker. Dropping the canceller without calling
/// [`Canceller::cancel`] never cancels.
#[must_use]
pub fn cancellation() -> (Canceller, CancelSignal) {
    let (sender, receiver) = watch::channel(false);
    (Canceller { sender }, CancelSignal { receiver })
}

/// Requests cancellation of a running sweep.
#[derive(Debug)]
pub struct Canceller {
    sender: watch::Sender<bool>,
}

impl Canceller {
    /// Cancel: running children are killed, queued configurations are skipped.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Get another signal connected to this canceller.
    #[must_use]
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Observes cancellation; cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        let (_, receiver) = watch::channel(false);
        Self { receiver }
    }

    /// True once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve when cancellation is requested; pend forever if the
    /// canceller is dropped first.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.receiver.borrow_and_update() {
                return;
            }
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_signal() {
        let (canceller, mut signal) = cancellation();
        assert!(!signal.is_cancelled());

        let waiter = tokio::spawn(async move {
            signal.cancelled().await;
        });
        canceller.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_canceller_never_fires() {
        let (canceller, mut signal) = cancellation();
        drop(canceller);
        let result = tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(result.is_err());
        assert!(!signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_signal() {
        let mut signal = CancelSignal::never();
        let result = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_subscribed_signal_sees_cancel() {
        let (canceller, _signal) = cancellation();
        let other = canceller.signal();
        canceller.cancel();
        assert!(other.is_cancelled());
    }
}
