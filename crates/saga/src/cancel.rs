//! Caller cancellation.
//!
//! The request handler holds a [`CancelHandle`]; the saga observes the paired
//! [`CancelSignal`] around each participant call. Dropping the handle counts
//! as cancelling.

use std::future::Future;

use tokio::sync::watch;

/// Creates a connected handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

/// Caller side of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // No receivers left means the saga already finished.
        let _ = self.tx.send(true);
    }
}

/// Saga side of a cancellation pair.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.rx {
            None => false,
            Some(rx) => *rx.borrow() || rx.has_changed().is_err(),
        }
    }

    /// Resolves once the caller cancels or drops its handle.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Runs `future` unless cancellation comes first, in which case the
    /// future is dropped and `None` is returned.
    pub async fn run<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = future => Some(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_never_runs_to_completion() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        assert_eq!(signal.run(async { 5 }).await, Some(5));
    }

    #[tokio::test]
    async fn test_cancel_before_run_skips_future() {
        let (handle, signal) = cancel_pair();
        handle.cancel();
        assert!(signal.is_cancelled());
        assert_eq!(signal.run(async { 5 }).await, None);
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels() {
        let (handle, signal) = cancel_pair();
        drop(handle);
        assert!(signal.is_cancelled());
        assert_eq!(signal.run(std::future::pending::<()>()).await, None);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_in_flight_future() {
        let (handle, signal) = cancel_pair();
        let task = tokio::spawn(async move {
            signal
                .run(tokio::time::sleep(Duration::from_secs(30)))
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        assert_eq!(task.await.unwrap(), None);
    }
}
