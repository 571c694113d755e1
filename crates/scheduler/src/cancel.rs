//! Cancellation for blocking polling loops.
//!
//! Built on a `watch` channel: the handle flips the flag, every token clone
//! observes it. A token whose handle was dropped without cancelling never
//! fires.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_, token) = cancel_pair();
        token
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is gone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Outcome of waiting between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pause {
    Elapsed,
    Cancelled,
    DeadlineReached,
}

/// Sleep `interval`, cut short by cancellation or by `deadline`.
pub(crate) async fn pause(cancel: &CancelToken, interval: Duration, deadline: Option<Instant>) -> Pause {
    if cancel.is_cancelled() {
        return Pause::Cancelled;
    }
    let now = Instant::now();
    let (wake, hits_deadline) = match deadline {
        Some(d) if d <= now => return Pause::DeadlineReached,
        Some(d) if d <= now + interval => (d, true),
        _ => (now + interval, false),
    };

    tokio::select! {
        _ = cancel.cancelled() => Pause::Cancelled,
        _ = tokio::time::sleep_until(wake) => {
            if hits_deadline { Pause::DeadlineReached } else { Pause::Elapsed }
        }
    }
}
