//! Cooperative cancellation and deadlines for integration calls.
//!
//! A [`CancelToken`] is a cloneable flag backed by a `tokio::sync::watch`
//! channel. Units check it before starting and periodically inside the solver
//! loop. Each call runs under a child of the caller's token: fan-in trips the
//! child on the first unit failure so queued units bail out, while the
//! caller's token only ever reflects the caller's own requests.

use std::sync::Arc;
use std::time::Duration;

use futures::future::select_all;
use tokio::sync::watch;
use uuid::Uuid;

use crate::config::ExecutionConfig;
use crate::domain::error::{EpiError, Result};

/// Shared cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    /// Own flag first, then every ancestor's.
    watched: Vec<watch::Receiver<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            watched: vec![rx],
        }
    }

    /// A token that trips whenever `self` does, but whose own `cancel`
    /// leaves `self` untouched.
    pub fn child(&self) -> Self {
        let (tx, rx) = watch::channel(false);
        let mut watched = Vec::with_capacity(self.watched.len() + 1);
        watched.push(rx);
        watched.extend(self.watched.iter().cloned());
        Self {
            tx: Arc::new(tx),
            watched,
        }
    }

    /// Trip the flag. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.watched.iter().any(|rx| *rx.borrow())
    }

    /// `Err(Cancelled)` once the flag is tripped.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EpiError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the flag, or any ancestor's, is tripped.
    pub async fn cancelled(&self) {
        let waits = self
            .watched
            .iter()
            .cloned()
            .map(|rx| Box::pin(tripped(rx)));
        select_all(waits).await;
    }
}

async fn tripped(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Every handle that could trip this flag is gone.
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-supplied governance for one strategy call.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pub cancel: CancelToken,
    /// Wall-clock budget measured from the moment the call starts.
    pub deadline: Option<Duration>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            cancel: CancelToken::new(),
            deadline: config.deadline_ms.map(Duration::from_millis),
        }
    }

    /// Pin the deadline to "now" and refuse to start if already cancelled.
    ///
    /// The armed call gets a child token, so failures and deadlines inside
    /// the call never trip `self.cancel`.
    pub(crate) fn arm(&self, run_id: Uuid) -> Result<Armed> {
        self.cancel.check()?;
        let deadline = self.deadline.map(|budget| {
            (
                tokio::time::Instant::now() + budget,
                budget.as_millis() as u64,
            )
        });
        Ok(Armed {
            run_id,
            cancel: self.cancel.child(),
            deadline,
        })
    }
}

/// A [`RunControl`] bound to one running call.
#[derive(Debug, Clone)]
pub(crate) struct Armed {
    pub run_id: Uuid,
    pub cancel: CancelToken,
    /// Absolute deadline and the original budget in milliseconds.
    pub deadline: Option<(tokio::time::Instant, u64)>,
}

impl Armed {
    /// Cancellation and deadline check between fan-in points.
    pub fn check(&self) -> Result<()> {
        self.cancel.check()?;
        if let Some((at, limit_ms)) = self.deadline {
            if tokio::time::Instant::now() >= at {
                self.cancel.cancel();
                return Err(EpiError::DeadlineExceeded { limit_ms });
            }
        }
        Ok(())
    }
}
