use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ActivityError;

/// Single-slot gate admitting one sync pass at a time.
///
/// Concurrent callers wait cooperatively for the in-flight pass to finish,
/// bounded by a hard deadline. On expiry the in-flight flag is force-cleared
/// so a wedged pass can never block syncing permanently.
#[derive(Debug, Default)]
pub struct SyncGuard {
    in_flight: AtomicBool,
    notify: Notify,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for admission, up to `deadline`.
    pub async fn acquire(
        self: &Arc<Self>,
        deadline: Duration,
    ) -> Result<SyncPermit, ActivityError> {
        let start = Instant::now();
        loop {
            if self
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(SyncPermit {
                    guard: self.clone(),
                });
            }

            let remaining = match deadline.checked_sub(start.elapsed()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => {
                    warn!(
                        deadline_secs = deadline.as_secs(),
                        "Timed out waiting for in-flight sync, force-clearing guard"
                    );
                    self.force_clear();
                    return Err(ActivityError::timeout(
                        "timed out waiting for in-flight sync",
                    ));
                }
            };

            debug!("Sync already in flight, waiting for completion");
            // A release between the failed CAS and this wait is covered by
            // the bounded timeout.
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }

    /// Clear the in-flight flag unconditionally and wake waiters. Used on
    /// deadline expiry; the owning permit's release then becomes a no-op.
    pub fn force_clear(&self) {
        self.in_flight.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Admission token; releases the guard on drop.
#[derive(Debug)]
pub struct SyncPermit {
    guard: Arc<SyncGuard>,
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        self.guard.force_clear();
    }
}
