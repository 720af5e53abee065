//! Background expiry sweeps.
//!
//! Expiry is enforced lazily on every read path; the sweeper only keeps the
//! stores from accumulating dead rows, so a missed tick costs nothing but
//! space.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::stores::{PaymentRequestStore, SessionStore};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Spawn the periodic sweep task. Runs until the handle is aborted.
pub fn spawn_sweeper(
    sessions: Arc<dyn SessionStore>,
    requests: Arc<dyn PaymentRequestStore>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let now = Utc::now();
            match sessions.purge_expired(now).await {
                Ok(purged) if purged > 0 => debug!(purged, "purged expired sessions"),
                Ok(_) => {}
                Err(error) => warn!(%error, "session sweep failed"),
            }
            match requests.expire_overdue(now).await {
                Ok(expired) if expired > 0 => debug!(expired, "expired overdue payment requests"),
                Ok(_) => {}
                Err(error) => warn!(%error, "payment request sweep failed"),
            }
        }
    })
}
