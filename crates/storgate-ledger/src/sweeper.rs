//! Background reclamation of abandoned reservations.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use storgate_store::{KeyGuard, KeyWrite, KvStore};

use crate::entry::{LedgerEntry, VolumeState, parse_entry_key, pending_key};
use crate::error::LedgerResult;

/// Default age after which a `pending` reservation is reclaimed.
pub const DEFAULT_FENCE_AFTER: Duration = Duration::from_secs(180);

/// Default scan period.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Reclaims `pending` reservations whose forward never completed.
///
/// Without it, a worker that dies between `approve` and `publish_created`
/// leaks its reservation forever and the pool's admittable capacity shrinks.
/// The sweeper transitions such entries `pending → fenced` and reverses the
/// provisional counter, atomically per entry.
pub struct FenceSweeper {
    store: Arc<dyn KvStore>,
    fence_after: Duration,
    interval: Duration,
}

impl FenceSweeper {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            fence_after: DEFAULT_FENCE_AFTER,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Overrides the fencing window.
    #[must_use]
    pub fn with_fence_after(mut self, fence_after: Duration) -> Self {
        self.fence_after = fence_after;
        self
    }

    /// Overrides the scan period.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs the sweep loop until `shutdown` flips.
    ///
    /// Scan failures are logged and the loop continues; a dead sweeper is
    /// worse than a noisy one.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            fence_after_secs = self.fence_after.as_secs(),
            interval_secs = self.interval.as_secs(),
            "fence sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "fence sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("fence sweeper stopping");
                    return;
                }
            }
        }
    }

    /// One full scan. Exposed for tests and operator-triggered sweeps.
    pub async fn sweep_once(&self) -> LedgerResult<usize> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let cutoff = now - self.fence_after.as_secs() as i64;
        let mut fenced = 0;

        for key in self.store.keys_with_prefix("quota:").await? {
            let Some((pool, group, volume)) = parse_entry_key(&key) else {
                continue;
            };
            let (pool, group, volume) = (pool.to_string(), group.to_string(), volume.to_string());

            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            let entry: LedgerEntry = match serde_json::from_str(&raw) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping unreadable ledger entry");
                    continue;
                }
            };

            if entry.state != VolumeState::Pending || entry.approved_at > cutoff {
                continue;
            }

            if self.fence_entry(&key, &pool, &group, raw, entry, now).await? {
                warn!(pool = %pool, group = %group, volume = %volume, "fenced abandoned reservation");
                fenced += 1;
            }
        }

        if fenced > 0 {
            debug!(fenced, "fence sweep reclaimed reservations");
        }
        Ok(fenced)
    }

    async fn fence_entry(
        &self,
        key: &str,
        pool: &str,
        group: &str,
        raw: String,
        mut entry: LedgerEntry,
        now: i64,
    ) -> LedgerResult<bool> {
        let pkey = pending_key(pool, group);
        let pending_raw = self.store.get(&pkey).await?;
        let pending = pending_raw
            .as_deref()
            .map(|v| v.parse::<u64>().unwrap_or(0))
            .unwrap_or(0);

        let capacity = entry.capacity_kb;
        entry.state = VolumeState::Fenced;
        entry.updated_at = now;

        // Losing the race means the forward completed (or another sweeper
        // got here first); either way this entry is done.
        self.store
            .compare_and_swap(
                &[
                    KeyGuard::new(key, Some(raw)),
                    KeyGuard::new(&pkey, pending_raw),
                ],
                &[
                    KeyWrite::set(key, entry.encode()),
                    KeyWrite::set(&pkey, pending.saturating_sub(capacity).to_string()),
                ],
            )
            .await
            .map_err(Into::into)
    }
}
