//! The four ledger operations.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use storgate_core::QuotaRequest;
use storgate_store::{KeyGuard, KeyWrite, KvStore};

use crate::entry::{LedgerEntry, VolumeState, entry_key, pending_key, used_key};
use crate::error::{LedgerError, LedgerResult};

/// Default bound on compare-and-swap retries per operation.
const DEFAULT_MAX_RETRIES: usize = 16;

/// Capacity accounting over the shared store.
///
/// All four operations are optimistic compare-and-swap loops: each
/// iteration reads the entry and the `(pool, group)` counters, computes the
/// successor state, and applies it only if nothing moved underneath. Losing
/// a race re-reads; exhausting the retry budget is a [`LedgerError`] and
/// the mediated request is not forwarded.
///
/// Operations on different `(pool, group)` pairs never contend.
#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn KvStore>,
    max_retries: usize,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Overrides the CAS retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Atomically reserves `qr.capacity_kb` against `cap`.
    ///
    /// Admits iff `used + pending + capacity ≤ cap`, writing a `pending`
    /// entry and bumping the provisional counter in one step. Idempotent on
    /// the request tuple: re-approving an entry already `pending` or
    /// `created` returns `true` without a second reservation. Tuples whose
    /// entry is `deleted` or `fenced` start a fresh attempt.
    ///
    /// Returns `true` iff the reservation is admitted.
    #[instrument(skip(self, qr), fields(pool = %qr.storage_pool_id, group = %qr.group, volume = %qr.volume_name, cap))]
    pub async fn approve(&self, qr: &QuotaRequest, cap: u64) -> LedgerResult<bool> {
        let ekey = entry_key(&qr.storage_pool_id, &qr.group, &qr.volume_name);
        let ukey = used_key(&qr.storage_pool_id, &qr.group);
        let pkey = pending_key(&qr.storage_pool_id, &qr.group);

        for _ in 0..self.max_retries {
            let entry_raw = self.store.get(&ekey).await?;
            if let Some(raw) = &entry_raw {
                let entry = decode_entry(&ekey, raw)?;
                match entry.state {
                    VolumeState::Pending | VolumeState::Created => {
                        debug!("reservation already held");
                        return Ok(true);
                    }
                    // A reused volume name restarts the lifecycle.
                    VolumeState::Deleted | VolumeState::Fenced => {}
                }
            }

            let (used_raw, used) = self.read_counter(&ukey).await?;
            let (pending_raw, pending) = self.read_counter(&pkey).await?;

            if used + pending + qr.capacity_kb > cap {
                debug!(used, pending, "reservation rejected: over cap");
                return Ok(false);
            }

            let now = OffsetDateTime::now_utc().unix_timestamp();
            let applied = self
                .store
                .compare_and_swap(
                    &[
                        KeyGuard::new(&ekey, entry_raw),
                        KeyGuard::new(&ukey, used_raw),
                        KeyGuard::new(&pkey, pending_raw),
                    ],
                    &[
                        KeyWrite::set(&ekey, LedgerEntry::pending(qr.capacity_kb, now).encode()),
                        KeyWrite::set(&pkey, (pending + qr.capacity_kb).to_string()),
                    ],
                )
                .await?;
            if applied {
                debug!(reserved_kb = qr.capacity_kb, "reservation admitted");
                return Ok(true);
            }
        }

        Err(LedgerError::contention(ekey))
    }

    /// Commits a reservation after a successful upstream create:
    /// `pending → created`, moving the capacity from the provisional
    /// counter into used quota.
    ///
    /// Idempotent; a no-op returning `true` when no `pending` entry exists.
    #[instrument(skip(self, qr), fields(pool = %qr.storage_pool_id, group = %qr.group, volume = %qr.volume_name))]
    pub async fn publish_created(&self, qr: &QuotaRequest) -> LedgerResult<bool> {
        let ekey = entry_key(&qr.storage_pool_id, &qr.group, &qr.volume_name);
        let ukey = used_key(&qr.storage_pool_id, &qr.group);
        let pkey = pending_key(&qr.storage_pool_id, &qr.group);

        for _ in 0..self.max_retries {
            let Some(raw) = self.store.get(&ekey).await? else {
                return Ok(true);
            };
            let mut entry = decode_entry(&ekey, &raw)?;
            match entry.state {
                VolumeState::Created | VolumeState::Deleted => return Ok(true),
                VolumeState::Fenced => {
                    // The forward outran the sweeper: the volume exists
                    // upstream but its capacity is no longer reserved.
                    warn!("publish_created on fenced entry; usage undercounts until reconciled");
                    return Ok(true);
                }
                VolumeState::Pending => {}
            }

            let (used_raw, used) = self.read_counter(&ukey).await?;
            let (pending_raw, pending) = self.read_counter(&pkey).await?;

            entry.state = VolumeState::Created;
            entry.updated_at = OffsetDateTime::now_utc().unix_timestamp();

            let applied = self
                .store
                .compare_and_swap(
                    &[
                        KeyGuard::new(&ekey, Some(raw)),
                        KeyGuard::new(&ukey, used_raw),
                        KeyGuard::new(&pkey, pending_raw),
                    ],
                    &[
                        KeyWrite::set(&ekey, entry.encode()),
                        KeyWrite::set(&ukey, (used + entry.capacity_kb).to_string()),
                        KeyWrite::set(
                            &pkey,
                            pending.saturating_sub(entry.capacity_kb).to_string(),
                        ),
                    ],
                )
                .await?;
            if applied {
                debug!(committed_kb = entry.capacity_kb, "reservation committed");
                return Ok(true);
            }
        }

        Err(LedgerError::contention(ekey))
    }

    /// Records an intent to delete ahead of the upstream forward, without
    /// freeing quota.
    ///
    /// Unknown tuples get an entry created directly in the intent-to-delete
    /// state (capacity from the request, usually zero on the delete wire
    /// form) so retries after record loss stay idempotent.
    #[instrument(skip(self, qr), fields(pool = %qr.storage_pool_id, group = %qr.group, volume = %qr.volume_name))]
    pub async fn delete_request(&self, qr: &QuotaRequest) -> LedgerResult<bool> {
        let ekey = entry_key(&qr.storage_pool_id, &qr.group, &qr.volume_name);

        for _ in 0..self.max_retries {
            let entry_raw = self.store.get(&ekey).await?;
            let now = OffsetDateTime::now_utc().unix_timestamp();

            let successor = match &entry_raw {
                None => LedgerEntry::delete_intent(qr.capacity_kb, now),
                Some(raw) => {
                    let mut entry = decode_entry(&ekey, raw)?;
                    match entry.state {
                        // Nothing left to free; the intent is moot.
                        VolumeState::Deleted | VolumeState::Fenced => return Ok(true),
                        VolumeState::Created | VolumeState::Pending => {
                            if entry.delete_requested {
                                return Ok(true);
                            }
                            entry.delete_requested = true;
                            entry.updated_at = now;
                            entry
                        }
                    }
                }
            };

            let applied = self
                .store
                .compare_and_swap(
                    &[KeyGuard::new(&ekey, entry_raw)],
                    &[KeyWrite::set(&ekey, successor.encode())],
                )
                .await?;
            if applied {
                debug!("delete intent recorded");
                return Ok(true);
            }
        }

        Err(LedgerError::contention(ekey))
    }

    /// Publishes a completed deletion: `created → deleted`, releasing the
    /// stored capacity from used quota.
    ///
    /// Idempotent; a no-op returning `true` on absent or already-deleted
    /// entries. `pending` entries are left untouched (no legal edge).
    #[instrument(skip(self, qr), fields(pool = %qr.storage_pool_id, group = %qr.group, volume = %qr.volume_name))]
    pub async fn publish_deleted(&self, qr: &QuotaRequest) -> LedgerResult<bool> {
        let ekey = entry_key(&qr.storage_pool_id, &qr.group, &qr.volume_name);
        let ukey = used_key(&qr.storage_pool_id, &qr.group);

        for _ in 0..self.max_retries {
            let Some(raw) = self.store.get(&ekey).await? else {
                return Ok(true);
            };
            let mut entry = decode_entry(&ekey, &raw)?;
            match entry.state {
                VolumeState::Deleted | VolumeState::Fenced => return Ok(true),
                VolumeState::Pending => {
                    warn!("publish_deleted on pending entry; ignoring");
                    return Ok(true);
                }
                VolumeState::Created => {}
            }

            let (used_raw, used) = self.read_counter(&ukey).await?;

            entry.state = VolumeState::Deleted;
            entry.updated_at = OffsetDateTime::now_utc().unix_timestamp();

            let applied = self
                .store
                .compare_and_swap(
                    &[
                        KeyGuard::new(&ekey, Some(raw)),
                        KeyGuard::new(&ukey, used_raw),
                    ],
                    &[
                        KeyWrite::set(&ekey, entry.encode()),
                        KeyWrite::set(&ukey, used.saturating_sub(entry.capacity_kb).to_string()),
                    ],
                )
                .await?;
            if applied {
                debug!(released_kb = entry.capacity_kb, "deletion published");
                return Ok(true);
            }
        }

        Err(LedgerError::contention(ekey))
    }

    /// Committed usage for a `(pool, group)` in kilobytes.
    pub async fn used(&self, pool: &str, group: &str) -> LedgerResult<u64> {
        let (_, used) = self.read_counter(&used_key(pool, group)).await?;
        Ok(used)
    }

    async fn read_counter(&self, key: &str) -> LedgerResult<(Option<String>, u64)> {
        let raw = self.store.get(key).await?;
        let value = match &raw {
            None => 0,
            Some(text) => text
                .parse::<u64>()
                .map_err(|e| LedgerError::corrupt(key, e.to_string()))?,
        };
        Ok((raw, value))
    }
}

fn decode_entry(key: &str, raw: &str) -> LedgerResult<LedgerEntry> {
    serde_json::from_str(raw).map_err(|e| LedgerError::corrupt(key, e.to_string()))
}
