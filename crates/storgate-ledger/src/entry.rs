use serde::{Deserialize, Serialize};

/// The lifecycle state of one volume provisioning attempt.
///
/// Legal transitions: `Pending → Created`, `Pending → Fenced`,
/// `Created → Deleted`. `Created` is the only state that contributes to
/// used quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeState {
    /// Reserved, forward outcome unknown.
    Pending,
    /// Forward succeeded; capacity counted against the pool.
    Created,
    /// Deletion published; capacity released.
    Deleted,
    /// Reservation reclaimed by the sweeper; never forwarded.
    Fenced,
}

impl VolumeState {
    /// Whether the `self → next` edge is one of the three legal transitions.
    #[must_use]
    pub fn can_transition_to(self, next: VolumeState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Created)
                | (Self::Pending, Self::Fenced)
                | (Self::Created, Self::Deleted)
        )
    }
}

/// One durable provisioning record in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub state: VolumeState,

    /// Reserved capacity in kilobytes.
    pub capacity_kb: u64,

    /// Unix seconds the reservation was admitted.
    pub approved_at: i64,

    /// Unix seconds of the last state change.
    pub updated_at: i64,

    /// Intent-to-delete marker set by `delete_request` ahead of the
    /// upstream forward. Orthogonal to `state`.
    #[serde(default)]
    pub delete_requested: bool,
}

impl LedgerEntry {
    /// A fresh `pending` reservation.
    pub fn pending(capacity_kb: u64, now: i64) -> Self {
        Self {
            state: VolumeState::Pending,
            capacity_kb,
            approved_at: now,
            updated_at: now,
            delete_requested: false,
        }
    }

    /// An entry created directly by a delete retry for a tuple the ledger
    /// never saw (record loss or pre-ledger volume).
    pub fn delete_intent(capacity_kb: u64, now: i64) -> Self {
        Self {
            state: VolumeState::Created,
            capacity_kb,
            approved_at: now,
            updated_at: now,
            delete_requested: true,
        }
    }

    pub fn encode(&self) -> String {
        // LedgerEntry serializes infallibly: no maps, no non-string keys.
        serde_json::to_string(self).expect("ledger entry serialization")
    }
}

/// Store key of a volume's ledger entry.
pub fn entry_key(pool: &str, group: &str, volume: &str) -> String {
    format!("quota:{pool}:{group}:{volume}")
}

/// Store key of a `(pool, group)`'s committed usage counter (kilobytes).
pub fn used_key(pool: &str, group: &str) -> String {
    format!("quota:{pool}:{group}:used")
}

/// Store key of a `(pool, group)`'s provisional (pending) counter.
pub fn pending_key(pool: &str, group: &str) -> String {
    format!("quota:{pool}:{group}:pending")
}

/// Splits an entry key back into `(pool, group, volume)`.
///
/// Counter keys (`…:used`, `…:pending`) and keys outside the `quota:`
/// namespace return `None`.
pub fn parse_entry_key(key: &str) -> Option<(&str, &str, &str)> {
    let rest = key.strip_prefix("quota:")?;
    let mut parts = rest.splitn(3, ':');
    let pool = parts.next()?;
    let group = parts.next()?;
    let volume = parts.next()?;
    if volume == "used" || volume == "pending" || volume.is_empty() {
        return None;
    }
    Some((pool, group, volume))
}
