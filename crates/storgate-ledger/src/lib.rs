//! The quota ledger.
//!
//! Per `(storage pool, tenant group)` capacity accounting over the shared
//! store, with the concurrency contract the mediator depends on: capacity
//! is reserved *before* the upstream forward (`approve`) and committed only
//! *after* a successful one (`publish_created`). Reservations whose forward
//! never completed are reclaimed by the [`FenceSweeper`].
//!
//! Every ledger entry is a durable record keyed
//! `quota:<pool>:<group>:<volume>`; entries transition strictly along
//! `pending → created`, `pending → fenced`, and `created → deleted`, and
//! are never deleted — their existence is the audit trail.

pub mod entry;
pub mod error;
pub mod ledger;
pub mod sweeper;

pub use entry::{LedgerEntry, VolumeState, entry_key, parse_entry_key, pending_key, used_key};
pub use error::{LedgerError, LedgerResult};
pub use ledger::QuotaLedger;
pub use sweeper::FenceSweeper;
