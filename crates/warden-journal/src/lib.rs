//! Warden Journal - the append-only timeline.
//!
//! Every action, human decision, token transition, and role application
//! lands here as an ordered record with a journal-assigned monotonic
//! cursor. Records are never mutated, only appended. Disk mode writes one
//! NDJSON file per UTC day and is durable on return; the in-memory mode is
//! explicit and meant for tests.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod export;
pub mod journal;
pub mod record;

pub use error::{JournalError, JournalResult};
pub use export::ExportFormat;
pub use journal::Journal;
pub use record::{JournalRecord, SequencedRecord, TokenAction};
