// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod filter;
pub mod fingerprint;
pub mod ingest;
pub mod ledger;
pub mod notify;
pub mod pipeline;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::filter::{FilterPolicy, KeywordFilter, Verdict};
pub use crate::fingerprint::{fingerprint, Fingerprint};
pub use crate::ingest::types::{CandidateItem, FetchError, SourceDetails, SourceKind, SourceProvider};
pub use crate::ledger::{AlertLedger, AlertStore};
pub use crate::notify::Notifier;
pub use crate::pipeline::{CycleReport, PollCycle};
