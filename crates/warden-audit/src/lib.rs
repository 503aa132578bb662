//! Signed, hash-linked audit trail for the Warden governance layer.
//!
//! Per-session append-only logs with inter-record hash linking and
//! Ed25519 signatures, session identity and key lifecycle, the R6
//! request builder, the JSONL event side-channel, and the policy
//! witnessing ledger.

pub mod chain;
pub mod r6;
pub mod session;
pub mod signer;
pub mod stream;
pub mod witness;

pub use chain::{verify_log, AuditChain};
pub use r6::{R6Builder, R6Input};
pub use session::SessionStore;
pub use stream::EventStream;
pub use witness::{WitnessEntry, WitnessLedger};
