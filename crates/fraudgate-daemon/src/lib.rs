//! fraudgate-daemon - the server-side eligibility gate.
//!
//! The daemon is the authority that combines the heuristic verdict with
//! durable history to produce allow/deny decisions at the two choke points
//! (registration and withdrawal), and owns the append-only attempt ledger.
//!
//! - [`store`]: SQLite-backed history store (deny-lists, prior
//!   registrations, withdrawal history) and the attempt ledger.
//! - [`gate`]: the ordered, fail-closed eligibility checks.
//! - [`http`]: the axum validation API with trusted-proxy IP extraction.
//!
//! The binary in `main.rs` wires configuration, logging, and the listener.

pub mod gate;
pub mod http;
pub mod store;
