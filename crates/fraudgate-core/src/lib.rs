//! fraudgate-core - domain logic for the anti-fraud eligibility gatekeeper.
//!
//! This crate holds everything that is pure and I/O-free:
//!
//! - [`signal`]: the device signal model (`DeviceSignature`, component map)
//!   and the normalizer that flattens raw probe output into canonical
//!   key/value components.
//! - [`heuristics`]: the rule-based risk engine classifying a client as
//!   emulated, cloned, or environmentally inconsistent.
//! - [`decision`]: the closed reason-code taxonomy and the
//!   [`EligibilityDecision`](decision::EligibilityDecision) produced by the
//!   gate.
//! - [`wallet`]: structural validation of withdrawal wallet addresses.
//! - [`config`]: gatekeeper configuration shared by the daemon and the
//!   client agent.
//!
//! The server-side gate lives in `fraudgate-daemon`; the client-side signal
//! collector and gate adapter live in `fraudgate-agent`. Both depend on this
//! crate so that the heuristic rules evaluated client-side for fast feedback
//! are byte-for-byte the rules the daemon enforces.

pub mod config;
pub mod decision;
pub mod heuristics;
pub mod signal;
pub mod wallet;
