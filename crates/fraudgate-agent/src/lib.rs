//! fraudgate-agent - client-side half of the anti-fraud gatekeeper.
//!
//! - [`collector`]: gathers device/environment signals through a
//!   [`SignalProbe`](collector::SignalProbe), derives the stable visitor id,
//!   caches the result for the session, and degrades to a clearly marked
//!   fallback identity when collection fails.
//! - [`adapter`]: orchestrates the two guarded flows. It pre-validates what
//!   can be rejected cheaply (wallet format, amounts), calls the eligibility
//!   gate over HTTP, and interprets anything short of an explicit allow as a
//!   deny (fail-closed).
//!
//! The agent never mutates durable state directly; only the daemon does.

pub mod adapter;
pub mod collector;
