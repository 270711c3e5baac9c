//! The eligibility gate.
//!
//! Ordered, fail-closed checks over the heuristic verdict and durable
//! history. The gate is read-only against the store; the single
//! authoritative attempt-ledger write happens in the HTTP handler wrapping
//! [`EligibilityGate::check_registration`], once per attempt, whatever the
//! verdict.
//!
//! Check order is significant and the first failing check wins. Heuristic
//! hard blocks are decided before any store lookup so that obviously
//! emulated clients never cost a history query.

use chrono::{Duration, Utc};
use fraudgate_core::config::GatekeeperConfig;
use fraudgate_core::decision::{EligibilityDecision, ReasonCode};
use fraudgate_core::heuristics::{evaluate, RiskVerdict};
use fraudgate_core::signal::ComponentMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::store::{SqliteHistoryStore, StoreError};

/// Gate failures. Any of these means the check could not be completed; the
/// caller responds fail-closed (`validation_error`, HTTP 500).
#[derive(Debug, Error)]
pub enum GateError {
    #[error("history lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// Inputs to a registration check.
#[derive(Debug, Clone)]
pub struct RegistrationInput<'a> {
    pub fingerprint: &'a str,
    pub components: &'a ComponentMap,
    pub observed_ip: &'a str,
    pub telegram_id: Option<&'a str>,
    pub phone_number: Option<&'a str>,
}

/// A registration decision together with the heuristic verdict that fed it,
/// so the caller can derive the suspicion label and the ledger block reason
/// without re-evaluating.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub decision: EligibilityDecision,
    pub verdict: RiskVerdict,
}

impl RegistrationOutcome {
    /// The reason string to persist in the attempt ledger, if the decision
    /// was a deny: the joined heuristic reasons for a heuristic block, the
    /// reason code otherwise.
    pub fn ledger_block_reason(&self) -> Option<String> {
        if self.decision.allowed {
            return None;
        }
        match self.decision.reason_code {
            Some(ReasonCode::SuspiciousDevice) => Some(self.verdict.reasons.join("; ")),
            Some(code) => Some(code.as_str().to_string()),
            // Unreachable given the decision invariant, but never panic on it.
            None => Some(String::new()),
        }
    }
}

/// The server-side authority deciding registration and withdrawal
/// eligibility.
#[derive(Debug, Clone)]
pub struct EligibilityGate {
    store: SqliteHistoryStore,
    config: GatekeeperConfig,
}

impl EligibilityGate {
    pub fn new(store: SqliteHistoryStore, config: GatekeeperConfig) -> Self {
        Self { store, config }
    }

    /// Decides whether a registration attempt is allowed.
    ///
    /// First failing check wins: missing fingerprint, heuristic hard block,
    /// active blocklist match (fingerprint, IP, telegram id), then reuse
    /// thresholds (fingerprint, IP, phone). An allow echoes `observed_ip`.
    ///
    /// # Errors
    ///
    /// Returns `GateError` only when a history lookup fails; heuristic and
    /// input problems are decisions, not errors.
    pub fn check_registration(
        &self,
        input: &RegistrationInput<'_>,
    ) -> Result<RegistrationOutcome, GateError> {
        let ip = input.observed_ip;

        if input.fingerprint.trim().is_empty() {
            debug!("registration check with no fingerprint");
            return Ok(RegistrationOutcome {
                decision: EligibilityDecision::deny(ReasonCode::MissingFingerprint, ip),
                verdict: RiskVerdict::default(),
            });
        }

        let verdict = evaluate(input.components);
        if verdict.is_hard_block() {
            info!(
                fingerprint = input.fingerprint,
                reasons = ?verdict.reasons,
                "registration denied by heuristics"
            );
            return Ok(RegistrationOutcome {
                decision: EligibilityDecision::deny(ReasonCode::SuspiciousDevice, ip),
                verdict,
            });
        }

        if let Some(code) = self.history_deny(input)? {
            info!(fingerprint = input.fingerprint, reason = %code, "registration denied by history");
            return Ok(RegistrationOutcome {
                decision: EligibilityDecision::deny(code, ip),
                verdict,
            });
        }

        debug!(fingerprint = input.fingerprint, "registration allowed");
        Ok(RegistrationOutcome { decision: EligibilityDecision::allow(ip), verdict })
    }

    fn history_deny(&self, input: &RegistrationInput<'_>) -> Result<Option<ReasonCode>, GateError> {
        if self.store.is_device_blocked(input.fingerprint)? {
            return Ok(Some(ReasonCode::DeviceBlocked));
        }
        if input.observed_ip != "unknown" && self.store.is_ip_blocked(input.observed_ip)? {
            return Ok(Some(ReasonCode::IpBlocked));
        }
        if let Some(telegram_id) = input.telegram_id.filter(|t| !t.is_empty()) {
            if self.store.is_telegram_blocked(telegram_id)? {
                return Ok(Some(ReasonCode::TelegramBlocked));
            }
        }

        let reuse = &self.config.reuse;
        if self.store.count_registrations_by_fingerprint(input.fingerprint)? >= reuse.max_per_device
        {
            return Ok(Some(ReasonCode::DeviceReused));
        }
        if input.observed_ip != "unknown"
            && self.store.count_registrations_by_ip(input.observed_ip)? >= reuse.max_per_ip
        {
            return Ok(Some(ReasonCode::IpReused));
        }
        if let Some(phone) = input.phone_number.filter(|p| !p.is_empty()) {
            if self.store.count_registrations_by_phone(phone)? >= reuse.max_per_phone {
                return Ok(Some(ReasonCode::PhoneReused));
            }
        }

        Ok(None)
    }

    /// Decides whether a withdrawal request is allowed.
    ///
    /// The wallet address is already structurally valid when this is called;
    /// format enforcement lives with the caller and malformed addresses are
    /// never charged against the gate.
    ///
    /// # Errors
    ///
    /// Returns `GateError` only when a history lookup fails.
    pub fn check_withdrawal(
        &self,
        profile_id: &str,
        wallet_address: &str,
        observed_ip: &str,
    ) -> Result<EligibilityDecision, GateError> {
        if self.store.is_wallet_suspicious(wallet_address)? {
            info!(profile_id, "withdrawal denied: wallet on deny-list");
            return Ok(EligibilityDecision::deny(ReasonCode::SuspiciousWallet, observed_ip));
        }

        let policy = &self.config.withdrawal;
        let since = Utc::now() - Duration::hours(i64::from(policy.velocity_window_hours));
        if self.store.count_withdrawals_since(profile_id, since)? >= policy.max_per_window {
            info!(profile_id, "withdrawal denied: velocity limit");
            return Ok(EligibilityDecision::deny(ReasonCode::WithdrawalVelocity, observed_ip));
        }

        debug!(profile_id, "withdrawal allowed");
        Ok(EligibilityDecision::allow(observed_ip))
    }
}
