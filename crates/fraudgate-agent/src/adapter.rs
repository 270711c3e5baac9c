//! Gate adapter.
//!
//! Wires the collector into the two guarded flows. The adapter speaks JSON
//! over HTTP to the eligibility gate and is strictly fail-closed: transport
//! errors, server errors, and unparseable or out-of-taxonomy responses are
//! all treated as "not allowed", and the guarded operation is never
//! attempted without an explicit allow. Clearance tokens make that ordering
//! structural: account creation needs a [`RegistrationClearance`], a ledger
//! insert needs a [`WithdrawalClearance`], and the only way to obtain either
//! is a gate allow.
//!
//! Withdrawal requests that fail cheap local checks (address format,
//! positive amount, configured minimum, sufficient balance) are rejected
//! before any network call so they never consume an audited attempt.

use fraudgate_core::decision::ReasonCode;
use fraudgate_core::heuristics::{evaluate, RiskVerdict, Severity};
use fraudgate_core::signal::ComponentMap;
use fraudgate_core::wallet::{validate_wallet_address, WalletAddressError, WithdrawalRequest};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::collector::{SignalCollector, SignalProbe};

/// Default minimum withdrawal, matching the gatekeeper config default.
pub const DEFAULT_MIN_WITHDRAWAL: f64 = 10.0;

/// Session and profile context, injected explicitly so the adapter stays
/// independently testable. Never ambient state.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub profile_id: String,
    pub balance: f64,
    pub telegram_id: Option<String>,
    pub phone_number: Option<String>,
}

/// Cheap local rejections that never reach the gate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrevalidationError {
    #[error("invalid wallet address: {0}")]
    Wallet(#[from] WalletAddressError),

    #[error("amount must be positive")]
    NonPositiveAmount,

    #[error("amount is below the minimum withdrawal of {min}")]
    BelowMinimum { min: f64 },

    #[error("insufficient balance")]
    InsufficientBalance,
}

/// Failures of a guarded flow.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The gate returned an explicit deny. `message` is the user-facing
    /// text; `code` the machine-readable cause.
    #[error("{message}")]
    Denied { code: ReasonCode, message: String },

    /// The gate was unreachable or its response unusable. Fail-closed: the
    /// generic security message is all the user sees.
    #[error("security check failed")]
    GateUnavailable,

    /// The request failed local pre-validation and never reached the gate.
    #[error(transparent)]
    Rejected(#[from] PrevalidationError),
}

/// Proof of a registration allow. Carries what the caller persists.
#[derive(Debug, Clone)]
pub struct RegistrationClearance {
    pub fingerprint: String,
    /// The network address the gate observed, echoed so the caller can
    /// store it without a second hop.
    pub client_ip: String,
    pub suspicious_level: Severity,
}

/// Proof of a withdrawal allow, wrapping the validated request.
#[derive(Debug, Clone)]
pub struct WithdrawalClearance {
    pub request: WithdrawalRequest,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationWire<'a> {
    device_fingerprint: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    telegram_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_number: Option<&'a str>,
    components: &'a ComponentMap,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationReply {
    allowed: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    client_ip: Option<String>,
    #[serde(default)]
    suspicious_level: Option<Severity>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalWire<'a> {
    profile_id: &'a str,
    usdt_address: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalReply {
    allowed: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttemptWire<'a> {
    ip: &'a str,
    device_fingerprint: &'a str,
    was_blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    block_reason: Option<&'a str>,
}

/// Interprets a deny's wire fields. An allow is `Ok`; a deny with a known
/// reason code becomes [`GuardError::Denied`]; a deny whose code is missing
/// or out of taxonomy is an unknown shape and maps to
/// [`GuardError::GateUnavailable`] rather than being coerced.
fn interpret_deny(reason: Option<&str>, message: Option<String>) -> GuardError {
    match reason.map(str::parse::<ReasonCode>) {
        Some(Ok(code)) => GuardError::Denied {
            code,
            message: message.unwrap_or_else(|| code.user_message().to_string()),
        },
        Some(Err(unknown)) => {
            warn!(error = %unknown, "gate deny with unknown reason code");
            GuardError::GateUnavailable
        },
        None => {
            warn!("gate deny without reason code");
            GuardError::GateUnavailable
        },
    }
}

/// Client-side orchestrator for the guarded flows.
pub struct GateAdapter<P> {
    http: reqwest::Client,
    base_url: String,
    collector: SignalCollector<P>,
    min_withdrawal: f64,
}

impl<P: SignalProbe> GateAdapter<P> {
    pub fn new(base_url: impl Into<String>, probe: P) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            collector: SignalCollector::new(probe),
            min_withdrawal: DEFAULT_MIN_WITHDRAWAL,
        }
    }

    #[must_use]
    pub fn with_min_withdrawal(mut self, min: f64) -> Self {
        self.min_withdrawal = min;
        self
    }

    /// Local heuristic pass over the collected signature, for fast UI
    /// feedback. Never a substitute for the gate: the adapter does not
    /// short-circuit on it, so every real attempt still gets audited
    /// server-side.
    pub async fn preview_verdict(&self) -> RiskVerdict {
        let signature = self.collector.collect().await;
        evaluate(&signature.components)
    }

    /// Runs the registration gate. `Ok` means the caller may proceed with
    /// account creation and persist the echoed client IP.
    ///
    /// # Errors
    ///
    /// `Denied` for an explicit gate deny, `GateUnavailable` for any
    /// transport/shape failure (fail-closed).
    pub async fn check_registration(
        &self,
        ctx: &SessionContext,
    ) -> Result<RegistrationClearance, GuardError> {
        let signature = self.collector.collect().await;
        let wire = RegistrationWire {
            device_fingerprint: &signature.visitor_id,
            telegram_id: ctx.telegram_id.as_deref(),
            phone_number: ctx.phone_number.as_deref(),
            components: &signature.components,
        };

        let response = self
            .http
            .post(format!("{}/validate/registration", self.base_url))
            .json(&wire)
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "registration gate unreachable");
                GuardError::GateUnavailable
            })?;

        if response.status().is_server_error() {
            warn!(status = %response.status(), "registration gate returned server error");
            return Err(GuardError::GateUnavailable);
        }

        let reply: RegistrationReply = response.json().await.map_err(|err| {
            warn!(error = %err, "registration gate response unparseable");
            GuardError::GateUnavailable
        })?;

        if !reply.allowed {
            return Err(interpret_deny(reply.reason.as_deref(), reply.message));
        }

        debug!("registration allowed");
        Ok(RegistrationClearance {
            fingerprint: signature.visitor_id,
            client_ip: reply.client_ip.unwrap_or_else(|| "unknown".to_string()),
            suspicious_level: reply.suspicious_level.unwrap_or(Severity::Low),
        })
    }

    /// Pre-validates and gates a withdrawal. `Ok` hands back the validated
    /// request, ready for the downstream ledger insert.
    ///
    /// # Errors
    ///
    /// `Rejected` for local pre-validation failures (no network call was
    /// made), `Denied`/`GateUnavailable` as for registration.
    pub async fn check_withdrawal(
        &self,
        ctx: &SessionContext,
        wallet_address: &str,
        amount: f64,
    ) -> Result<WithdrawalClearance, GuardError> {
        validate_wallet_address(wallet_address)
            .map_err(|err| GuardError::Rejected(PrevalidationError::Wallet(err)))?;
        if amount <= 0.0 {
            return Err(PrevalidationError::NonPositiveAmount.into());
        }
        if amount < self.min_withdrawal {
            return Err(PrevalidationError::BelowMinimum { min: self.min_withdrawal }.into());
        }
        if amount > ctx.balance {
            return Err(PrevalidationError::InsufficientBalance.into());
        }

        let wire = WithdrawalWire { profile_id: &ctx.profile_id, usdt_address: wallet_address };
        let response = self
            .http
            .post(format!("{}/validate/withdrawal", self.base_url))
            .json(&wire)
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "withdrawal gate unreachable");
                GuardError::GateUnavailable
            })?;

        if response.status().is_server_error() {
            warn!(status = %response.status(), "withdrawal gate returned server error");
            return Err(GuardError::GateUnavailable);
        }

        let reply: WithdrawalReply = response.json().await.map_err(|err| {
            warn!(error = %err, "withdrawal gate response unparseable");
            GuardError::GateUnavailable
        })?;

        if !reply.allowed {
            return Err(interpret_deny(reply.reason.as_deref(), reply.message));
        }

        debug!(profile_id = %ctx.profile_id, "withdrawal allowed");
        Ok(WithdrawalClearance {
            request: WithdrawalRequest {
                profile_id: ctx.profile_id.clone(),
                wallet_address: wallet_address.to_string(),
                amount,
            },
        })
    }

    /// Forwards a login-time IP observation to the attempt ledger.
    /// Fire-and-forget: failures are logged and never surface, so an audit
    /// hiccup cannot break an otherwise-successful login.
    pub async fn log_login_ip(&self, observed_ip: &str) {
        let signature = self.collector.collect().await;
        let wire = AttemptWire {
            ip: observed_ip,
            device_fingerprint: &signature.visitor_id,
            was_blocked: false,
            block_reason: None,
        };
        let result = self
            .http
            .post(format!("{}/attempts", self.base_url))
            .json(&wire)
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), "attempt log rejected");
            },
            Ok(_) => debug!("login ip recorded"),
            Err(err) => warn!(error = %err, "attempt log unreachable"),
        }
    }
}
