//! Eligibility decisions and the reason-code taxonomy.
//!
//! Reason codes form a closed enumeration: values arriving at a boundary
//! that do not name a known code are rejected during deserialization rather
//! than coerced. Internal codes are never shown raw to end users; every code
//! maps to a distinct human-readable message via [`ReasonCode::user_message`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable cause of a deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// The client never produced a device identity.
    MissingFingerprint,
    /// The heuristics engine hard-blocked the device.
    SuspiciousDevice,
    /// Active blocklist entry matched the device fingerprint.
    DeviceBlocked,
    /// Active blocklist entry matched the network address.
    IpBlocked,
    /// Active blocklist entry matched the telegram id.
    TelegramBlocked,
    /// Prior registrations on this fingerprint reached the reuse threshold.
    DeviceReused,
    /// Prior registrations from this address reached the reuse threshold.
    IpReused,
    /// Prior registrations with this phone reached the reuse threshold.
    PhoneReused,
    /// Active suspicious-wallet entry matched the withdrawal address.
    SuspiciousWallet,
    /// Too many withdrawal requests inside the velocity window.
    WithdrawalVelocity,
    /// A durable-store or history lookup failed.
    ValidationError,
    /// Unexpected internal failure.
    ServerError,
    /// The gate was unreachable from the client's perspective.
    NetworkError,
}

impl ReasonCode {
    /// Wire name of the code (the `snake_case` serde rename).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingFingerprint => "missing_fingerprint",
            Self::SuspiciousDevice => "suspicious_device",
            Self::DeviceBlocked => "device_blocked",
            Self::IpBlocked => "ip_blocked",
            Self::TelegramBlocked => "telegram_blocked",
            Self::DeviceReused => "device_reused",
            Self::IpReused => "ip_reused",
            Self::PhoneReused => "phone_reused",
            Self::SuspiciousWallet => "suspicious_wallet",
            Self::WithdrawalVelocity => "withdrawal_velocity",
            Self::ValidationError => "validation_error",
            Self::ServerError => "server_error",
            Self::NetworkError => "network_error",
        }
    }

    /// The localized, user-visible message for this code. Distinct from the
    /// wire name; callers surface this, never the code itself.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::MissingFingerprint => "Device identification is unavailable",
            Self::SuspiciousDevice => "A suspicious device was detected",
            Self::DeviceBlocked => "This device has been blocked",
            Self::IpBlocked => "This network address has been blocked",
            Self::TelegramBlocked => "This account has been blocked",
            Self::DeviceReused => "An account already exists on this device",
            Self::IpReused => "Too many accounts from this network address",
            Self::PhoneReused => "This phone number is already registered",
            Self::SuspiciousWallet => "This wallet address cannot be used",
            Self::WithdrawalVelocity => "Too many recent withdrawal requests",
            Self::ValidationError => "The security check could not be completed",
            Self::ServerError => "An internal error occurred, please try again later",
            Self::NetworkError => "Security check failed",
        }
    }

    /// Every code, for exhaustiveness checks in tests.
    pub const ALL: [Self; 13] = [
        Self::MissingFingerprint,
        Self::SuspiciousDevice,
        Self::DeviceBlocked,
        Self::IpBlocked,
        Self::TelegramBlocked,
        Self::DeviceReused,
        Self::IpReused,
        Self::PhoneReused,
        Self::SuspiciousWallet,
        Self::WithdrawalVelocity,
        Self::ValidationError,
        Self::ServerError,
        Self::NetworkError,
    ];
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a wire value does not name a known reason code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown reason code: {0}")]
pub struct UnknownReasonCode(pub String);

impl FromStr for ReasonCode {
    type Err = UnknownReasonCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownReasonCode(s.to_string()))
    }
}

/// Final allow/deny outcome of a gate check.
///
/// Invariant: `allowed == false` implies `reason_code.is_some()`; both
/// constructors uphold it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityDecision {
    pub allowed: bool,
    pub reason_code: Option<ReasonCode>,
    pub message: Option<String>,
    /// The network address the gate observed for this attempt, echoed back
    /// so the caller can persist it without a second hop.
    pub observed_ip: String,
}

impl EligibilityDecision {
    pub fn allow(observed_ip: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason_code: None,
            message: None,
            observed_ip: observed_ip.into(),
        }
    }

    pub fn deny(code: ReasonCode, observed_ip: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason_code: Some(code),
            message: Some(code.user_message().to_string()),
            observed_ip: observed_ip.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for code in ReasonCode::ALL {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
            let parsed: ReasonCode = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, code);
            assert_eq!(code.as_str().parse::<ReasonCode>().unwrap(), code);
        }
    }

    #[test]
    fn unknown_codes_are_rejected_not_coerced() {
        assert!(serde_json::from_str::<ReasonCode>("\"totally_new_code\"").is_err());
        assert_eq!(
            "totally_new_code".parse::<ReasonCode>(),
            Err(UnknownReasonCode("totally_new_code".to_string()))
        );
    }

    #[test]
    fn user_messages_are_distinct_and_never_the_code() {
        let messages: HashSet<&str> = ReasonCode::ALL.iter().map(|c| c.user_message()).collect();
        assert_eq!(messages.len(), ReasonCode::ALL.len());
        for code in ReasonCode::ALL {
            assert_ne!(code.user_message(), code.as_str());
        }
    }

    #[test]
    fn deny_always_carries_a_reason() {
        let decision = EligibilityDecision::deny(ReasonCode::SuspiciousDevice, "203.0.113.7");
        assert!(!decision.allowed);
        assert_eq!(decision.reason_code, Some(ReasonCode::SuspiciousDevice));
        assert!(decision.message.is_some());

        let decision = EligibilityDecision::allow("203.0.113.7");
        assert!(decision.allowed);
        assert!(decision.reason_code.is_none());
        assert!(decision.message.is_none());
        assert_eq!(decision.observed_ip, "203.0.113.7");
    }
}
