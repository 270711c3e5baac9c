//! HTTP surface of the eligibility gate.
//!
//! Three endpoints, all JSON, all answering with permissive CORS so the
//! embedding web client can call them cross-origin:
//!
//! - `POST /validate/registration` - 400 when the fingerprint is absent,
//!   500 when history lookups fail, 200 otherwise (denies included).
//! - `POST /validate/withdrawal` - mirrors the decision without the client
//!   IP or suspicion label.
//! - `POST /attempts` - fire-and-forget ledger writes (login-time IP
//!   observations).
//!
//! The client network address is derived from trusted proxy headers, never
//! from the request body: first element of `x-forwarded-for`, then
//! `cf-connecting-ip`, then `x-real-ip`, else `"unknown"`.

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use fraudgate_core::decision::{EligibilityDecision, ReasonCode};
use fraudgate_core::heuristics::Severity;
use fraudgate_core::signal::normalize;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::gate::{EligibilityGate, RegistrationInput};
use crate::store::{AttemptRecord, SqliteHistoryStore};

/// Shared state: the gate for decisions, the store for ledger writes.
#[derive(Clone)]
pub struct AppState {
    pub gate: EligibilityGate,
    pub store: SqliteHistoryStore,
}

/// Builds the router with permissive CORS applied to every response.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/validate/registration", post(validate_registration).options(preflight))
        .route("/validate/withdrawal", post(validate_withdrawal).options(preflight))
        .route("/attempts", post(record_attempt).options(preflight))
        .layer(map_response(allow_any_origin))
        .with_state(state)
}

async fn allow_any_origin(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// Empty success for CORS preflight.
async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("authorization, content-type"),
        )],
    )
}

/// Resolves the caller's network address from proxy headers.
pub fn client_ip_from_headers(headers: &HeaderMap) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    for name in ["cf-connecting-ip", "x-real-ip"] {
        if let Some(value) = header_str(headers, name) {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    "unknown".to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    #[serde(default)]
    pub device_fingerprint: Option<String>,
    #[serde(default)]
    pub telegram_id: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Raw component map; may be library-nested, normalized on receipt.
    #[serde(default)]
    pub components: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub client_ip: String,
    pub suspicious_level: Severity,
}

impl RegistrationResponse {
    fn from_decision(decision: EligibilityDecision, suspicious_level: Severity) -> Self {
        Self {
            allowed: decision.allowed,
            reason: decision.reason_code,
            message: decision.message,
            client_ip: decision.observed_ip,
            suspicious_level,
        }
    }
}

async fn validate_registration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegistrationRequest>,
) -> Response {
    let client_ip = client_ip_from_headers(&headers);

    let Some(fingerprint) =
        request.device_fingerprint.as_deref().map(str::trim).filter(|f| !f.is_empty())
    else {
        let decision = EligibilityDecision::deny(ReasonCode::MissingFingerprint, client_ip);
        let body = RegistrationResponse::from_decision(decision, Severity::Low);
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    };

    let components = request.components.as_ref().map(normalize).unwrap_or_default();
    let input = RegistrationInput {
        fingerprint,
        components: &components,
        observed_ip: &client_ip,
        telegram_id: request.telegram_id.as_deref(),
        phone_number: request.phone_number.as_deref(),
    };

    match state.gate.check_registration(&input) {
        Ok(outcome) => {
            // Single authoritative logging point: one ledger row per
            // attempt, whatever the verdict. A failed write is logged and
            // the decision stands.
            let record = AttemptRecord {
                ip: client_ip.clone(),
                device_fingerprint: fingerprint.to_string(),
                was_blocked: !outcome.decision.allowed,
                block_reason: outcome.ledger_block_reason(),
                attempted_at: Utc::now(),
            };
            if let Err(err) = state.store.record_attempt(&record) {
                warn!(error = %err, "attempt ledger write failed");
            }

            let severity = outcome.verdict.severity();
            let body = RegistrationResponse::from_decision(outcome.decision, severity);
            (StatusCode::OK, Json(body)).into_response()
        },
        Err(err) => {
            error!(error = %err, "registration validation failed");
            let decision = EligibilityDecision::deny(ReasonCode::ValidationError, client_ip);
            let body = RegistrationResponse::from_decision(decision, Severity::Low);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        },
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalValidationRequest {
    pub profile_id: String,
    pub usdt_address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalValidationResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

async fn validate_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<WithdrawalValidationRequest>,
) -> Response {
    let client_ip = client_ip_from_headers(&headers);
    match state.gate.check_withdrawal(&request.profile_id, &request.usdt_address, &client_ip) {
        Ok(decision) => {
            let body = WithdrawalValidationResponse {
                allowed: decision.allowed,
                reason: decision.reason_code,
                message: decision.message,
            };
            (StatusCode::OK, Json(body)).into_response()
        },
        Err(err) => {
            error!(error = %err, "withdrawal validation failed");
            let body = WithdrawalValidationResponse {
                allowed: false,
                reason: Some(ReasonCode::ValidationError),
                message: Some(ReasonCode::ValidationError.user_message().to_string()),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        },
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptLogRequest {
    pub ip: String,
    pub device_fingerprint: String,
    pub was_blocked: bool,
    #[serde(default)]
    pub block_reason: Option<String>,
}

async fn record_attempt(
    State(state): State<AppState>,
    Json(request): Json<AttemptLogRequest>,
) -> Response {
    let record = AttemptRecord {
        ip: request.ip,
        device_fingerprint: request.device_fingerprint,
        was_blocked: request.was_blocked,
        block_reason: request.block_reason,
        attempted_at: Utc::now(),
    };
    match state.store.record_attempt(&record) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            // Best-effort audit: surface a 500 so the caller may retry, but
            // callers treat this endpoint as fire-and-forget.
            warn!(error = %err, "attempt ledger write failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn forwarded_for_takes_precedence_and_first_hop_wins() {
        let map = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("cf-connecting-ip", "198.51.100.9"),
            ("x-real-ip", "192.0.2.1"),
        ]);
        assert_eq!(client_ip_from_headers(&map), "203.0.113.7");
    }

    #[test]
    fn falls_back_through_proxy_headers_to_unknown() {
        let map = headers(&[("cf-connecting-ip", "198.51.100.9")]);
        assert_eq!(client_ip_from_headers(&map), "198.51.100.9");

        let map = headers(&[("x-real-ip", "192.0.2.1")]);
        assert_eq!(client_ip_from_headers(&map), "192.0.2.1");

        assert_eq!(client_ip_from_headers(&HeaderMap::new()), "unknown");

        // An empty forwarded-for element falls through.
        let map = headers(&[("x-forwarded-for", " "), ("x-real-ip", "192.0.2.1")]);
        assert_eq!(client_ip_from_headers(&map), "192.0.2.1");
    }

    #[test]
    fn registration_response_uses_wire_field_names() {
        let decision = EligibilityDecision::deny(ReasonCode::SuspiciousDevice, "203.0.113.7");
        let body = RegistrationResponse::from_decision(decision, Severity::Medium);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["allowed"], false);
        assert_eq!(json["reason"], "suspicious_device");
        assert_eq!(json["clientIp"], "203.0.113.7");
        assert_eq!(json["suspiciousLevel"], "medium");
    }

    #[test]
    fn allowed_registration_response_omits_reason_and_message() {
        let body = RegistrationResponse::from_decision(
            EligibilityDecision::allow("203.0.113.7"),
            Severity::Low,
        );
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["allowed"], true);
        assert!(json.get("reason").is_none());
        assert!(json.get("message").is_none());
        assert_eq!(json["suspiciousLevel"], "low");
    }

    #[test]
    fn requests_deserialize_from_camel_case() {
        let request: RegistrationRequest = serde_json::from_str(
            r#"{"deviceFingerprint":"fp-1","telegramId":"tg-1","components":{"canvas":"x"}}"#,
        )
        .unwrap();
        assert_eq!(request.device_fingerprint.as_deref(), Some("fp-1"));
        assert_eq!(request.telegram_id.as_deref(), Some("tg-1"));
        assert!(request.components.is_some());

        let request: WithdrawalValidationRequest = serde_json::from_str(
            r#"{"profileId":"profile-1","usdtAddress":"TJ7Hhzgz7y6N3pYUCqPuMBDeAAYaT2PYNE"}"#,
        )
        .unwrap();
        assert_eq!(request.profile_id, "profile-1");

        let request: AttemptLogRequest = serde_json::from_str(
            r#"{"ip":"203.0.113.7","deviceFingerprint":"fp-1","wasBlocked":true,"blockReason":"known emulator user agent"}"#,
        )
        .unwrap();
        assert!(request.was_blocked);
        assert_eq!(request.block_reason.as_deref(), Some("known emulator user agent"));
    }
}
