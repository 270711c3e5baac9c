//! Device signal model.
//!
//! A [`DeviceSignature`] is the stable identity derived from a noisy set of
//! client-observable signals: an opaque `visitor_id` that survives cookie
//! clearing, plus the flat component map the risk heuristics inspect.
//!
//! Components are kept in a [`BTreeMap`] so that serializing the map is
//! canonical: hashing the serialized form yields the same visitor id for the
//! same device configuration across sessions.

mod normalize;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use normalize::normalize;

/// Prefix of locally generated fallback identities, used when signal
/// collection fails. Fallback identities are deliberately distinguishable
/// from real visitor ids so downstream consumers can tell a degraded
/// session from an identified one.
pub const FALLBACK_PREFIX: &str = "fallback_";

/// Well-known component keys.
///
/// Key names follow the client collection library's camelCase convention
/// because they travel over the wire inside the `components` map.
pub mod keys {
    pub const USER_AGENT: &str = "userAgent";
    pub const PLATFORM: &str = "platform";
    pub const VENDOR: &str = "vendor";
    pub const LANGUAGE: &str = "language";
    pub const LANGUAGES: &str = "languages";
    pub const COOKIE_ENABLED: &str = "cookieEnabled";
    pub const DO_NOT_TRACK: &str = "doNotTrack";
    pub const HARDWARE_CONCURRENCY: &str = "hardwareConcurrency";
    pub const MAX_TOUCH_POINTS: &str = "maxTouchPoints";
    pub const SCREEN_RESOLUTION: &str = "screenResolution";
    pub const AVAILABLE_SCREEN_RESOLUTION: &str = "availableScreenResolution";
    pub const COLOR_DEPTH: &str = "colorDepth";
    pub const PIXEL_RATIO: &str = "pixelRatio";
    pub const WEBGL_VENDOR: &str = "webglVendor";
    pub const WEBGL_RENDERER: &str = "webglRenderer";
    pub const TIMEZONE: &str = "timezone";
    pub const TIMEZONE_OFFSET: &str = "timezoneOffset";
    pub const CANVAS: &str = "canvas";
    pub const PLUGINS: &str = "plugins";
}

/// A single flattened component value.
///
/// This is a closed model: raw probe output is normalized into these shapes
/// at the boundary instead of carrying loosely typed JSON through the
/// subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<ComponentValue>),
    Null,
}

impl ComponentValue {
    /// Returns the string content, if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the numeric content, widening integers to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for ComponentValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ComponentValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for ComponentValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ComponentValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ComponentValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Flat, name-keyed map of client-observed components.
///
/// Insertion order is irrelevant; lookups are by name and iteration order is
/// the key order, which keeps the canonical serialization stable.
pub type ComponentMap = BTreeMap<String, ComponentValue>;

/// A stable pseudo-identity for a device/browser installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSignature {
    /// Deterministic identifier for the device configuration. For the same
    /// configuration this value is stable across sessions; it is never a
    /// random session token, except in the fallback case.
    pub visitor_id: String,
    /// The normalized components the identity was derived from.
    pub components: ComponentMap,
    /// When collection ran.
    pub collected_at: DateTime<Utc>,
}

impl DeviceSignature {
    /// True when this signature carries a locally generated fallback
    /// identity rather than a collected one.
    pub fn is_fallback(&self) -> bool {
        self.visitor_id.starts_with(FALLBACK_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_value_deserializes_scalars_and_arrays() {
        let value: ComponentValue = serde_json::from_str("\"Linux x86_64\"").unwrap();
        assert_eq!(value.as_str(), Some("Linux x86_64"));

        let value: ComponentValue = serde_json::from_str("24").unwrap();
        assert_eq!(value.as_f64(), Some(24.0));

        let value: ComponentValue = serde_json::from_str("[1080, 2340]").unwrap();
        match value {
            ComponentValue::Array(items) => assert_eq!(items.len(), 2),
            other => panic!("expected array, got {other:?}"),
        }

        let value: ComponentValue = serde_json::from_str("null").unwrap();
        assert_eq!(value, ComponentValue::Null);
    }

    #[test]
    fn component_map_serialization_is_key_ordered() {
        let mut map = ComponentMap::new();
        map.insert("zeta".to_string(), ComponentValue::from(1_i64));
        map.insert("alpha".to_string(), ComponentValue::from("x"));
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.find("alpha").unwrap() < json.find("zeta").unwrap());
    }

    #[test]
    fn fallback_detection_matches_prefix() {
        let signature = DeviceSignature {
            visitor_id: format!("{FALLBACK_PREFIX}1700000000000_a1b2c3d4e"),
            components: ComponentMap::new(),
            collected_at: Utc::now(),
        };
        assert!(signature.is_fallback());

        let signature = DeviceSignature {
            visitor_id: "3f2a9c".to_string(),
            components: ComponentMap::new(),
            collected_at: Utc::now(),
        };
        assert!(!signature.is_fallback());
    }
}
