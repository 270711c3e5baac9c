//! Signal collection.
//!
//! The collector owns the session's [`DeviceSignature`]. Signals come from a
//! [`SignalProbe`], the seam the embedding shell implements: a webview shell
//! feeds browser facts (user agent, screen geometry, GPU strings, canvas
//! digest), while the bundled [`HostProbe`] reads what the host process can
//! observe on its own. Raw probe output is normalized, and the visitor id is
//! the SHA-256 of the canonical component serialization, so the same device
//! configuration yields the same identity across sessions.
//!
//! Collection runs once; the result is cached for the remainder of the
//! session. Probe failure never propagates: the collector logs it and
//! produces a `fallback_`-prefixed identity so the enclosing flow can
//! proceed degraded instead of hard-failing on a client-side problem.

use async_trait::async_trait;
use chrono::Utc;
use fraudgate_core::signal::{keys, normalize, ComponentMap, DeviceSignature, FALLBACK_PREFIX};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Length of the random suffix of a fallback identity.
const FALLBACK_SUFFIX_LEN: usize = 9;

/// Probe failures. The collector recovers from all of them.
#[derive(Debug, Clone, Error)]
#[error("signal probe failed: {0}")]
pub struct ProbeError(pub String);

/// Source of raw device/environment signals.
///
/// Implementations may return library-style nested result objects or flat
/// maps; the collector normalizes either.
#[async_trait]
pub trait SignalProbe: Send + Sync {
    async fn read_components(&self) -> Result<Value, ProbeError>;
}

/// Probe over facts the host process can observe without an embedding
/// shell: OS/architecture platform string, locale and timezone environment,
/// and hardware concurrency.
#[derive(Debug, Default, Clone)]
pub struct HostProbe;

#[async_trait]
impl SignalProbe for HostProbe {
    async fn read_components(&self) -> Result<Value, ProbeError> {
        let concurrency = std::thread::available_parallelism().map(usize::from).unwrap_or(1);
        let mut components = serde_json::Map::new();
        components.insert(
            keys::PLATFORM.to_string(),
            Value::String(format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)),
        );
        components.insert(keys::HARDWARE_CONCURRENCY.to_string(), json!(concurrency));
        if let Ok(lang) = std::env::var("LANG") {
            components.insert(keys::LANGUAGE.to_string(), Value::String(lang));
        }
        if let Ok(tz) = std::env::var("TZ") {
            components.insert(keys::TIMEZONE.to_string(), Value::String(tz));
        }
        Ok(Value::Object(components))
    }
}

/// Collects and caches the session's device signature.
pub struct SignalCollector<P> {
    probe: P,
    cached: OnceCell<DeviceSignature>,
}

impl<P: SignalProbe> SignalCollector<P> {
    pub fn new(probe: P) -> Self {
        Self { probe, cached: OnceCell::new() }
    }

    /// Returns the session signature, collecting it on first use.
    ///
    /// Never fails: a probe error produces a fallback identity with an
    /// empty component map.
    pub async fn collect(&self) -> DeviceSignature {
        self.cached
            .get_or_init(|| async {
                match self.probe.read_components().await {
                    Ok(raw) => {
                        let components = normalize(&raw);
                        let visitor_id = visitor_id(&components);
                        debug!(visitor_id = %visitor_id, "device signature collected");
                        DeviceSignature { visitor_id, components, collected_at: Utc::now() }
                    },
                    Err(err) => {
                        warn!(error = %err, "signal collection failed, using fallback identity");
                        DeviceSignature {
                            visitor_id: fallback_visitor_id(),
                            components: ComponentMap::new(),
                            collected_at: Utc::now(),
                        }
                    },
                }
            })
            .await
            .clone()
    }
}

/// Hex SHA-256 of the canonical (key-ordered) component serialization.
fn visitor_id(components: &ComponentMap) -> String {
    let canonical = serde_json::to_vec(components).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    hex::encode(digest)
}

fn fallback_visitor_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(FALLBACK_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{FALLBACK_PREFIX}{}_{suffix}", Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    struct FixedProbe {
        payload: Value,
        reads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SignalProbe for FixedProbe {
        async fn read_components(&self) -> Result<Value, ProbeError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.clone())
        }
    }

    struct BrokenProbe;

    #[async_trait]
    impl SignalProbe for BrokenProbe {
        async fn read_components(&self) -> Result<Value, ProbeError> {
            Err(ProbeError("sandboxed".to_string()))
        }
    }

    fn payload() -> Value {
        json!({
            "userAgent": "Mozilla/5.0 (Linux; Android 13) Mobile",
            "canvas": { "value": "a93fd1e2" },
            "screenResolution": [1080, 2340],
        })
    }

    #[tokio::test]
    async fn collection_runs_once_and_is_cached() {
        let reads = Arc::new(AtomicUsize::new(0));
        let collector =
            SignalCollector::new(FixedProbe { payload: payload(), reads: Arc::clone(&reads) });

        let first = collector.collect().await;
        let second = collector.collect().await;
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert!(!first.is_fallback());
    }

    #[tokio::test]
    async fn identical_configurations_yield_identical_visitor_ids() {
        let a = SignalCollector::new(FixedProbe {
            payload: payload(),
            reads: Arc::new(AtomicUsize::new(0)),
        });
        let b = SignalCollector::new(FixedProbe {
            payload: payload(),
            reads: Arc::new(AtomicUsize::new(0)),
        });
        assert_eq!(a.collect().await.visitor_id, b.collect().await.visitor_id);

        let mut changed = payload();
        changed["userAgent"] = Value::String("Mozilla/5.0 (Windows NT 10.0)".to_string());
        let c = SignalCollector::new(FixedProbe {
            payload: changed,
            reads: Arc::new(AtomicUsize::new(0)),
        });
        assert_ne!(a.collect().await.visitor_id, c.collect().await.visitor_id);
    }

    #[tokio::test]
    async fn probe_failure_degrades_to_fallback_identity() {
        let collector = SignalCollector::new(BrokenProbe);
        let signature = collector.collect().await;
        assert!(signature.is_fallback());
        assert!(signature.visitor_id.starts_with(FALLBACK_PREFIX));
        assert!(signature.components.is_empty());

        // Cached like any other signature.
        let again = collector.collect().await;
        assert_eq!(signature.visitor_id, again.visitor_id);
    }

    #[tokio::test]
    async fn nested_probe_output_is_normalized() {
        let collector = SignalCollector::new(FixedProbe {
            payload: payload(),
            reads: Arc::new(AtomicUsize::new(0)),
        });
        let signature = collector.collect().await;
        assert_eq!(
            signature.components.get("canvas").and_then(|v| v.as_str()),
            Some("a93fd1e2")
        );
    }

    #[tokio::test]
    async fn host_probe_reports_platform_and_concurrency() {
        let raw = HostProbe.read_components().await.unwrap();
        assert!(raw[keys::PLATFORM].as_str().unwrap().contains(std::env::consts::OS));
        assert!(raw[keys::HARDWARE_CONCURRENCY].as_u64().unwrap() >= 1);
    }
}
