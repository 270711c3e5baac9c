//! Risk heuristics engine.
//!
//! A pure, synchronous rule evaluator over a normalized component map. Every
//! rule is evaluated independently; any match appends its reason and raises
//! its flag, so flags are not mutually exclusive. [`evaluate`] performs no
//! I/O and is deterministic: identical input yields identical output.
//!
//! The `is_emulator` and `is_cloner` flags force a hard gate deny regardless
//! of the derived [`Severity`] label; `has_inconsistent_data` alone only
//! raises the severity to [`Severity::Medium`].

use serde::{Deserialize, Serialize};

use crate::signal::{keys, ComponentMap, ComponentValue};

/// User-agent substrings of known emulator / app-cloning products.
pub const EMULATOR_BRANDS: [&str; 5] = ["bluestacks", "nox", "ldplayer", "memu", "genymotion"];

/// GPU descriptor substrings indicating software rasterization (no hardware
/// acceleration), a strong emulator signal.
pub const SOFTWARE_RASTERIZERS: [&str; 2] = ["swiftshader", "llvmpipe"];

/// User-agent substrings of headless browsers and automation drivers.
pub const AUTOMATION_MARKERS: [&str; 3] = ["headless", "phantomjs", "selenium"];

/// Screen width/height ratios outside `[MIN_ASPECT_RATIO, MAX_ASPECT_RATIO]`
/// are treated as a cloner signal.
pub const MIN_ASPECT_RATIO: f64 = 0.4;
pub const MAX_ASPECT_RATIO: f64 = 3.0;

pub const REASON_DESKTOP_KERNEL_MOBILE_UA: &str =
    "possible emulator: desktop kernel with mobile user agent";
pub const REASON_KNOWN_EMULATOR_UA: &str = "known emulator user agent";
pub const REASON_UNUSUAL_ASPECT_RATIO: &str = "unusual screen aspect ratio";
pub const REASON_SOFTWARE_RENDERING: &str = "software rendering detected";
pub const REASON_UNUSUAL_TIMEZONE: &str = "unusual timezone format";
pub const REASON_CANVAS_BLOCKED: &str = "canvas fingerprint blocked or unavailable";
pub const REASON_AUTOMATION_CLIENT: &str = "automation/headless client detected";
pub const REASON_NO_DESKTOP_PLUGINS: &str = "no plugins on a desktop browser";

/// Derived severity label for a verdict.
///
/// `Medium` means the environment looks inconsistent but no hard emulator or
/// cloner signal fired. The label never overrides the hard flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
        }
    }
}

/// Outcome of heuristic evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RiskVerdict {
    pub is_emulator: bool,
    pub is_cloner: bool,
    pub has_inconsistent_data: bool,
    /// Human-readable reasons in rule order.
    pub reasons: Vec<String>,
}

impl RiskVerdict {
    /// True when the verdict forces a gate deny independent of severity.
    pub fn is_hard_block(&self) -> bool {
        self.is_emulator || self.is_cloner
    }

    /// Derived severity: `Medium` iff only inconsistency fired.
    pub fn severity(&self) -> Severity {
        if self.has_inconsistent_data && !self.is_emulator && !self.is_cloner {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Evaluates all rules against a normalized component map.
pub fn evaluate(components: &ComponentMap) -> RiskVerdict {
    let mut verdict = RiskVerdict::default();

    let platform = lowered(components, keys::PLATFORM);
    let vendor = lowered(components, keys::VENDOR);
    let user_agent = lowered(components, keys::USER_AGENT);

    // Rule 1: desktop kernel reporting a mobile client with no GPU vendor.
    if platform.contains("linux")
        && (user_agent.contains("android") || user_agent.contains("mobile"))
        && vendor.is_empty()
    {
        verdict.is_emulator = true;
        verdict.reasons.push(REASON_DESKTOP_KERNEL_MOBILE_UA.to_string());
    }

    // Rule 2: known emulator brand in the user agent.
    if EMULATOR_BRANDS.iter().any(|brand| user_agent.contains(brand)) {
        verdict.is_emulator = true;
        verdict.reasons.push(REASON_KNOWN_EMULATOR_UA.to_string());
    }

    // Rule 3: cloner apps run at unusual screen aspect ratios.
    if let Some((width, height)) = dimensions(components, keys::SCREEN_RESOLUTION) {
        if height > 0.0 {
            let ratio = width / height;
            if ratio < MIN_ASPECT_RATIO || ratio > MAX_ASPECT_RATIO {
                verdict.is_cloner = true;
                verdict.reasons.push(REASON_UNUSUAL_ASPECT_RATIO.to_string());
            }
        }
    }

    // Rule 4: software rasterizer in the GPU descriptor.
    let webgl_vendor = lowered(components, keys::WEBGL_VENDOR);
    let webgl_renderer = lowered(components, keys::WEBGL_RENDERER);
    if SOFTWARE_RASTERIZERS
        .iter()
        .any(|s| webgl_vendor.contains(s) || webgl_renderer.contains(s))
    {
        verdict.is_emulator = true;
        verdict.reasons.push(REASON_SOFTWARE_RENDERING.to_string());
    }

    // Rule 5: IANA timezone names carry a region separator; anything else
    // except plain "UTC" is suspect.
    let timezone = raw(components, keys::TIMEZONE);
    if !timezone.is_empty() && timezone != "UTC" && !timezone.contains('/') {
        verdict.has_inconsistent_data = true;
        verdict.reasons.push(REASON_UNUSUAL_TIMEZONE.to_string());
    }

    // Rule 6: missing canvas signal means fingerprinting was blocked.
    let canvas_present = matches!(
        components.get(keys::CANVAS),
        Some(ComponentValue::Str(s)) if !s.is_empty()
    );
    if !canvas_present {
        verdict.has_inconsistent_data = true;
        verdict.reasons.push(REASON_CANVAS_BLOCKED.to_string());
    }

    // Rule 7: headless browser or automation driver.
    if AUTOMATION_MARKERS.iter().any(|m| user_agent.contains(m)) {
        verdict.is_emulator = true;
        verdict.reasons.push(REASON_AUTOMATION_CLIENT.to_string());
    }

    // Rule 8: desktop browsers normally expose at least one plugin.
    let is_mobile_ua = user_agent.contains("mobile") || user_agent.contains("android");
    if !is_mobile_ua && !has_plugins(components) {
        verdict.has_inconsistent_data = true;
        verdict.reasons.push(REASON_NO_DESKTOP_PLUGINS.to_string());
    }

    verdict
}

fn raw<'a>(components: &'a ComponentMap, key: &str) -> &'a str {
    components.get(key).and_then(ComponentValue::as_str).unwrap_or("")
}

fn lowered(components: &ComponentMap, key: &str) -> String {
    raw(components, key).to_lowercase()
}

fn dimensions(components: &ComponentMap, key: &str) -> Option<(f64, f64)> {
    match components.get(key) {
        Some(ComponentValue::Array(items)) if items.len() >= 2 => {
            Some((items[0].as_f64()?, items[1].as_f64()?))
        },
        _ => None,
    }
}

fn has_plugins(components: &ComponentMap) -> bool {
    match components.get(keys::PLUGINS) {
        Some(ComponentValue::Array(items)) => !items.is_empty(),
        Some(ComponentValue::Str(s)) => !s.is_empty(),
        Some(ComponentValue::Null) | None => false,
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A component map that trips no rule: mobile client, hardware GPU,
    /// region timezone, canvas present.
    fn clean_mobile() -> ComponentMap {
        let mut map = ComponentMap::new();
        map.insert(
            keys::USER_AGENT.to_string(),
            "Mozilla/5.0 (Linux; Android 13; Pixel 7) Mobile Safari/537.36".into(),
        );
        map.insert(keys::PLATFORM.to_string(), "Linux armv8l".into());
        map.insert(keys::VENDOR.to_string(), "Google Inc.".into());
        map.insert(
            keys::SCREEN_RESOLUTION.to_string(),
            ComponentValue::Array(vec![ComponentValue::Int(1080), ComponentValue::Int(2340)]),
        );
        map.insert(keys::WEBGL_VENDOR.to_string(), "Qualcomm".into());
        map.insert(keys::WEBGL_RENDERER.to_string(), "Adreno (TM) 730".into());
        map.insert(keys::TIMEZONE.to_string(), "Asia/Tbilisi".into());
        map.insert(keys::CANVAS.to_string(), "a93fd1e2".into());
        map
    }

    #[test]
    fn clean_profile_produces_empty_verdict() {
        let verdict = evaluate(&clean_mobile());
        assert!(!verdict.is_emulator);
        assert!(!verdict.is_cloner);
        assert!(!verdict.has_inconsistent_data);
        assert!(verdict.reasons.is_empty());
        assert_eq!(verdict.severity(), Severity::Low);
        assert!(!verdict.is_hard_block());
    }

    #[test]
    fn desktop_kernel_with_mobile_ua_and_no_vendor_is_emulator() {
        let mut map = clean_mobile();
        map.insert(keys::PLATFORM.to_string(), "Linux x86_64".into());
        map.insert(keys::VENDOR.to_string(), "".into());
        let verdict = evaluate(&map);
        assert!(verdict.is_emulator);
        assert!(verdict.is_hard_block());
        assert!(verdict
            .reasons
            .iter()
            .any(|r| r.contains("mobile user agent")));
    }

    #[test]
    fn known_emulator_brands_are_flagged() {
        for brand in EMULATOR_BRANDS {
            let mut map = clean_mobile();
            map.insert(
                keys::USER_AGENT.to_string(),
                format!("Mozilla/5.0 (Linux; Android 9; {brand}) Mobile").into(),
            );
            let verdict = evaluate(&map);
            assert!(verdict.is_emulator, "brand {brand} not flagged");
            assert!(verdict.reasons.contains(&REASON_KNOWN_EMULATOR_UA.to_string()));
        }
    }

    #[test]
    fn aspect_ratio_outside_bounds_is_cloner() {
        for (w, h, cloner) in [
            (300, 1000, true),  // 0.3
            (400, 1000, false), // exactly 0.4
            (1080, 2340, false),
            (3000, 1000, false), // exactly 3.0
            (3100, 1000, true),  // 3.1
        ] {
            let mut map = clean_mobile();
            map.insert(
                keys::SCREEN_RESOLUTION.to_string(),
                ComponentValue::Array(vec![ComponentValue::Int(w), ComponentValue::Int(h)]),
            );
            let verdict = evaluate(&map);
            assert_eq!(verdict.is_cloner, cloner, "ratio {w}/{h}");
        }
    }

    #[test]
    fn software_rasterizer_in_renderer_or_vendor_is_emulator() {
        let mut map = clean_mobile();
        map.insert(keys::WEBGL_RENDERER.to_string(), "Google SwiftShader".into());
        let verdict = evaluate(&map);
        assert!(verdict.is_emulator);
        assert!(verdict.reasons.contains(&REASON_SOFTWARE_RENDERING.to_string()));

        let mut map = clean_mobile();
        map.insert(keys::WEBGL_VENDOR.to_string(), "llvmpipe (LLVM 15.0)".into());
        assert!(evaluate(&map).is_emulator);
    }

    #[test]
    fn timezone_without_region_separator_is_inconsistent() {
        let mut map = clean_mobile();
        map.insert(keys::TIMEZONE.to_string(), "GMT+4".into());
        let verdict = evaluate(&map);
        assert!(verdict.has_inconsistent_data);
        assert_eq!(verdict.severity(), Severity::Medium);

        // Plain UTC is acceptable.
        let mut map = clean_mobile();
        map.insert(keys::TIMEZONE.to_string(), "UTC".into());
        assert!(!evaluate(&map).has_inconsistent_data);
    }

    #[test]
    fn missing_or_empty_canvas_is_inconsistent() {
        let mut map = clean_mobile();
        map.remove(keys::CANVAS);
        let verdict = evaluate(&map);
        assert!(verdict.has_inconsistent_data);
        assert!(verdict.reasons.contains(&REASON_CANVAS_BLOCKED.to_string()));

        let mut map = clean_mobile();
        map.insert(keys::CANVAS.to_string(), "".into());
        assert!(evaluate(&map).has_inconsistent_data);
    }

    #[test]
    fn headless_client_is_emulator() {
        let mut map = clean_mobile();
        map.insert(
            keys::USER_AGENT.to_string(),
            "Mozilla/5.0 (Windows NT 10.0) HeadlessChrome/90.0".into(),
        );
        // Desktop UA now, so give it plugins to isolate the automation rule.
        map.insert(
            keys::PLUGINS.to_string(),
            ComponentValue::Array(vec!["PDF Viewer".into()]),
        );
        let verdict = evaluate(&map);
        assert!(verdict.is_emulator);
        assert!(verdict
            .reasons
            .iter()
            .any(|r| r.contains("automation/headless")));
    }

    #[test]
    fn desktop_without_plugins_is_inconsistent() {
        let mut map = clean_mobile();
        map.insert(
            keys::USER_AGENT.to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0".into(),
        );
        let verdict = evaluate(&map);
        assert!(verdict.has_inconsistent_data);
        assert!(verdict.reasons.contains(&REASON_NO_DESKTOP_PLUGINS.to_string()));

        map.insert(
            keys::PLUGINS.to_string(),
            ComponentValue::Array(vec!["PDF Viewer".into()]),
        );
        assert!(!evaluate(&map)
            .reasons
            .contains(&REASON_NO_DESKTOP_PLUGINS.to_string()));
    }

    #[test]
    fn rules_are_independent_and_reasons_ordered() {
        let mut map = clean_mobile();
        map.insert(keys::PLATFORM.to_string(), "Linux x86_64".into());
        map.insert(keys::VENDOR.to_string(), "".into());
        map.insert(keys::WEBGL_RENDERER.to_string(), "SwiftShader".into());
        map.insert(
            keys::SCREEN_RESOLUTION.to_string(),
            ComponentValue::Array(vec![ComponentValue::Int(100), ComponentValue::Int(1000)]),
        );
        let verdict = evaluate(&map);
        assert!(verdict.is_emulator);
        assert!(verdict.is_cloner);
        assert_eq!(verdict.reasons[0], REASON_DESKTOP_KERNEL_MOBILE_UA);
        assert_eq!(verdict.reasons[1], REASON_UNUSUAL_ASPECT_RATIO);
        assert_eq!(verdict.reasons[2], REASON_SOFTWARE_RENDERING);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let mut map = clean_mobile();
        map.insert(keys::WEBGL_RENDERER.to_string(), "SwiftShader".into());
        let first = evaluate(&map);
        let second = evaluate(&map);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[test]
    fn severity_label_never_masks_hard_flags() {
        // Emulator plus inconsistency still reports Low, and the hard block
        // stands on its own.
        let mut map = clean_mobile();
        map.insert(keys::WEBGL_RENDERER.to_string(), "SwiftShader".into());
        map.remove(keys::CANVAS);
        let verdict = evaluate(&map);
        assert!(verdict.is_emulator);
        assert!(verdict.has_inconsistent_data);
        assert_eq!(verdict.severity(), Severity::Low);
        assert!(verdict.is_hard_block());
    }
}
