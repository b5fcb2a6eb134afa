//! Decision and capture thresholds.
//!
//! Every numeric threshold in the engine is policy, not a constant: the
//! business-correct values are a deployment decision. Defaults follow the
//! current production values; a TOML policy file and `VERIDOC_*` env vars
//! override them (env wins over file, file wins over defaults).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thresholds for the verification gate sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Minimum detection confidence for the single document face (0–100).
    pub min_face_confidence: f32,
    /// Minimum face brightness (0–100). Deliberately low — real documents
    /// get photographed in poor light.
    pub min_brightness: f32,
    /// Minimum face sharpness (0–100). Deliberately low, same reason.
    pub min_sharpness: f32,
    /// Maximum |roll|, |yaw|, |pitch| in degrees.
    pub max_pose_degrees: f32,
    /// Minimum selfie/document similarity to approve (0–100, inclusive).
    pub min_selfie_similarity: f32,
    /// Minimum reference-photo similarity when the check is evaluated.
    pub min_reference_similarity: f32,
    /// Floor passed to the comparison engine. Kept at 0 so a weak match
    /// still comes back with a numeric score for diagnostics instead of
    /// an empty match list.
    pub compare_request_threshold: f32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            min_face_confidence: 99.0,
            min_brightness: 10.0,
            min_sharpness: 3.0,
            max_pose_degrees: 30.0,
            min_selfie_similarity: 70.0,
            min_reference_similarity: 80.0,
            compare_request_threshold: 0.0,
        }
    }
}

impl Policy {
    /// Defaults overridden by any `VERIDOC_*` env vars that are set.
    pub fn from_env() -> Self {
        let mut policy = Self::default();
        policy.apply_env();
        policy
    }

    /// Override fields from `VERIDOC_*` env vars. Unset or unparsable
    /// values leave the current field untouched.
    pub fn apply_env(&mut self) {
        env_override(&mut self.min_face_confidence, "VERIDOC_MIN_FACE_CONFIDENCE");
        env_override(&mut self.min_brightness, "VERIDOC_MIN_BRIGHTNESS");
        env_override(&mut self.min_sharpness, "VERIDOC_MIN_SHARPNESS");
        env_override(&mut self.max_pose_degrees, "VERIDOC_MAX_POSE_DEGREES");
        env_override(&mut self.min_selfie_similarity, "VERIDOC_MIN_SELFIE_SIMILARITY");
        env_override(
            &mut self.min_reference_similarity,
            "VERIDOC_MIN_REFERENCE_SIMILARITY",
        );
        env_override(
            &mut self.compare_request_threshold,
            "VERIDOC_COMPARE_REQUEST_THRESHOLD",
        );
    }
}

/// Settings for the two capture state machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapturePolicy {
    /// Milliseconds between document OCR samples.
    pub sample_interval_ms: u64,
    /// Countdown length for the liveness capture, in whole seconds.
    pub countdown_ticks: u32,
    /// Document keywords; the recognized text is uppercased before the
    /// containment test, so these should be uppercase.
    pub keywords: Vec<String>,
    /// Language hint handed to the OCR capability.
    pub ocr_language: String,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            sample_interval_ms: 2000,
            countdown_ticks: 3,
            keywords: vec![
                "REPUBLICA".to_string(),
                "DOMINICANA".to_string(),
                "CEDULA".to_string(),
                "IDENTIDAD".to_string(),
            ],
            ocr_language: "spa".to_string(),
        }
    }
}

impl CapturePolicy {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

fn env_override(field: &mut f32, key: &str) {
    if let Some(v) = std::env::var(key).ok().and_then(|v| v.parse().ok()) {
        *field = v;
    }
}
