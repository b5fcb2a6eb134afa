use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use veridoc_core::{CapturePolicy, Policy};

/// On-disk policy file: `[decision]` and `[capture]` sections, both
/// optional. Absent keys fall back to the built-in defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PolicyFile {
    decision: Policy,
    capture: CapturePolicy,
}

/// Service configuration.
///
/// Layering, weakest first: built-in defaults, then the TOML file named
/// by `VERIDOC_POLICY_PATH`, then individual `VERIDOC_*` env vars.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceConfig {
    pub policy: Policy,
    pub capture: CapturePolicy,
    /// Directory of enrolled reference photos; `None` disables the
    /// reference check entirely.
    pub reference_dir: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let (mut policy, capture) = match std::env::var("VERIDOC_POLICY_PATH") {
            Ok(path) => match load_policy_file(&path) {
                Some(file) => (file.decision, file.capture),
                None => (Policy::default(), CapturePolicy::default()),
            },
            Err(_) => (Policy::default(), CapturePolicy::default()),
        };

        // Env vars outrank the file.
        policy.apply_env();

        let reference_dir = std::env::var("VERIDOC_REFERENCE_DIR")
            .map(PathBuf::from)
            .ok();

        Self {
            policy,
            capture,
            reference_dir,
        }
    }
}

/// A missing or malformed file is logged and ignored; the service still
/// comes up on defaults.
fn load_policy_file(path: &str) -> Option<PolicyFile> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(path, error = %err, "policy file unreadable; using defaults");
            return None;
        }
    };
    match toml::from_str::<PolicyFile>(&text) {
        Ok(file) => {
            tracing::info!(path, "policy file loaded");
            Some(file)
        }
        Err(err) => {
            tracing::warn!(path, error = %err, "bad policy file; using defaults");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_file_sections_optional() {
        let file: PolicyFile = toml::from_str("").unwrap();
        assert_eq!(file.decision.min_selfie_similarity, 70.0);
        assert_eq!(file.capture.countdown_ticks, 3);
    }

    #[test]
    fn test_policy_file_partial_sections() {
        let file: PolicyFile = toml::from_str(
            "[decision]\nmin_selfie_similarity = 90.0\n\n[capture]\ncountdown_ticks = 5\n",
        )
        .unwrap();
        assert_eq!(file.decision.min_selfie_similarity, 90.0);
        // Keys not named in the file keep defaults.
        assert_eq!(file.decision.min_face_confidence, 99.0);
        assert_eq!(file.capture.countdown_ticks, 5);
        assert_eq!(file.capture.sample_interval_ms, 2000);
    }

    #[test]
    fn test_env_outranks_file() {
        let path = std::env::temp_dir().join(format!("veridoc-policy-{}.toml", std::process::id()));
        std::fs::write(&path, "[decision]\nmin_brightness = 20.0\nmax_pose_degrees = 15.0\n")
            .unwrap();

        std::env::set_var("VERIDOC_POLICY_PATH", &path);
        std::env::set_var("VERIDOC_MAX_POSE_DEGREES", "25");
        let config = ServiceConfig::from_env();
        std::env::remove_var("VERIDOC_MAX_POSE_DEGREES");
        std::env::remove_var("VERIDOC_POLICY_PATH");
        let _ = std::fs::remove_file(&path);

        // File beat the default, env beat the file.
        assert_eq!(config.policy.min_brightness, 20.0);
        assert_eq!(config.policy.max_pose_degrees, 25.0);
        assert_eq!(config.policy.min_selfie_similarity, 70.0);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        assert!(load_policy_file("/nonexistent/veridoc-policy.toml").is_none());
    }
}
