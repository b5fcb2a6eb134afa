use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bounding box of a face in an image, in fractional coordinates.
///
/// All fields are relative to the image dimensions, in [0, 1]:
/// `left`/`top` locate the upper-left corner, `width`/`height` the extent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaceBounds {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBounds {
    /// Convert to pixel coordinates `(x, y, w, h)` for an image of the
    /// given dimensions, clamped so the box never leaves the image.
    pub fn to_pixels(&self, img_width: u32, img_height: u32) -> (u32, u32, u32, u32) {
        let x = ((self.left.clamp(0.0, 1.0) * img_width as f32).floor() as u32)
            .min(img_width.saturating_sub(1));
        let y = ((self.top.clamp(0.0, 1.0) * img_height as f32).floor() as u32)
            .min(img_height.saturating_sub(1));
        let w = (self.width.clamp(0.0, 1.0) * img_width as f32).floor() as u32;
        let h = (self.height.clamp(0.0, 1.0) * img_height as f32).floor() as u32;
        let w = w.min(img_width.saturating_sub(x)).max(1);
        let h = h.min(img_height.saturating_sub(y)).max(1);
        (x, y, w, h)
    }
}

/// Capture-quality metrics for a detected face, each 0–100.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaceQuality {
    pub brightness: f32,
    pub sharpness: f32,
}

/// Head orientation of a detected face, in degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FacePose {
    pub roll: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl FacePose {
    /// Largest absolute angle across roll, yaw, and pitch.
    pub fn max_abs_degrees(&self) -> f32 {
        self.roll.abs().max(self.yaw.abs()).max(self.pitch.abs())
    }
}

/// One face reported by the external detection capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bounds: FaceBounds,
    /// Detection confidence, 0–100.
    pub confidence: f32,
    pub quality: FaceQuality,
    pub pose: FacePose,
}

/// One match reported by the external comparison capability.
///
/// An empty match list means "no match", never an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaceMatch {
    /// Similarity of the two faces, 0–100.
    pub similarity: f32,
}

/// Terminal status of a verification request.
///
/// `Error` is an infrastructure fault, distinct from `Rejected` (a policy
/// outcome on valid input); the two must never be conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    Approved,
    Rejected,
    Error,
}

/// The sole output of the decision pipeline. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationDecision {
    pub status: DecisionStatus,
    /// Human-readable explanation; `None` only for approvals.
    pub reason: Option<String>,
    /// Observed selfie/document similarity, 0–100.
    pub similarity_selfie: f32,
    /// Reference-photo similarity; 0.0 means "not evaluated".
    pub similarity_reference: f32,
    /// Named metric readouts and retake recommendations. Advisory only —
    /// never used for decisioning.
    pub diagnostics: BTreeMap<String, String>,
}

impl VerificationDecision {
    pub fn approved(similarity_selfie: f32, similarity_reference: f32) -> Self {
        Self {
            status: DecisionStatus::Approved,
            reason: None,
            similarity_selfie,
            similarity_reference,
            diagnostics: BTreeMap::new(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: DecisionStatus::Rejected,
            reason: Some(reason.into()),
            similarity_selfie: 0.0,
            similarity_reference: 0.0,
            diagnostics: BTreeMap::new(),
        }
    }

    /// Infrastructure-fault decision. Carries a generic message; the full
    /// failure detail is logged, not returned to the caller.
    pub fn error() -> Self {
        Self {
            status: DecisionStatus::Error,
            reason: Some("verification could not be completed".to_string()),
            similarity_selfie: 0.0,
            similarity_reference: 0.0,
            diagnostics: BTreeMap::new(),
        }
    }

    pub fn with_diagnostic(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.diagnostics.insert(key.into(), value.into());
        self
    }

    pub fn with_selfie_similarity(mut self, similarity: f32) -> Self {
        self.similarity_selfie = similarity;
        self
    }

    pub fn with_reference_similarity(mut self, similarity: f32) -> Self {
        self.similarity_reference = similarity;
        self
    }
}

/// Input to the decision pipeline: two encoded images plus an optional
/// subject id for the reference-photo check.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub document: Vec<u8>,
    pub selfie: Vec<u8>,
    pub subject_id: Option<String>,
}

/// Encoding of a captured image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    Jpeg,
}

/// An image frozen out of a live capture session.
///
/// Owned by the session that produced it until handed off by `submit`;
/// the hand-off is a move, so the session cannot reuse or mutate it.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    pub encoding: ImageEncoding,
    pub captured_at: DateTime<Utc>,
}

impl CapturedImage {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            encoding: ImageEncoding::Jpeg,
            captured_at: Utc::now(),
        }
    }
}
