//! veridoc-core — Identity document verification engine.
//!
//! The gated decision pipeline (document face, quality, pose, similarity,
//! optional reference photo) plus the data model and the capability traits
//! for the external recognition engines it consumes.

pub mod gates;
pub mod policy;
pub mod recognition;
pub mod types;

pub use gates::DecisionPipeline;
pub use policy::{CapturePolicy, Policy};
pub use recognition::{
    FacePresence, FaceRecognition, NoReferences, RecognitionError, ReferenceStore, TextRecognition,
};
pub use types::{
    CapturedImage, DecisionStatus, FaceBounds, FaceDetection, FaceMatch, FacePose, FaceQuality,
    ImageEncoding, VerificationDecision, VerifyRequest,
};
