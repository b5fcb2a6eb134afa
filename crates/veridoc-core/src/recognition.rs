//! Black-box recognition capabilities consumed by the engine.
//!
//! The verification pipeline and the capture state machines never talk to a
//! concrete vendor; they consume these traits. Implementations (cloud API
//! clients, local inference backends) live with the deployment, not here.

use crate::types::{FaceDetection, FaceMatch};
use thiserror::Error;

/// Infrastructure fault in an external capability.
///
/// These are never policy rejections: a `RecognitionError` escaping the
/// gate sequence terminates the request with `DecisionStatus::Error`.
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("recognition engine failure: {0}")]
    Engine(String),
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("capability unavailable: {0}")]
    Unavailable(String),
}

/// Face detection and comparison capability.
///
/// `detect_faces` returns every face found in the image, with bounding box,
/// confidence, quality metrics, and pose. `compare_faces` compares the
/// source face against the target image; `threshold` is the engine-side
/// floor below which matches are omitted from the result. An empty result
/// is "no match", never an error.
pub trait FaceRecognition {
    fn detect_faces(&self, image: &[u8]) -> Result<Vec<FaceDetection>, RecognitionError>;

    fn compare_faces(
        &self,
        source: &[u8],
        target: &[u8],
        threshold: f32,
    ) -> Result<Vec<FaceMatch>, RecognitionError>;
}

/// Text recognition (OCR) capability.
///
/// Errors here are retryable from the caller's side: the document capture
/// loop logs a failed sample and tries again on the next tick.
pub trait TextRecognition {
    fn recognize_text(&self, image: &[u8], language: &str) -> Result<String, RecognitionError>;
}

/// Face-presence detection for the liveness countdown.
///
/// Constructing an implementation loads whatever model assets it needs;
/// dropping it releases them. The liveness session holds the model in an
/// `Option` and takes it out exactly once on teardown, so load and release
/// are paired on every exit path.
pub trait FacePresence {
    /// Whether at least one face is present in the RGB8 frame.
    fn detect_presence(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<bool, RecognitionError>;
}

/// Lookup of a previously enrolled reference photo by subject id.
///
/// `Ok(None)` means no reference is enrolled (the reference gate is simply
/// not evaluated); an `Err` is an infrastructure fault that the gate
/// degrades to "not evaluated" rather than propagating.
pub trait ReferenceStore {
    fn fetch(&self, subject_id: &str) -> Result<Option<Vec<u8>>, RecognitionError>;
}

/// A store with no references enrolled. Useful where the optional
/// reference check is not deployed.
pub struct NoReferences;

impl ReferenceStore for NoReferences {
    fn fetch(&self, _subject_id: &str) -> Result<Option<Vec<u8>>, RecognitionError> {
        Ok(None)
    }
}
