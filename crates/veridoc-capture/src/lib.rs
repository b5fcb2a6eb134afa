//! veridoc-capture — Client-side capture state machines.
//!
//! Two cooperative, single-owner state machines over an abstract video
//! feed: document capture (OCR keyword gate on a sampling interval) and
//! liveness capture (face-presence countdown, per-frame). Neither touches
//! a concrete camera or recognition backend; those arrive as trait
//! implementations.

use thiserror::Error;

pub mod document;
pub mod frame;
pub mod liveness;

pub use document::{run_document_capture, DocumentCaptureSession, DocumentState, TickOutcome};
pub use frame::{Facing, FeedError, FeedProvider, FrameError, FrameStatus, VideoFeed, VideoFrame};
pub use liveness::{run_liveness_capture, FrameOutcome, LivenessCaptureSession, LivenessState};

/// Session-level capture failure. Sample-level problems (a failed OCR
/// pass, an unreadable frame) are not errors — sessions log and retry
/// those on the next tick.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera acquisition failed: {0}")]
    Camera(#[from] frame::FeedError),
    #[error("presence model load failed: {0}")]
    Model(#[from] veridoc_core::RecognitionError),
    #[error("no captured image available")]
    NothingCaptured,
    #[error("capture session already active")]
    AlreadyActive,
}
