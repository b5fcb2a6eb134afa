//! Liveness capture state machine.
//!
//! Watches a front-facing feed frame by frame. When a face appears
//! (rising edge only) a countdown starts; if the face stays through the
//! countdown the frame is frozen, encoded, and the camera and the
//! presence model are released before the session reports success.

use crate::frame::{Facing, FeedProvider, FrameStatus, VideoFeed, VideoFrame};
use crate::CaptureError;
use std::time::{Duration, Instant};
use uuid::Uuid;
use veridoc_core::policy::CapturePolicy;
use veridoc_core::recognition::FacePresence;
use veridoc_core::types::CapturedImage;

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    Idle,
    /// Feed acquired, model loading.
    Acquiring,
    /// Watching frames for a face.
    Searching,
    /// Face present; counting down to capture.
    Centering { remaining: u32 },
    Captured,
}

/// What one frame callback did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Session is idle or already captured; no detection ran.
    Stopped,
    /// Frame not decodable yet; rescheduled without work.
    NotReady,
    /// Detection failed on this frame only; resumes next frame.
    DetectionError,
    /// No face present.
    Searching,
    /// Face present, countdown armed or still running.
    Centering,
    /// Countdown canceled because the face was lost.
    Canceled,
    /// Countdown reached zero; frame frozen, resources released.
    Captured,
}

pub struct LivenessCaptureSession<P: FeedProvider, M: FacePresence> {
    id: Uuid,
    policy: CapturePolicy,
    provider: P,
    feed: Option<P::Feed>,
    /// Loaded on start, taken out exactly once on release.
    model: Option<M>,
    state: LivenessState,
    face_present_last: bool,
    last_frame_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Next countdown decrement is due at this instant.
    next_tick_at: Option<Instant>,
    result: Option<CapturedImage>,
}

impl<P: FeedProvider, M: FacePresence> LivenessCaptureSession<P, M> {
    pub fn new(provider: P, policy: CapturePolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            policy,
            provider,
            feed: None,
            model: None,
            state: LivenessState::Idle,
            face_present_last: false,
            last_frame_at: None,
            next_tick_at: None,
            result: None,
        }
    }

    pub fn state(&self) -> LivenessState {
        self.state
    }

    /// When the session last analyzed a frame.
    pub fn last_frame_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.last_frame_at
    }

    /// Remaining countdown ticks, if the countdown is running.
    pub fn countdown(&self) -> Option<u32> {
        match self.state {
            LivenessState::Centering { remaining } => Some(remaining),
            _ => None,
        }
    }

    /// Acquire the front-facing feed, then load the presence model.
    ///
    /// Camera denial leaves the session `Idle`; the user must retry
    /// explicitly. The model is loaded exactly once per activation.
    pub fn start<L>(&mut self, load_model: L) -> Result<(), CaptureError>
    where
        L: FnOnce() -> Result<M, veridoc_core::RecognitionError>,
    {
        if self.state != LivenessState::Idle {
            return Err(CaptureError::AlreadyActive);
        }

        let feed = match self.provider.open(Facing::Front) {
            Ok(feed) => feed,
            Err(err) => {
                tracing::warn!(session = %self.id, error = %err, "selfie feed acquisition failed");
                return Err(CaptureError::Camera(err));
            }
        };
        self.feed = Some(feed);
        self.state = LivenessState::Acquiring;

        match load_model() {
            Ok(model) => {
                self.model = Some(model);
                self.state = LivenessState::Searching;
                tracing::debug!(session = %self.id, "presence model loaded; searching");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(session = %self.id, error = %err, "presence model load failed");
                self.teardown();
                Err(CaptureError::Model(err))
            }
        }
    }

    /// Per-frame callback. `now` drives the countdown clock.
    pub fn on_frame(&mut self, now: Instant) -> FrameOutcome {
        match self.state {
            LivenessState::Idle | LivenessState::Acquiring | LivenessState::Captured => {
                return FrameOutcome::Stopped
            }
            LivenessState::Searching | LivenessState::Centering { .. } => {}
        }

        let (Some(feed), Some(model)) = (self.feed.as_mut(), self.model.as_mut()) else {
            return FrameOutcome::Stopped;
        };

        let frame = match feed.poll_frame() {
            Ok(FrameStatus::Ready(frame)) => frame,
            Ok(FrameStatus::NotReady) => return FrameOutcome::NotReady,
            Err(err) => {
                tracing::debug!(session = %self.id, error = %err, "frame poll failed; resuming");
                return FrameOutcome::NotReady;
            }
        };

        self.last_frame_at = Some(chrono::Utc::now());
        let present = match model.detect_presence(&frame.rgb, frame.width, frame.height) {
            Ok(present) => present,
            Err(err) => {
                tracing::debug!(session = %self.id, error = %err, "presence detection failed; resuming");
                return FrameOutcome::DetectionError;
            }
        };

        let was_present = self.face_present_last;
        self.face_present_last = present;

        match self.state {
            LivenessState::Searching => {
                // Rising edge only: a face that stays visible must not
                // re-arm the countdown every frame.
                if present && !was_present {
                    self.state = LivenessState::Centering {
                        remaining: self.policy.countdown_ticks,
                    };
                    self.next_tick_at = Some(now + COUNTDOWN_TICK);
                    tracing::debug!(session = %self.id, ticks = self.policy.countdown_ticks, "face found; countdown armed");
                    FrameOutcome::Centering
                } else {
                    FrameOutcome::Searching
                }
            }
            LivenessState::Centering { remaining } => {
                if !present {
                    self.state = LivenessState::Searching;
                    self.next_tick_at = None;
                    tracing::debug!(session = %self.id, "face lost; countdown canceled");
                    return FrameOutcome::Canceled;
                }

                if remaining == 0 {
                    return self.capture(&frame);
                }

                let due = self
                    .next_tick_at
                    .map(|at| now >= at)
                    .unwrap_or(false);
                if due {
                    let remaining = remaining - 1;
                    self.next_tick_at = Some(now + COUNTDOWN_TICK);
                    if remaining == 0 {
                        return self.capture(&frame);
                    }
                    self.state = LivenessState::Centering { remaining };
                }
                FrameOutcome::Centering
            }
            _ => FrameOutcome::Stopped,
        }
    }

    /// Freeze the frame and release camera and model before reporting
    /// success, so an immediate caller teardown never races a live handle.
    fn capture(&mut self, frame: &VideoFrame) -> FrameOutcome {
        let jpeg = match frame.encode_jpeg() {
            Ok(bytes) => bytes,
            Err(err) => {
                // Stay armed at zero; the next ready frame retries.
                tracing::warn!(session = %self.id, error = %err, "capture encode failed; retrying");
                self.state = LivenessState::Centering { remaining: 0 };
                return FrameOutcome::Centering;
            }
        };

        self.result = Some(CapturedImage::jpeg(jpeg));
        self.stop_feed();
        self.release_model();
        self.state = LivenessState::Captured;
        self.next_tick_at = None;
        tracing::info!(session = %self.id, "liveness frame captured");
        FrameOutcome::Captured
    }

    /// The captured selfie, moved out. `None` until capture completes.
    pub fn take_capture(&mut self) -> Option<CapturedImage> {
        self.result.take()
    }

    /// Release feed and model and return to `Idle`. Safe on every exit
    /// path and safe to call repeatedly — the model can only be dropped
    /// once.
    pub fn teardown(&mut self) {
        self.stop_feed();
        self.release_model();
        self.next_tick_at = None;
        self.face_present_last = false;
        self.state = LivenessState::Idle;
    }

    fn stop_feed(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.stop();
        }
    }

    fn release_model(&mut self) {
        if self.model.take().is_some() {
            tracing::debug!(session = %self.id, "presence model released");
        }
    }
}

/// Drive a session to capture, polling frames at display cadence.
pub async fn run_liveness_capture<P, M, L>(
    session: &mut LivenessCaptureSession<P, M>,
    load_model: L,
) -> Result<CapturedImage, CaptureError>
where
    P: FeedProvider,
    M: FacePresence,
    L: FnOnce() -> Result<M, veridoc_core::RecognitionError>,
{
    session.start(load_model)?;

    // ~30 fps frame callbacks.
    let mut frames = tokio::time::interval(Duration::from_millis(33));
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        frames.tick().await;
        // Runtime clock, so paced tests and production agree on "now".
        if session.on_frame(tokio::time::Instant::now().into_std()) == FrameOutcome::Captured {
            return session
                .take_capture()
                .ok_or(CaptureError::NothingCaptured);
        }
    }
}
