//! Document capture state machine.
//!
//! Samples a live feed on a fixed interval, runs text recognition on each
//! sample, and freezes the frame as soon as a document keyword appears in
//! the recognized text. One captured image per activation: once a result
//! is stored, ticks do nothing until an explicit retake.

use crate::frame::{Facing, FeedProvider, FrameStatus, VideoFeed, VideoFrame};
use crate::CaptureError;
use uuid::Uuid;
use veridoc_core::policy::CapturePolicy;
use veridoc_core::recognition::TextRecognition;
use veridoc_core::types::CapturedImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Idle,
    Sampling,
    Captured,
}

/// What one sampling tick did. Ticks never fail the session: sample-level
/// problems are logged and retried on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session is not sampling (idle or already captured).
    NotSampling,
    /// Guard held: a sample was in flight or a result already exists.
    Skipped,
    /// Feed had no decodable frame; dropped, not queued.
    NotReady,
    /// Sample analyzed, no keyword found.
    NoMatch,
    /// Encoding or recognition failed for this sample only.
    Failed,
    /// Keyword recognized; the frame is now the session result.
    Captured,
}

pub struct DocumentCaptureSession<P: FeedProvider, T: TextRecognition> {
    id: Uuid,
    policy: CapturePolicy,
    provider: P,
    text: T,
    feed: Option<P::Feed>,
    state: DocumentState,
    sample_in_flight: bool,
    last_sample_at: Option<chrono::DateTime<chrono::Utc>>,
    result: Option<CapturedImage>,
}

impl<P: FeedProvider, T: TextRecognition> DocumentCaptureSession<P, T> {
    pub fn new(provider: P, text: T, policy: CapturePolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            policy,
            provider,
            text,
            feed: None,
            state: DocumentState::Idle,
            sample_in_flight: false,
            last_sample_at: None,
            result: None,
        }
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn policy(&self) -> &CapturePolicy {
        &self.policy
    }

    /// When the session last analyzed a sample.
    pub fn last_sample_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.last_sample_at
    }

    /// Acquire the rear-facing feed and begin sampling.
    ///
    /// Acquisition failure leaves the session `Idle`; there is no
    /// auto-retry within a session — the caller must start again.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.state != DocumentState::Idle {
            return Err(CaptureError::AlreadyActive);
        }
        self.acquire()
    }

    fn acquire(&mut self) -> Result<(), CaptureError> {
        match self.provider.open(Facing::Rear) {
            Ok(feed) => {
                self.feed = Some(feed);
                self.state = DocumentState::Sampling;
                tracing::debug!(session = %self.id, "document feed acquired");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(session = %self.id, error = %err, "document feed acquisition failed");
                self.state = DocumentState::Idle;
                Err(CaptureError::Camera(err))
            }
        }
    }

    /// One sampling tick. No-op unless the session is sampling, no sample
    /// is in flight, no result exists, and the feed has a ready frame.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != DocumentState::Sampling {
            return TickOutcome::NotSampling;
        }
        if self.sample_in_flight || self.result.is_some() {
            return TickOutcome::Skipped;
        }
        let Some(feed) = self.feed.as_mut() else {
            return TickOutcome::NotSampling;
        };

        let frame = match feed.poll_frame() {
            Ok(FrameStatus::Ready(frame)) => frame,
            Ok(FrameStatus::NotReady) => return TickOutcome::NotReady,
            Err(err) => {
                tracing::warn!(session = %self.id, error = %err, "frame poll failed; will retry");
                return TickOutcome::NotReady;
            }
        };

        self.sample_in_flight = true;
        self.last_sample_at = Some(chrono::Utc::now());
        let outcome = self.analyze(frame);
        self.sample_in_flight = false;
        outcome
    }

    fn analyze(&mut self, frame: VideoFrame) -> TickOutcome {
        let jpeg = match frame.encode_jpeg() {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(session = %self.id, error = %err, "frame encode failed; sample dropped");
                return TickOutcome::Failed;
            }
        };

        let text = match self.text.recognize_text(&jpeg, &self.policy.ocr_language) {
            Ok(text) => text.to_uppercase(),
            Err(err) => {
                tracing::warn!(session = %self.id, error = %err, "text recognition failed; sample dropped");
                return TickOutcome::Failed;
            }
        };

        // First configured keyword found in the sample wins.
        let Some(keyword) = self
            .policy
            .keywords
            .iter()
            .find(|k| text.contains(k.as_str()))
        else {
            return TickOutcome::NoMatch;
        };

        tracing::info!(session = %self.id, keyword = %keyword, "document keyword recognized; capturing");
        self.result = Some(CapturedImage::jpeg(jpeg));
        self.state = DocumentState::Captured;
        self.stop_feed();
        TickOutcome::Captured
    }

    /// Discard the captured frame and resume sampling on a fresh feed.
    pub fn retake(&mut self) -> Result<(), CaptureError> {
        if self.state != DocumentState::Captured {
            return Err(CaptureError::NothingCaptured);
        }
        tracing::debug!(session = %self.id, "retake requested");
        self.result = None;
        self.state = DocumentState::Idle;
        self.acquire()
    }

    /// Hand the captured frame to the caller. Valid only after capture;
    /// the image moves out, so the session cannot reuse it.
    pub fn submit(&mut self) -> Result<CapturedImage, CaptureError> {
        if self.state != DocumentState::Captured {
            return Err(CaptureError::NothingCaptured);
        }
        self.result.take().ok_or(CaptureError::NothingCaptured)
    }

    /// Release the feed and return to `Idle`. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        self.stop_feed();
        self.result = None;
        self.state = DocumentState::Idle;
    }

    fn stop_feed(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.stop();
        }
    }
}

/// Drive a session until a frame is captured.
///
/// Ticks on the configured sampling interval; missed ticks are skipped,
/// never queued. Returns once the session reaches `Captured`, leaving
/// retake/submit to the caller.
pub async fn run_document_capture<P: FeedProvider, T: TextRecognition>(
    session: &mut DocumentCaptureSession<P, T>,
) -> Result<(), CaptureError> {
    if session.state() == DocumentState::Idle {
        session.start()?;
    }

    let mut ticks = tokio::time::interval(session.policy().sample_interval());
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticks.tick().await;
        if session.tick() == TickOutcome::Captured {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FeedError, VideoFeed};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;
    use veridoc_core::recognition::RecognitionError;

    struct FakeFeed {
        frames: VecDeque<FrameStatus>,
        stops: Rc<Cell<usize>>,
    }

    impl VideoFeed for FakeFeed {
        fn poll_frame(&mut self) -> Result<FrameStatus, FeedError> {
            Ok(self
                .frames
                .pop_front()
                .unwrap_or(FrameStatus::Ready(test_frame())))
        }

        fn stop(&mut self) {
            self.stops.set(self.stops.get() + 1);
        }
    }

    struct FakeOcr {
        responses: RefCell<VecDeque<Result<String, RecognitionError>>>,
        calls: Cell<usize>,
    }

    impl FakeOcr {
        fn scripted(responses: Vec<Result<String, RecognitionError>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                calls: Cell::new(0),
            }
        }
    }

    impl TextRecognition for FakeOcr {
        fn recognize_text(&self, _image: &[u8], _language: &str) -> Result<String, RecognitionError> {
            self.calls.set(self.calls.get() + 1);
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or(Ok(String::new()))
        }
    }

    fn test_frame() -> VideoFrame {
        VideoFrame {
            rgb: vec![127; 4 * 4 * 3],
            width: 4,
            height: 4,
        }
    }

    struct Harness {
        stops: Rc<Cell<usize>>,
        opens: Rc<Cell<usize>>,
        facings: Rc<RefCell<Vec<Facing>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                stops: Rc::new(Cell::new(0)),
                opens: Rc::new(Cell::new(0)),
                facings: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn provider(
            &self,
            mut frames_per_open: Vec<Vec<FrameStatus>>,
        ) -> impl FnMut(Facing) -> Result<FakeFeed, FeedError> {
            let stops = Rc::clone(&self.stops);
            let opens = Rc::clone(&self.opens);
            let facings = Rc::clone(&self.facings);
            frames_per_open.reverse();
            move |facing| {
                opens.set(opens.get() + 1);
                facings.borrow_mut().push(facing);
                Ok(FakeFeed {
                    frames: frames_per_open.pop().unwrap_or_default().into(),
                    stops: Rc::clone(&stops),
                })
            }
        }
    }

    fn session_with(
        harness: &Harness,
        frames: Vec<Vec<FrameStatus>>,
        ocr: FakeOcr,
    ) -> DocumentCaptureSession<impl FeedProvider<Feed = FakeFeed>, FakeOcr> {
        DocumentCaptureSession::new(harness.provider(frames), ocr, CapturePolicy::default())
    }

    #[test]
    fn test_acquisition_failure_stays_idle() {
        let mut session = DocumentCaptureSession::new(
            |_facing| Err::<FakeFeed, _>(FeedError::AccessDenied),
            FakeOcr::scripted(vec![]),
            CapturePolicy::default(),
        );
        assert!(matches!(session.start(), Err(CaptureError::Camera(_))));
        assert_eq!(session.state(), DocumentState::Idle);
        // No auto-retry: ticks do nothing from Idle.
        assert_eq!(session.tick(), TickOutcome::NotSampling);
    }

    #[test]
    fn test_opens_rear_facing() {
        let h = Harness::new();
        let mut session = session_with(&h, vec![vec![]], FakeOcr::scripted(vec![]));
        session.start().unwrap();
        assert_eq!(*h.facings.borrow(), vec![Facing::Rear]);
    }

    #[test]
    fn test_not_ready_frame_skips_recognition() {
        let h = Harness::new();
        let mut session = session_with(
            &h,
            vec![vec![FrameStatus::NotReady]],
            FakeOcr::scripted(vec![]),
        );
        session.start().unwrap();
        assert_eq!(session.tick(), TickOutcome::NotReady);
        assert_eq!(session.text.calls.get(), 0);
    }

    #[test]
    fn test_recognition_error_retries_next_tick() {
        let h = Harness::new();
        let mut session = session_with(
            &h,
            vec![vec![]],
            FakeOcr::scripted(vec![
                Err(RecognitionError::Engine("ocr down".into())),
                Ok("REPUBLICA DOMINICANA".into()),
            ]),
        );
        session.start().unwrap();
        assert_eq!(session.tick(), TickOutcome::Failed);
        assert_eq!(session.tick(), TickOutcome::Captured);
        assert_eq!(session.text.calls.get(), 2);
    }

    #[test]
    fn test_keyword_capture_stops_feed_and_sampling() {
        let h = Harness::new();
        let mut session = session_with(
            &h,
            vec![vec![]],
            FakeOcr::scripted(vec![Ok("no id here".into()), Ok("cedula de identidad".into())]),
        );
        session.start().unwrap();
        assert_eq!(session.tick(), TickOutcome::NoMatch);
        assert_eq!(session.tick(), TickOutcome::Captured);
        assert_eq!(session.state(), DocumentState::Captured);
        assert_eq!(h.stops.get(), 1);

        // No further samples after capture without a retake.
        assert_eq!(session.tick(), TickOutcome::NotSampling);
        assert_eq!(session.text.calls.get(), 2);
    }

    #[test]
    fn test_recognized_text_is_case_insensitive() {
        let h = Harness::new();
        let mut session = session_with(
            &h,
            vec![vec![]],
            FakeOcr::scripted(vec![Ok("républica... identidad".into())]),
        );
        session.start().unwrap();
        assert_eq!(session.tick(), TickOutcome::Captured);
    }

    #[test]
    fn test_retake_reacquires_and_captures_again() {
        let h = Harness::new();
        let mut session = session_with(
            &h,
            vec![vec![], vec![]],
            FakeOcr::scripted(vec![
                Ok("CEDULA".into()),
                Ok("REPUBLICA DOMINICANA".into()),
            ]),
        );
        session.start().unwrap();
        assert_eq!(session.tick(), TickOutcome::Captured);

        session.retake().unwrap();
        assert_eq!(session.state(), DocumentState::Sampling);
        assert_eq!(h.opens.get(), 2);

        assert_eq!(session.tick(), TickOutcome::Captured);
        assert!(session.submit().is_ok());
    }

    #[test]
    fn test_submit_moves_image_out_once() {
        let h = Harness::new();
        let mut session = session_with(&h, vec![vec![]], FakeOcr::scripted(vec![Ok("CEDULA".into())]));
        session.start().unwrap();
        assert_eq!(session.tick(), TickOutcome::Captured);

        let img = session.submit().unwrap();
        assert!(!img.bytes.is_empty());
        assert!(matches!(session.submit(), Err(CaptureError::NothingCaptured)));
    }

    #[test]
    fn test_submit_before_capture_errors() {
        let h = Harness::new();
        let mut session = session_with(&h, vec![vec![]], FakeOcr::scripted(vec![]));
        session.start().unwrap();
        assert!(matches!(session.submit(), Err(CaptureError::NothingCaptured)));
    }

    #[test]
    fn test_start_twice_errors() {
        let h = Harness::new();
        let mut session = session_with(&h, vec![vec![]], FakeOcr::scripted(vec![]));
        session.start().unwrap();
        assert!(matches!(session.start(), Err(CaptureError::AlreadyActive)));
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let h = Harness::new();
        let mut session = session_with(&h, vec![vec![]], FakeOcr::scripted(vec![]));
        session.start().unwrap();
        session.teardown();
        session.teardown();
        assert_eq!(h.stops.get(), 1);
        assert_eq!(session.state(), DocumentState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_runs_until_capture() {
        let h = Harness::new();
        let mut session = session_with(
            &h,
            vec![vec![]],
            FakeOcr::scripted(vec![
                Ok("nothing".into()),
                Ok("still nothing".into()),
                Ok("REPUBLICA".into()),
            ]),
        );
        run_document_capture(&mut session).await.unwrap();
        assert_eq!(session.state(), DocumentState::Captured);
        assert_eq!(session.text.calls.get(), 3);
    }
}
