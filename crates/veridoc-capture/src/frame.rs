//! Video frame model and the feed abstraction both capture sessions poll.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("invalid RGB length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("encode failed: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("camera access denied")]
    AccessDenied,
    #[error("camera not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

/// Which camera the feed should face. A hint, not a guarantee — feeds on
/// single-camera hardware serve whatever they have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// User-facing camera, for selfies.
    Front,
    /// World-facing camera, for documents.
    Rear,
}

/// A decoded video frame: packed RGB8, row-major.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl VideoFrame {
    /// Mean luminance (0.0–255.0), Rec. 601 weights.
    pub fn mean_brightness(&self) -> f32 {
        if self.rgb.is_empty() {
            return 0.0;
        }
        let mut sum = 0.0f64;
        for px in self.rgb.chunks_exact(3) {
            sum += 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64;
        }
        (sum / (self.rgb.len() / 3) as f64) as f32
    }

    /// Encode the frame as JPEG.
    pub fn encode_jpeg(&self) -> Result<Vec<u8>, FrameError> {
        let expected = (self.width * self.height * 3) as usize;
        let buf = image::RgbImage::from_raw(self.width, self.height, self.rgb.clone()).ok_or(
            FrameError::InvalidLength {
                expected,
                actual: self.rgb.len(),
            },
        )?;

        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(buf)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Jpeg)?;
        Ok(out)
    }
}

/// State of a feed at one poll.
#[derive(Debug)]
pub enum FrameStatus {
    /// The stream is live but the current frame is not decodable yet.
    NotReady,
    Ready(VideoFrame),
}

/// A live video stream a capture session samples from.
///
/// `stop` must be idempotent; implementations should also release the
/// underlying device in `Drop` so a session dropped mid-capture never
/// leaks a live camera handle.
pub trait VideoFeed {
    fn poll_frame(&mut self) -> Result<FrameStatus, FeedError>;
    fn stop(&mut self);
}

/// Opens video feeds on demand. Sessions re-open through this on retake.
pub trait FeedProvider {
    type Feed: VideoFeed;
    fn open(&mut self, facing: Facing) -> Result<Self::Feed, FeedError>;
}

impl<F, Feed> FeedProvider for F
where
    F: FnMut(Facing) -> Result<Feed, FeedError>,
    Feed: VideoFeed,
{
    type Feed = Feed;

    fn open(&mut self, facing: Facing) -> Result<Feed, FeedError> {
        self(facing)
    }
}
