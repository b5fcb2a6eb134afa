//! Verifier thread and its async handle.
//!
//! The decision pipeline runs on one dedicated OS thread; callers talk to
//! it through a clone-safe handle over an mpsc channel with oneshot
//! replies. From the caller's side a verification is a single awaited
//! call, however many external requests it makes internally.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use veridoc_core::{
    DecisionPipeline, FaceRecognition, Policy, ReferenceStore, VerificationDecision, VerifyRequest,
};

/// Depth of the request queue between handles and the verifier thread.
const REQUEST_QUEUE_DEPTH: usize = 8;

#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("verifier thread exited")]
    ChannelClosed,
}

/// Messages sent from handles to the verifier thread.
enum VerifierRequest {
    Verify {
        request: VerifyRequest,
        reply: oneshot::Sender<VerificationDecision>,
    },
}

/// Clone-safe handle to the verifier thread.
#[derive(Clone)]
pub struct VerifierHandle {
    tx: mpsc::Sender<VerifierRequest>,
}

impl VerifierHandle {
    /// Run the full gate sequence on one request.
    ///
    /// Applies no timeout of its own; callers wrap the await if they need
    /// a bound on the external capabilities' latency.
    pub async fn verify(
        &self,
        request: VerifyRequest,
    ) -> Result<VerificationDecision, VerifierError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(VerifierRequest::Verify {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| VerifierError::ChannelClosed)?;
        reply_rx.await.map_err(|_| VerifierError::ChannelClosed)
    }
}

/// Spawn the verifier on a dedicated OS thread.
///
/// The thread owns the recognition engine, the reference store, and the
/// policy; requests are served in arrival order and the thread exits when
/// every handle is dropped.
pub fn spawn_verifier<E, R>(engine: E, references: R, policy: Policy) -> VerifierHandle
where
    E: FaceRecognition + Send + 'static,
    R: ReferenceStore + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<VerifierRequest>(REQUEST_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("veridoc-verifier".into())
        .spawn(move || {
            let pipeline = DecisionPipeline::new(engine, references, policy);
            tracing::info!("verifier thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    VerifierRequest::Verify { request, reply } => {
                        let request_id = Uuid::new_v4();
                        let span = tracing::info_span!("verify", %request_id);
                        let _guard = span.enter();
                        let decision = pipeline.verify(&request);
                        let _ = reply.send(decision);
                    }
                }
            }
            tracing::info!("verifier thread exiting");
        })
        .expect("failed to spawn verifier thread");

    VerifierHandle { tx }
}
