//! The verification gate sequence.
//!
//! A strict, ordered list of checks over a shared context: inputs, document
//! face count/confidence, quality, pose, face crop, selfie similarity, and
//! the optional reference-photo comparison. The first failing gate names
//! the rejection; gates after it are not evaluated. An infrastructure
//! fault in any external call aborts the whole sequence with a terminal
//! `error` status — never a rejection.

use crate::policy::Policy;
use crate::recognition::{FaceRecognition, RecognitionError, ReferenceStore};
use crate::types::{FaceBounds, FaceDetection, VerificationDecision, VerifyRequest};

/// Outcome of a single gate.
enum GateStatus {
    Pass,
    Fail(VerificationDecision),
}

/// State threaded through the gate sequence for one request.
struct GateContext<'a> {
    request: &'a VerifyRequest,
    /// The single document face, set by the detection gate.
    face: Option<FaceDetection>,
    /// JPEG crop of the document face region, set by the crop gate.
    face_crop: Option<Vec<u8>>,
    similarity_selfie: f32,
    similarity_reference: f32,
}

impl<'a> GateContext<'a> {
    fn new(request: &'a VerifyRequest) -> Self {
        Self {
            request,
            face: None,
            face_crop: None,
            similarity_selfie: 0.0,
            similarity_reference: 0.0,
        }
    }
}

type Gate<E, R> =
    fn(&DecisionPipeline<E, R>, &mut GateContext<'_>) -> Result<GateStatus, RecognitionError>;

/// The verification decision pipeline.
///
/// A pure function of its two input images plus the optional reference
/// lookup: no shared mutable state, so independent requests may run
/// concurrently on separate instances or behind a serializing handle.
pub struct DecisionPipeline<E, R> {
    engine: E,
    references: R,
    policy: Policy,
}

impl<E: FaceRecognition, R: ReferenceStore> DecisionPipeline<E, R> {
    pub fn new(engine: E, references: R, policy: Policy) -> Self {
        Self {
            engine,
            references,
            policy,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Run the full gate sequence and return the decision.
    ///
    /// Never panics and never returns an error: capability failures are
    /// logged with full detail and folded into `DecisionStatus::Error`.
    pub fn verify(&self, request: &VerifyRequest) -> VerificationDecision {
        match self.evaluate(request) {
            Ok(decision) => {
                tracing::info!(
                    status = ?decision.status,
                    reason = decision.reason.as_deref().unwrap_or(""),
                    similarity_selfie = decision.similarity_selfie,
                    similarity_reference = decision.similarity_reference,
                    "verification decision"
                );
                decision
            }
            Err(err) => {
                tracing::error!(error = %err, "verification aborted by capability failure");
                VerificationDecision::error()
            }
        }
    }

    fn evaluate(&self, request: &VerifyRequest) -> Result<VerificationDecision, RecognitionError> {
        let gates: [Gate<E, R>; 7] = [
            Self::gate_inputs,
            Self::gate_document_face,
            Self::gate_quality,
            Self::gate_pose,
            Self::gate_face_crop,
            Self::gate_selfie_similarity,
            Self::gate_reference,
        ];

        let mut ctx = GateContext::new(request);
        for gate in gates {
            if let GateStatus::Fail(decision) = gate(self, &mut ctx)? {
                return Ok(decision);
            }
        }

        Ok(VerificationDecision::approved(
            ctx.similarity_selfie,
            ctx.similarity_reference,
        ))
    }

    /// Both images must be present. No external calls are made before this
    /// gate passes.
    fn gate_inputs(&self, ctx: &mut GateContext<'_>) -> Result<GateStatus, RecognitionError> {
        let missing = match (
            ctx.request.document.is_empty(),
            ctx.request.selfie.is_empty(),
        ) {
            (false, false) => return Ok(GateStatus::Pass),
            (true, true) => "both",
            (true, false) => "document",
            (false, true) => "selfie",
        };
        Ok(GateStatus::Fail(
            VerificationDecision::rejected("missing required images")
                .with_diagnostic("missing", missing),
        ))
    }

    /// Exactly one face in the document image, at high confidence.
    fn gate_document_face(
        &self,
        ctx: &mut GateContext<'_>,
    ) -> Result<GateStatus, RecognitionError> {
        let mut faces = self.engine.detect_faces(&ctx.request.document)?;
        tracing::debug!(faces = faces.len(), "document face detection");

        let face = match (faces.len(), faces.pop()) {
            (1, Some(face)) => face,
            (0, _) => {
                return Ok(GateStatus::Fail(
                    VerificationDecision::rejected("no face detected in the document image")
                        .with_diagnostic("faces", "0")
                        .with_diagnostic(
                            "hint.framing",
                            "Place the entire document inside the frame with the photo visible",
                        )
                        .with_diagnostic("hint.lighting", "Avoid glare across the document photo"),
                ))
            }
            (n, _) => {
                return Ok(GateStatus::Fail(
                    VerificationDecision::rejected("multiple faces detected in the document image")
                        .with_diagnostic("faces", n.to_string())
                        .with_diagnostic(
                            "hint.framing",
                            "Photograph only the document, with no other person in view",
                        ),
                ))
            }
        };

        if face.confidence < self.policy.min_face_confidence {
            return Ok(GateStatus::Fail(
                VerificationDecision::rejected("document face confidence too low")
                    .with_diagnostic("confidence", format!("{:.1}", face.confidence))
                    .with_diagnostic(
                        "hint.retake",
                        "Retake the document photo with the camera held closer and steady",
                    ),
            ));
        }

        ctx.face = Some(face);
        Ok(GateStatus::Pass)
    }

    /// Brightness and sharpness of the document face must both clear their
    /// floors. Both metrics are reported on failure.
    fn gate_quality(&self, ctx: &mut GateContext<'_>) -> Result<GateStatus, RecognitionError> {
        let Some(face) = ctx.face.as_ref() else {
            return Ok(GateStatus::Pass);
        };

        let q = face.quality;
        if q.brightness < self.policy.min_brightness || q.sharpness < self.policy.min_sharpness {
            return Ok(GateStatus::Fail(
                VerificationDecision::rejected("document face image quality too low")
                    .with_diagnostic("brightness", format!("{:.1}", q.brightness))
                    .with_diagnostic("sharpness", format!("{:.1}", q.sharpness))
                    .with_diagnostic(
                        "hint.lighting",
                        "Retake the document photo in better lighting",
                    )
                    .with_diagnostic("hint.focus", "Hold the camera still until it focuses"),
            ));
        }
        Ok(GateStatus::Pass)
    }

    /// Roll, yaw, and pitch of the document face each within tolerance.
    /// All three angles are reported on failure.
    fn gate_pose(&self, ctx: &mut GateContext<'_>) -> Result<GateStatus, RecognitionError> {
        let Some(face) = ctx.face.as_ref() else {
            return Ok(GateStatus::Pass);
        };

        let pose = face.pose;
        if pose.max_abs_degrees() > self.policy.max_pose_degrees {
            return Ok(GateStatus::Fail(
                VerificationDecision::rejected("document face pose outside tolerance")
                    .with_diagnostic("roll", format!("{:.1}", pose.roll))
                    .with_diagnostic("yaw", format!("{:.1}", pose.yaw))
                    .with_diagnostic("pitch", format!("{:.1}", pose.pitch))
                    .with_diagnostic(
                        "hint.alignment",
                        "Lay the document flat and photograph it straight on",
                    ),
            ));
        }
        Ok(GateStatus::Pass)
    }

    /// Crop the document face region; the crop is the comparison source for
    /// both the selfie and the reference checks.
    fn gate_face_crop(&self, ctx: &mut GateContext<'_>) -> Result<GateStatus, RecognitionError> {
        let Some(face) = ctx.face.as_ref() else {
            return Ok(GateStatus::Pass);
        };
        ctx.face_crop = Some(crop_face(&ctx.request.document, &face.bounds)?);
        Ok(GateStatus::Pass)
    }

    /// The selfie must match the document face at or above the acceptance
    /// threshold (inclusive boundary).
    fn gate_selfie_similarity(
        &self,
        ctx: &mut GateContext<'_>,
    ) -> Result<GateStatus, RecognitionError> {
        let Some(crop) = ctx.face_crop.as_deref() else {
            return Ok(GateStatus::Pass);
        };

        let matches = self.engine.compare_faces(
            crop,
            &ctx.request.selfie,
            self.policy.compare_request_threshold,
        )?;

        let Some(best) = matches
            .iter()
            .map(|m| m.similarity)
            .max_by(|a, b| a.total_cmp(b))
        else {
            return Ok(GateStatus::Fail(
                VerificationDecision::rejected("selfie does not match the document face")
                    .with_diagnostic("hint.selfie", "Retake the selfie facing the camera directly"),
            ));
        };

        ctx.similarity_selfie = best;
        if best < self.policy.min_selfie_similarity {
            return Ok(GateStatus::Fail(
                VerificationDecision::rejected("selfie similarity below the acceptance threshold")
                    .with_selfie_similarity(best)
                    .with_diagnostic("similarity", format!("{best:.1}"))
                    .with_diagnostic(
                        "hint.selfie",
                        "Retake the selfie in even lighting, without glasses or a hat",
                    ),
            ));
        }
        Ok(GateStatus::Pass)
    }

    /// Optional reference-photo check. Infrastructure failure here degrades
    /// to "not evaluated" — it never blocks a user who otherwise passed.
    fn gate_reference(&self, ctx: &mut GateContext<'_>) -> Result<GateStatus, RecognitionError> {
        let Some(subject) = ctx.request.subject_id.as_deref() else {
            return Ok(GateStatus::Pass);
        };
        let Some(crop) = ctx.face_crop.as_deref() else {
            return Ok(GateStatus::Pass);
        };

        let similarity = match self.compare_reference(subject, crop) {
            Ok(similarity) => similarity,
            Err(err) => {
                tracing::warn!(
                    subject,
                    error = %err,
                    "reference comparison failed; continuing without it"
                );
                return Ok(GateStatus::Pass);
            }
        };

        match similarity {
            // No reference enrolled: the gate is not evaluated.
            None => Ok(GateStatus::Pass),
            Some(similarity) => {
                ctx.similarity_reference = similarity;
                if similarity < self.policy.min_reference_similarity {
                    Ok(GateStatus::Fail(
                        VerificationDecision::rejected(
                            "reference photo similarity below the acceptance threshold",
                        )
                        .with_selfie_similarity(ctx.similarity_selfie)
                        .with_reference_similarity(similarity)
                        .with_diagnostic("similarity_reference", format!("{similarity:.1}")),
                    ))
                } else {
                    Ok(GateStatus::Pass)
                }
            }
        }
    }

    /// Fetch and compare the enrolled reference. `Ok(None)` = no reference
    /// enrolled. An empty match list counts as an evaluated zero score: a
    /// reference that exists but shares no face with the document is a
    /// failed check, not a skipped one.
    fn compare_reference(
        &self,
        subject: &str,
        crop: &[u8],
    ) -> Result<Option<f32>, RecognitionError> {
        let Some(reference) = self.references.fetch(subject)? else {
            tracing::debug!(subject, "no reference photo enrolled");
            return Ok(None);
        };

        let matches = self.engine.compare_faces(
            crop,
            &reference,
            self.policy.compare_request_threshold,
        )?;
        let best = matches
            .iter()
            .map(|m| m.similarity)
            .max_by(|a, b| a.total_cmp(b))
            .unwrap_or(0.0);
        Ok(Some(best))
    }
}

/// Crop the fractional face bounds out of an encoded image and re-encode
/// the region as JPEG.
fn crop_face(document: &[u8], bounds: &FaceBounds) -> Result<Vec<u8>, RecognitionError> {
    let img = image::load_from_memory(document)?;
    let (x, y, w, h) = bounds.to_pixels(img.width(), img.height());
    let crop = img.crop_imm(x, y, w, h).to_rgb8();

    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(crop)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Jpeg)?;
    Ok(out)
}
