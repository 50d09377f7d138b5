use thiserror::Error;

/// Failure taxonomy for the detection pipeline.
///
/// Everything inside the pipeline degrades to "produce less evidence" rather
/// than failing the whole event; callers match on the variant to decide how
/// to recover. Only resource exhaustion (e.g., the ring buffer cannot be
/// allocated) is treated as fatal to a pipeline instance, and that surfaces
/// as a plain panic-free `anyhow` error at construction time.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The frame or classification source cannot be read. The capture worker
    /// logs and retries with backoff; it never crashes the pipeline.
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),

    /// An individual evidence artifact failed to write. Recorded per
    /// artifact; does not abort the other artifacts or event delivery.
    #[error("evidence write failed: {0}")]
    EvidenceWrite(String),

    /// A notification could not be delivered. The event itself is still
    /// considered handled (already logged and evidenced).
    #[error("notification delivery failed: {0}")]
    Delivery(String),

    /// A required setting is missing or invalid (e.g., no recipient).
    /// Surfaced distinctly from delivery failures; no retry implied.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An invalid remote payload. Rejected at the boundary; never enters the
    /// pipeline.
    #[error("malformed ingress payload: {0}")]
    MalformedIngress(String),
}

impl PipelineError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }
}
