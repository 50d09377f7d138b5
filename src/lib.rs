//! Sentinel detection-event pipeline.
//!
//! This crate implements the core pipeline that turns raw person/face
//! detections into durable evidence packages and outbound alerts.
//!
//! # Architecture
//!
//! Frames flow from a [`FrameSource`] into a bounded [`FrameRing`]. A
//! [`Classifier`] produces detections for the most recent frame; the
//! [`CooldownGate`] decides whether a detection batch becomes a reportable
//! event. Admitted unauthorized events go through the [`EvidenceAssembler`]
//! (photo, clip, summary) before being enqueued on the event dispatcher,
//! which a single consumer drains on a fixed poll interval for logging and
//! notification. Remote sensors inject pre-classified events through the
//! ingress listener; they carry no evidence bundle because no local frames
//! exist for them.
//!
//! # Module Structure
//!
//! - `frame`: frames and the rolling pre-event ring buffer
//! - `classify`: classifier seam, detections, decision policies
//! - `gate`: cooldown/debounce state machine
//! - `evidence`: photo/clip/summary assembly
//! - `dispatch`: bounded cross-thread event queue
//! - `ingress`: inbound HTTP listener for remote detections
//! - `notify`: alert formatting and SMTP delivery seam
//! - `eventlog`: append-only JSONL detection log
//! - `capture`: frame source seam and the capture worker thread
//! - `retention`: age-based evidence cleanup

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub mod capture;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod eventlog;
pub mod evidence;
pub mod frame;
pub mod gate;
pub mod ingress;
pub mod notify;
pub mod retention;

pub use capture::{
    CaptureConfig, CaptureHandle, CaptureWorker, DetectionPipeline, FrameSource, SyntheticSource,
};
pub use classify::{
    decide_by_schedule, Classifier, Detection, IdentityRoster, Region, StubClassifier,
};
pub use config::SentineldConfig;
pub use dispatch::{EnqueueOutcome, EventConsumer, EventDispatcher, EventProducer};
pub use error::PipelineError;
pub use eventlog::EventLog;
pub use evidence::{ArtifactOutcome, EvidenceAssembler, EvidenceDirs, EvidenceReport, MjpegEncoder};
pub use frame::{Frame, FrameRing};
pub use gate::CooldownGate;
pub use ingress::{IngressConfig, IngressHandle, IngressServer, RemoteDetection};
pub use notify::{AlertMessage, DeliveryReport, EmailSettings, Mailer, Notifier, SmtpMailer};

// -------------------- Classification --------------------

/// Outcome of classifying a detected person.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Authorized,
    Unauthorized,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Authorized => write!(f, "authorized"),
            Classification::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

/// A classification decision derived from a detection by policy.
///
/// `subject` is the matched identity for authorized local detections and
/// `None` for unknown persons or identity-free sensor paths.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationDecision {
    pub classification: Classification,
    pub subject: Option<String>,
    pub confidence: f32,
}

impl ClassificationDecision {
    pub fn subject_name(&self) -> &str {
        self.subject.as_deref().unwrap_or("Unknown")
    }
}

// -------------------- Event Source --------------------

/// Where a detection event originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    LocalCamera,
    RemoteSensor,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSource::LocalCamera => write!(f, "local_camera"),
            EventSource::RemoteSensor => write!(f, "remote_sensor"),
        }
    }
}

// -------------------- Event Id --------------------

/// Event identifier: generation instant at second granularity plus a
/// process-local sequence. The sequence disambiguates events admitted within
/// the same second by one producer; the source tag disambiguates across
/// producers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventId {
    pub generated_at: DateTime<Local>,
    pub seq: u64,
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.generated_at.format("%Y%m%dT%H%M%S"),
            self.seq
        )
    }
}

/// Monotonic event id generator, owned by a single producer.
#[derive(Debug, Default)]
pub struct EventIdGen {
    next_seq: u64,
}

impl EventIdGen {
    pub fn new() -> Self {
        Self { next_seq: 0 }
    }

    pub fn next(&mut self) -> EventId {
        let id = EventId {
            generated_at: Local::now(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        id
    }
}

// -------------------- Evidence Bundle --------------------

/// Metadata recorded by the clip writer for the summary report.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub duration_secs: f64,
    pub frame_count: usize,
    pub byte_size: u64,
}

/// Paths of the evidence artifacts that were actually produced for an event.
///
/// Partial bundles are valid: each artifact is attempted independently, so a
/// failed clip write leaves the photo and summary paths intact.
#[derive(Clone, Debug, Default)]
pub struct EvidenceBundle {
    pub photo: Option<PathBuf>,
    pub video: Option<PathBuf>,
    pub summary: Option<PathBuf>,
    pub video_meta: Option<VideoMetadata>,
}

impl EvidenceBundle {
    pub fn is_empty(&self) -> bool {
        self.photo.is_none() && self.video.is_none() && self.summary.is_none()
    }

    /// Artifact paths in attachment order (photo, video, summary).
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.photo
            .iter()
            .chain(self.video.iter())
            .chain(self.summary.iter())
    }
}

// -------------------- Detection Event --------------------

/// The unit flowing through the event dispatcher.
///
/// Created at admission time by the cooldown gate (or on receipt from a
/// remote sensor), enqueued once, consumed exactly once, then discarded.
/// Never mutated after enqueue; the evidence bundle is attached before
/// enqueueing.
///
/// `occurred_at` is when the detection happened: the trigger frame's wall
/// time for local events, the sender-reported timestamp for remote events
/// (receipt time when the sender omits it).
#[derive(Clone, Debug)]
pub struct DetectionEvent {
    pub id: EventId,
    pub source: EventSource,
    pub occurred_at: DateTime<Local>,
    pub decision: ClassificationDecision,
    pub evidence: Option<EvidenceBundle>,
}

impl DetectionEvent {
    pub fn confidence(&self) -> f32 {
        self.decision.confidence
    }

    pub fn classification(&self) -> Classification {
        self.decision.classification
    }
}
