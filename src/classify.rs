//! Classifier seam, detections, and decision policies.
//!
//! Model inference is an external collaborator: the pipeline consumes an
//! opaque [`Classifier`] that returns labeled regions with confidence.
//! Turning a detection into an authorized/unauthorized decision is policy:
//! either an identity-roster match (local camera path) or a time-of-day +
//! confidence heuristic (identity-free sensor path).

use crate::frame::Frame;
use crate::{Classification, ClassificationDecision};

/// Bounding region of a detection, in pixel coordinates of the source frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One raw classifier output for one frame. Ephemeral; consumed immediately
/// by the cooldown gate.
#[derive(Clone, Debug)]
pub struct Detection {
    pub region: Region,
    pub confidence: f32,
    pub label: String,
}

/// Opaque classifier returning zero or more detections for a frame.
///
/// Implementations receive the frame by reference and must not retain it.
/// Confidence below the caller's configured threshold is treated as absent
/// by the pipeline, so implementations need not filter.
pub trait Classifier: Send {
    fn classify(&mut self, frame: &Frame) -> Vec<Detection>;
}

/// Deterministic stub classifier for tests and `stub://` deployments.
///
/// Reports a centered detection on every Nth frame with a fixed label and
/// confidence; all other frames are empty.
pub struct StubClassifier {
    every_nth: u64,
    label: String,
    confidence: f32,
    frame_count: u64,
}

impl StubClassifier {
    pub fn new(every_nth: u64, label: &str, confidence: f32) -> Self {
        Self {
            every_nth: every_nth.max(1),
            label: label.to_string(),
            confidence,
            frame_count: 0,
        }
    }
}

impl Classifier for StubClassifier {
    fn classify(&mut self, frame: &Frame) -> Vec<Detection> {
        self.frame_count += 1;
        if self.frame_count % self.every_nth != 0 {
            return Vec::new();
        }
        let w = frame.width() / 2;
        let h = frame.height() / 2;
        vec![Detection {
            region: Region {
                x: frame.width() / 4,
                y: frame.height() / 4,
                width: w.max(1),
                height: h.max(1),
            },
            confidence: self.confidence,
            label: self.label.clone(),
        }]
    }
}

// -------------------- Decision policies --------------------

/// Roster of known authorized subject names for the local camera path.
///
/// A detection whose label matches a roster entry (case-insensitive) is
/// authorized under that subject; anything else is unauthorized with an
/// unknown subject.
#[derive(Clone, Debug, Default)]
pub struct IdentityRoster {
    names: Vec<String>,
}

impl IdentityRoster {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn decide(&self, detection: &Detection) -> ClassificationDecision {
        let matched = self
            .names
            .iter()
            .find(|name| name.eq_ignore_ascii_case(&detection.label));
        match matched {
            Some(name) => ClassificationDecision {
                classification: Classification::Authorized,
                subject: Some(name.clone()),
                confidence: detection.confidence,
            },
            None => ClassificationDecision {
                classification: Classification::Unauthorized,
                subject: None,
                confidence: detection.confidence,
            },
        }
    }
}

/// Time-of-day + confidence heuristic for the identity-free sensor path:
/// a high-confidence detection during business hours (08:00-18:59 local)
/// is treated as authorized, everything else as unauthorized.
///
/// The daemon itself never calls this: remote payloads arrive already
/// classified. It is exported for edge-device senders built on this crate,
/// so both ends of the wire share one policy.
pub fn decide_by_schedule(confidence: f32, local_hour: u32) -> ClassificationDecision {
    let classification = if (8..=18).contains(&local_hour) && confidence > 0.8 {
        Classification::Authorized
    } else {
        Classification::Unauthorized
    };
    ClassificationDecision {
        classification,
        subject: None,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn frame() -> Frame {
        Frame::new(RgbImage::new(64, 48))
    }

    fn detection(label: &str, confidence: f32) -> Detection {
        Detection {
            region: Region {
                x: 0,
                y: 0,
                width: 8,
                height: 8,
            },
            confidence,
            label: label.to_string(),
        }
    }

    #[test]
    fn stub_classifier_fires_every_nth_frame() {
        let mut classifier = StubClassifier::new(3, "person", 0.9);
        let f = frame();
        assert!(classifier.classify(&f).is_empty());
        assert!(classifier.classify(&f).is_empty());
        let hits = classifier.classify(&f);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label, "person");
    }

    #[test]
    fn roster_match_is_authorized_with_subject() {
        let roster = IdentityRoster::new(vec!["Alice".into()]);
        let decision = roster.decide(&detection("alice", 0.87));
        assert_eq!(decision.classification, Classification::Authorized);
        assert_eq!(decision.subject.as_deref(), Some("Alice"));
    }

    #[test]
    fn unknown_label_is_unauthorized() {
        let roster = IdentityRoster::new(vec!["Alice".into()]);
        let decision = roster.decide(&detection("person", 0.91));
        assert_eq!(decision.classification, Classification::Unauthorized);
        assert!(decision.subject.is_none());
        assert_eq!(decision.subject_name(), "Unknown");
    }

    #[test]
    fn schedule_heuristic_authorizes_business_hours_high_confidence() {
        let d = decide_by_schedule(0.85, 10);
        assert_eq!(d.classification, Classification::Authorized);

        // After hours, same confidence.
        let d = decide_by_schedule(0.85, 22);
        assert_eq!(d.classification, Classification::Unauthorized);

        // Business hours, low confidence.
        let d = decide_by_schedule(0.6, 10);
        assert_eq!(d.classification, Classification::Unauthorized);

        // Boundary: 0.8 is not "greater than 0.8".
        let d = decide_by_schedule(0.8, 10);
        assert_eq!(d.classification, Classification::Unauthorized);
    }
}
