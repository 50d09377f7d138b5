//! End-to-end pipeline scenarios exercised without the daemon binary.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use image::RgbImage;

use sentinel_core::eventlog::LogRecord;
use sentinel_core::evidence::{ClipWriter, VideoEncoder};
use sentinel_core::notify::{format_alert, AlertMessage, Mailer};
use sentinel_core::{
    Classification, ClassificationDecision, CooldownGate, DetectionEvent, DetectionPipeline,
    EventDispatcher, EventIdGen, EventLog, EventSource, EvidenceAssembler, EvidenceDirs, Frame,
    FrameRing, IdentityRoster, IngressConfig, IngressServer, MjpegEncoder, Notifier,
    PipelineError, StubClassifier,
};

fn frame() -> Frame {
    Frame::new(RgbImage::new(32, 24))
}

fn build_pipeline(
    root: &Path,
    fps: u32,
    buffer_seconds: u32,
    clip_seconds: u32,
    cooldown: Duration,
    fire_every: u64,
    encoder: Box<dyn VideoEncoder>,
) -> (DetectionPipeline, sentinel_core::EventConsumer) {
    let (producer, consumer) = EventDispatcher::bounded(16, Duration::from_millis(10));
    let assembler = EvidenceAssembler::new(
        EvidenceDirs::under(root),
        fps,
        buffer_seconds,
        clip_seconds,
        cooldown.as_secs() as u32,
        encoder,
    );
    let pipeline = DetectionPipeline::new(
        Arc::new(FrameRing::with_horizon(buffer_seconds, fps)),
        Box::new(StubClassifier::new(fire_every, "person", 0.9)),
        CooldownGate::new(cooldown),
        IdentityRoster::default(),
        assembler,
        producer,
        0.5,
    );
    (pipeline, consumer)
}

// Scenario: camera runs long enough to fill the 10s buffer at 15 fps, then
// an unauthorized person appears. The clip must cover the buffered pre-roll,
// the trigger frame, and the post-roll padding: 150 + 1 + 150 = 301 frames.
#[test]
fn filled_buffer_detection_produces_full_length_clip() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, consumer) = build_pipeline(
        dir.path(),
        15,
        10,
        20,
        Duration::ZERO,
        150,
        Box::new(MjpegEncoder::default()),
    );

    let mut admitted = None;
    for _ in 0..150 {
        if let Some(event) = pipeline.observe(frame()) {
            admitted = Some(event);
        }
    }
    let event = admitted.expect("detection on the 150th frame");
    assert_eq!(event.source, EventSource::LocalCamera);
    assert_eq!(event.classification(), Classification::Unauthorized);

    let bundle = event.evidence.as_ref().expect("evidence bundle");
    assert!(bundle.photo.as_ref().unwrap().exists());
    assert!(bundle.summary.as_ref().unwrap().exists());
    let meta = bundle.video_meta.as_ref().expect("clip metadata");
    assert_eq!(meta.frame_count, 301);
    assert!(bundle.video.as_ref().unwrap().exists());

    assert_eq!(consumer.drain().len(), 1);
}

// Scenario: a second detection lands within the cooldown window. No
// artifacts, no queue entry, and the window is not extended.
#[test]
fn detection_inside_cooldown_window_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, consumer) = build_pipeline(
        dir.path(),
        5,
        1,
        1,
        Duration::from_secs(60),
        1,
        Box::new(MjpegEncoder::default()),
    );

    assert!(pipeline.observe(frame()).is_some());
    let photos_after_first = count_files(&dir.path().join("security_photos"));

    for _ in 0..5 {
        assert!(pipeline.observe(frame()).is_none());
    }

    assert_eq!(
        count_files(&dir.path().join("security_photos")),
        photos_after_first
    );
    assert_eq!(consumer.drain().len(), 1);
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|e| e.count()).unwrap_or(0)
}

// Scenario: a remote sensor posts a valid detection. Exactly one
// RemoteSensor event appears with no evidence bundle; malformed payloads are
// rejected with 400 and enqueue nothing.
#[test]
fn remote_ingress_enqueues_event_without_bundle() {
    let (producer, consumer) = EventDispatcher::bounded(16, Duration::from_millis(10));
    let handle = IngressServer::new(
        IngressConfig {
            addr: "127.0.0.1:0".to_string(),
        },
        producer,
    )
    .spawn()
    .expect("spawn ingress");
    let addr = handle.addr;

    let response = http_request(
        addr,
        "POST",
        "/detections",
        r#"{"person_type":"unauthorized","confidence":0.82,"timestamp":"2024-01-01 10:00:00","source_id":"gate-1"}"#,
    );
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(r#"{"status":"received"}"#));

    let response = http_request(
        addr,
        "POST",
        "/detections",
        r#"{"person_type":"visitor","confidence":0.5}"#,
    );
    assert!(response.starts_with("HTTP/1.1 400"));

    let response = http_request(addr, "POST", "/detections", "not json");
    assert!(response.starts_with("HTTP/1.1 400"));

    let response = http_request(addr, "GET", "/health", "");
    assert!(response.starts_with("HTTP/1.1 200"));

    // Give the listener a moment to hand the event to the queue.
    std::thread::sleep(Duration::from_millis(100));
    let events = consumer.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source, EventSource::RemoteSensor);
    assert_eq!(events[0].classification(), Classification::Unauthorized);
    assert!(events[0].evidence.is_none());
    // The sender's timestamp, not the receipt time, ends up in the log.
    let record = LogRecord::from_event(&events[0]);
    assert_eq!(record.timestamp, "2024-01-01 10:00:00");

    handle.stop().expect("stop ingress");
}

fn http_request(addr: std::net::SocketAddr, method: &str, path: &str, body: &str) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect");
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).expect("send request");
    let mut response = String::new();
    stream.read_to_string(&mut response).expect("read response");
    response
}

struct FailingMailer;

impl Mailer for FailingMailer {
    fn send(&self, _message: &AlertMessage) -> Result<(), PipelineError> {
        Err(PipelineError::Delivery("smtp unreachable".to_string()))
    }
}

// Scenario: the event is logged, then delivery fails. The log record stays
// intact and the event is not re-enqueued.
#[test]
fn delivery_failure_leaves_log_intact_and_event_consumed() {
    let dir = tempfile::tempdir().unwrap();
    let eventlog = EventLog::new(dir.path().join("detection_logs.jsonl"));

    let (producer, consumer) = EventDispatcher::bounded(16, Duration::from_millis(10));
    let mut id_gen = EventIdGen::new();
    producer.enqueue(DetectionEvent {
        id: id_gen.next(),
        source: EventSource::LocalCamera,
        occurred_at: Local::now(),
        decision: ClassificationDecision {
            classification: Classification::Unauthorized,
            subject: None,
            confidence: 0.9,
        },
        evidence: None,
    });

    let notifier = Notifier::new(Box::new(FailingMailer), false, true);
    for event in consumer.drain() {
        eventlog.append(&LogRecord::from_event(&event)).unwrap();
        let err = notifier.notify(&event).unwrap_err();
        assert!(matches!(err, PipelineError::Delivery(_)));
    }

    assert_eq!(eventlog.read_recent(10).unwrap().len(), 1);
    assert!(consumer.drain().is_empty());
}

// Two producers interleaving from separate threads: each producer's own
// events must come out in the order it enqueued them.
#[test]
fn per_producer_fifo_holds_under_interleaving() {
    let (producer, consumer) = EventDispatcher::bounded(256, Duration::from_millis(10));

    let mut handles = Vec::new();
    for source in [EventSource::LocalCamera, EventSource::RemoteSensor] {
        let producer = producer.clone();
        handles.push(std::thread::spawn(move || {
            let mut id_gen = EventIdGen::new();
            for _ in 0..50 {
                producer.enqueue(DetectionEvent {
                    id: id_gen.next(),
                    source,
                    occurred_at: Local::now(),
                    decision: ClassificationDecision {
                        classification: Classification::Unauthorized,
                        subject: None,
                        confidence: 0.9,
                    },
                    evidence: None,
                });
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let events = consumer.drain();
    assert_eq!(events.len(), 100);
    for source in [EventSource::LocalCamera, EventSource::RemoteSensor] {
        let seqs: Vec<u64> = events
            .iter()
            .filter(|event| event.source == source)
            .map(|event| event.id.seq)
            .collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted, "{:?} events out of order", source);
    }
}

struct BrokenEncoder;

impl VideoEncoder for BrokenEncoder {
    fn extension(&self) -> &'static str {
        "mjpeg"
    }

    fn open(&self, _path: &Path, _fps: u32) -> Result<Box<dyn ClipWriter>, PipelineError> {
        Err(PipelineError::EvidenceWrite("encoder unavailable".to_string()))
    }
}

// Scenario: the clip writer fails but the photo and summary survive, and the
// alert still attaches what exists.
#[test]
fn clip_failure_keeps_photo_and_alert_attaches_it() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, consumer) = build_pipeline(
        dir.path(),
        5,
        1,
        1,
        Duration::ZERO,
        1,
        Box::new(BrokenEncoder),
    );

    let event = pipeline.observe(frame()).expect("admitted event");
    let bundle = event.evidence.as_ref().expect("partial bundle");
    assert!(bundle.photo.as_ref().unwrap().exists());
    assert!(bundle.video.is_none());
    assert!(bundle.summary.is_some());

    let message = format_alert(&event);
    let names: Vec<&str> = message
        .attachments
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();
    assert!(names.iter().any(|name| name.ends_with(".jpg")));
    assert!(!names.iter().any(|name| name.ends_with(".mjpeg")));

    assert_eq!(consumer.drain().len(), 1);
}
