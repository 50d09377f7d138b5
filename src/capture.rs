//! Frame source seam, the per-frame pipeline, and the capture worker thread.
//!
//! `DetectionPipeline` is thread-free: it takes one frame at a time and does
//! buffering, classification, gating, evidence and enqueue, so all of its
//! behavior is unit-testable without threads. `CaptureWorker` wraps it in a
//! loop with an idempotent stop handle and backoff on source failures.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::classify::{Classifier, IdentityRoster};
use crate::dispatch::EventProducer;
use crate::error::PipelineError;
use crate::evidence::EvidenceAssembler;
use crate::frame::{Frame, FrameRing};
use crate::gate::CooldownGate;
use crate::{Classification, DetectionEvent, EventIdGen, EventSource};

/// Camera/video source seam. The default implementation is synthetic
/// (`stub://` URLs); a real camera backend plugs in here.
pub trait FrameSource: Send {
    /// Produce the next frame, pacing to the source frame rate. Failures are
    /// transient by contract; the worker retries with backoff.
    fn next_frame(&mut self) -> Result<Frame, PipelineError>;

    fn describe(&self) -> String;
}

/// Settings for a local capture source.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub url: String,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            url: "stub://front_door".to_string(),
            fps: 15,
            width: 640,
            height: 480,
        }
    }
}

/// Synthetic frame source for `stub://` URLs.
///
/// Generates a slowly shifting gradient scene and paces itself to the
/// configured frame rate, so the worker loop behaves as it would against a
/// real camera.
pub struct SyntheticSource {
    config: CaptureConfig,
    frame_count: u64,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: CaptureConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "no backend available for capture url '{}'",
                config.url
            ));
        }
        log::info!("capture source connected: {} (synthetic)", config.url);
        Ok(Self {
            config,
            frame_count: 0,
            last_frame_at: None,
        })
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn pace(&mut self) {
        let fps = self.config.fps.max(1);
        let interval = Duration::from_secs(1) / fps;
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Frame, PipelineError> {
        self.pace();
        self.frame_count += 1;
        let shift = (self.frame_count % 256) as u8;
        let image = RgbImage::from_fn(self.config.width, self.config.height, |x, y| {
            Rgb([
                ((x as u64 + self.frame_count) % 256) as u8,
                (y % 256) as u8,
                shift,
            ])
        });
        Ok(Frame::new(image))
    }

    fn describe(&self) -> String {
        self.config.url.clone()
    }
}

/// Per-frame detection pipeline: ring, classifier, gate, evidence, enqueue.
///
/// Owned by exactly one capture worker; the only shared pieces are the ring
/// (snapshot readers) and the event producer.
pub struct DetectionPipeline {
    ring: Arc<FrameRing>,
    classifier: Box<dyn Classifier>,
    gate: CooldownGate,
    roster: IdentityRoster,
    assembler: EvidenceAssembler,
    producer: EventProducer,
    id_gen: EventIdGen,
    min_confidence: f32,
}

impl DetectionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ring: Arc<FrameRing>,
        classifier: Box<dyn Classifier>,
        gate: CooldownGate,
        roster: IdentityRoster,
        assembler: EvidenceAssembler,
        producer: EventProducer,
        min_confidence: f32,
    ) -> Self {
        Self {
            ring,
            classifier,
            gate,
            roster,
            assembler,
            producer,
            id_gen: EventIdGen::new(),
            min_confidence,
        }
    }

    pub fn ring(&self) -> &Arc<FrameRing> {
        &self.ring
    }

    /// Process one captured frame end to end. Returns the event that was
    /// enqueued, if this frame produced one.
    pub fn observe(&mut self, frame: Frame) -> Option<DetectionEvent> {
        self.ring.push(frame);
        let trigger = self.ring.latest()?;

        let mut detections = self.classifier.classify(&trigger);
        detections.retain(|d| d.confidence >= self.min_confidence);

        let admitted = self.gate.admit(detections, trigger.captured_at)?;
        let decision = self.roster.decide(&admitted);

        // Evidence exists only for unauthorized local events; an authorized
        // sighting is logged and optionally notified but not archived.
        let evidence = match decision.classification {
            Classification::Unauthorized => {
                let snapshot = self.ring.snapshot();
                Some(self.assembler.assemble(&snapshot, &admitted, &decision).bundle())
            }
            Classification::Authorized => None,
        };

        let event = DetectionEvent {
            id: self.id_gen.next(),
            source: EventSource::LocalCamera,
            occurred_at: trigger.wall_time,
            decision,
            evidence,
        };
        log::info!(
            "detection admitted: {} {} ({:.0}%)",
            event.classification(),
            event.id,
            event.confidence() * 100.0
        );
        self.producer.enqueue(event.clone());
        Some(event)
    }
}

const BACKOFF_INITIAL: Duration = Duration::from_millis(100);
const BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Worker thread driving a pipeline from a frame source.
pub struct CaptureWorker {
    source: Box<dyn FrameSource>,
    pipeline: DetectionPipeline,
}

/// Stop handle. Consuming `stop` flips the flag and joins, which releases
/// the source; calling it exactly once is enforced by ownership.
#[derive(Debug)]
pub struct CaptureHandle {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("capture worker thread panicked"))?;
        }
        Ok(())
    }
}

impl CaptureWorker {
    pub fn new(source: Box<dyn FrameSource>, pipeline: DetectionPipeline) -> Self {
        Self { source, pipeline }
    }

    pub fn spawn(self) -> CaptureHandle {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let mut source = self.source;
        let mut pipeline = self.pipeline;
        let join = std::thread::spawn(move || {
            let name = source.describe();
            let mut backoff = BACKOFF_INITIAL;
            while !shutdown_thread.load(Ordering::SeqCst) {
                match source.next_frame() {
                    Ok(frame) => {
                        backoff = BACKOFF_INITIAL;
                        pipeline.observe(frame);
                    }
                    Err(err) => {
                        log::warn!(
                            "capture source {} unavailable, retrying in {:?}: {}",
                            name,
                            backoff,
                            err
                        );
                        std::thread::sleep(backoff);
                        backoff = (backoff * 2).min(BACKOFF_MAX);
                    }
                }
            }
            log::info!("capture worker for {} stopped", name);
        });
        CaptureHandle {
            shutdown,
            join: Some(join),
        }
    }
}
