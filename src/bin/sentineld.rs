//! sentineld - detection-event pipeline daemon
//!
//! This daemon:
//! 1. Captures frames from the configured local source into the pre-event ring
//! 2. Classifies frames and gates detections through the cooldown window
//! 3. Assembles evidence (photo, clip, summary) for unauthorized events
//! 4. Accepts pre-classified detections from remote sensors over HTTP
//! 5. Drains the event queue on a poll interval: logs each event, sends alerts
//! 6. Sweeps evidence directories on the retention schedule

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sentinel_core::eventlog::LogRecord;
use sentinel_core::evidence::{EvidenceAssembler, MjpegEncoder};
use sentinel_core::notify::SmtpMailer;
use sentinel_core::{
    CaptureWorker, ClassificationDecision, CooldownGate, DetectionPipeline, EventDispatcher,
    EventLog, EvidenceBundle, FrameRing, IdentityRoster, IngressServer, Notifier, PipelineError,
    SentineldConfig, StubClassifier, SyntheticSource,
};

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = SentineldConfig::load()?;
    log::info!(
        "sentineld {} starting: capture={} fps={} buffer={}s clip={}s cooldown={}s",
        env!("CARGO_PKG_VERSION"),
        cfg.capture.url,
        cfg.capture.fps,
        cfg.buffer_seconds,
        cfg.clip_duration_seconds,
        cfg.cooldown_seconds
    );

    let (producer, consumer) =
        EventDispatcher::bounded(cfg.queue_capacity, cfg.poll_interval());

    let ingress_handle = IngressServer::new(cfg.ingress.clone(), producer.clone()).spawn()?;
    log::info!("ingress listening on {}", ingress_handle.addr);

    let ring = Arc::new(FrameRing::with_horizon(cfg.buffer_seconds, cfg.capture.fps));
    let assembler = EvidenceAssembler::new(
        cfg.evidence_dirs(),
        cfg.capture.fps,
        cfg.buffer_seconds,
        cfg.clip_duration_seconds,
        cfg.cooldown_seconds,
        Box::new(MjpegEncoder::default()),
    );
    // TODO: wire a real model backend once one lands; the stub fires a
    // person detection every 10 seconds of footage.
    let classifier = StubClassifier::new(cfg.capture.fps as u64 * 10, "person", 0.9);
    let pipeline = DetectionPipeline::new(
        ring,
        Box::new(classifier),
        CooldownGate::new(cfg.cooldown()),
        IdentityRoster::new(cfg.roster.clone()),
        assembler,
        producer,
        cfg.min_confidence,
    );
    let source = SyntheticSource::new(cfg.capture.clone())?;
    let capture_handle = CaptureWorker::new(Box::new(source), pipeline).spawn();

    let notifier = match SmtpMailer::from_settings(&cfg.email) {
        Ok(mailer) => Some(Notifier::new(
            Box::new(mailer),
            cfg.email.notify_authorized,
            cfg.email.notify_unauthorized,
        )),
        Err(err) if err.is_configuration() => {
            log::warn!("email notifications disabled: {}", err);
            None
        }
        Err(err) => return Err(err.into()),
    };

    let eventlog = EventLog::new(cfg.event_log.clone());
    let dirs = cfg.evidence_dirs();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_ctrlc = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    })?;

    log::info!("sentineld running. event log at {}", eventlog.path().display());

    if let Err(err) = sentinel_core::retention::sweep(&dirs, cfg.retention_age()) {
        log::error!("retention sweep failed: {}", err);
    }
    let mut last_sweep = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        for event in consumer.drain() {
            handle_event(&eventlog, notifier.as_ref(), &event);
        }

        if last_sweep.elapsed() >= RETENTION_SWEEP_INTERVAL {
            if let Err(err) = sentinel_core::retention::sweep(&dirs, cfg.retention_age()) {
                log::error!("retention sweep failed: {}", err);
            }
            last_sweep = Instant::now();
        }

        std::thread::sleep(consumer.poll_interval());
    }

    log::info!("shutting down");
    capture_handle.stop()?;
    ingress_handle.stop()?;
    Ok(())
}

fn handle_event(
    eventlog: &EventLog,
    notifier: Option<&Notifier>,
    event: &sentinel_core::DetectionEvent,
) {
    log_event_summary(event);

    let record = LogRecord::from_event(event);
    if let Err(err) = eventlog.append(&record) {
        log::error!("failed to log event {}: {}", event.id, err);
    }

    if let Some(notifier) = notifier {
        match notifier.notify(event) {
            Ok(report) => log::debug!("event {} notification: {:?}", event.id, report),
            Err(PipelineError::Delivery(reason)) => {
                // No retry: the event is already logged and evidenced.
                log::error!("event {} notification failed: {}", event.id, reason);
            }
            Err(err) => log::error!("event {} notification error: {}", event.id, err),
        }
    }
}

fn log_event_summary(event: &sentinel_core::DetectionEvent) {
    let ClassificationDecision {
        classification,
        confidence,
        ..
    } = &event.decision;
    let artifacts = event
        .evidence
        .as_ref()
        .map(EvidenceBundle::is_empty)
        .map(|empty| if empty { "no artifacts" } else { "artifacts on disk" })
        .unwrap_or("no local evidence");
    log::info!(
        "event {}: {} {} from {} ({:.0}%), {}",
        event.id,
        classification,
        event.decision.subject_name(),
        event.source,
        *confidence * 100.0,
        artifacts
    );
}
