//! Evidence assembly for admitted detections.
//!
//! One admitted event yields up to three artifacts: an annotated photo of
//! the trigger frame, a clip of the buffered pre-event frames plus post-roll,
//! and a text summary. The steps are independent: a failed clip never voids
//! the photo, and whatever was written is reported per artifact.

pub mod clip;
pub mod overlay;

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use clip::{ClipWriter, MjpegEncoder, VideoEncoder};

use crate::classify::Detection;
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::{ClassificationDecision, EvidenceBundle, VideoMetadata};

/// Outcome of one artifact attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum ArtifactOutcome {
    Written(PathBuf),
    /// Nothing to write (e.g., no trigger frame). Not an error.
    Skipped(&'static str),
    Failed(String),
}

impl ArtifactOutcome {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ArtifactOutcome::Written(path) => Some(path),
            _ => None,
        }
    }

    fn from_result(result: Result<PathBuf, PipelineError>) -> Self {
        match result {
            Ok(path) => ArtifactOutcome::Written(path),
            Err(err) => ArtifactOutcome::Failed(err.to_string()),
        }
    }
}

/// Per-artifact results for one assembled event.
#[derive(Clone, Debug)]
pub struct EvidenceReport {
    pub photo: ArtifactOutcome,
    pub video: ArtifactOutcome,
    pub summary: ArtifactOutcome,
    pub video_meta: Option<VideoMetadata>,
}

impl EvidenceReport {
    /// Collapse into the bundle attached to the event: paths for written
    /// artifacts, `None` for anything skipped or failed.
    pub fn bundle(&self) -> EvidenceBundle {
        EvidenceBundle {
            photo: self.photo.path().cloned(),
            video: self.video.path().cloned(),
            summary: self.summary.path().cloned(),
            video_meta: self.video_meta.clone(),
        }
    }
}

/// Where the three artifact kinds land on disk.
#[derive(Clone, Debug)]
pub struct EvidenceDirs {
    pub photos: PathBuf,
    pub clips: PathBuf,
    pub logs: PathBuf,
}

impl EvidenceDirs {
    /// Conventional layout under one evidence root.
    pub fn under(root: &Path) -> Self {
        Self {
            photos: root.join("security_photos"),
            clips: root.join("security_clips"),
            logs: root.join("security_logs"),
        }
    }
}

pub struct EvidenceAssembler {
    dirs: EvidenceDirs,
    fps: u32,
    buffer_seconds: u32,
    clip_duration_seconds: u32,
    cooldown_seconds: u32,
    encoder: Box<dyn VideoEncoder>,
}

impl EvidenceAssembler {
    pub fn new(
        dirs: EvidenceDirs,
        fps: u32,
        buffer_seconds: u32,
        clip_duration_seconds: u32,
        cooldown_seconds: u32,
        encoder: Box<dyn VideoEncoder>,
    ) -> Self {
        Self {
            dirs,
            fps: fps.max(1),
            buffer_seconds,
            clip_duration_seconds,
            cooldown_seconds,
            encoder,
        }
    }

    /// Frames appended after the buffered pre-roll and the trigger frame, so
    /// a clip covers the configured duration even when the buffer horizon is
    /// shorter. Zero when the buffer already covers the clip.
    pub fn post_roll_frames(&self) -> usize {
        let extra =
            (self.clip_duration_seconds as f64 - self.buffer_seconds as f64) * self.fps as f64;
        if extra <= 0.0 {
            0
        } else {
            extra.round() as usize
        }
    }

    /// Assemble all artifacts for one admitted detection. `snapshot` is the
    /// ring contents at admission time, newest last; the newest frame is the
    /// trigger. Infallible by contract: failures are captured per artifact.
    pub fn assemble(
        &self,
        snapshot: &[Arc<Frame>],
        detection: &Detection,
        decision: &ClassificationDecision,
    ) -> EvidenceReport {
        let at = snapshot
            .last()
            .map(|frame| frame.wall_time)
            .unwrap_or_else(Local::now);
        let base = self.reserve_base_name(at, decision.confidence);

        let (photo, video, video_meta) = match snapshot.last() {
            Some(trigger) => {
                let annotated = overlay::annotate(&trigger.image, detection, at);
                let photo = ArtifactOutcome::from_result(self.write_photo(&base, &annotated));
                let (video, video_meta) =
                    match self.write_clip(&base, snapshot, &annotated) {
                        Ok((path, meta)) => (ArtifactOutcome::Written(path), Some(meta)),
                        Err(err) => (ArtifactOutcome::Failed(err.to_string()), None),
                    };
                (photo, video, video_meta)
            }
            None => (
                ArtifactOutcome::Skipped("no trigger frame"),
                ArtifactOutcome::Skipped("no buffered frames"),
                None,
            ),
        };

        let summary = ArtifactOutcome::from_result(self.write_summary(
            &base,
            at,
            detection,
            decision,
            &photo,
            &video,
            video_meta.as_ref(),
        ));

        for outcome in [&photo, &video, &summary] {
            if let ArtifactOutcome::Failed(reason) = outcome {
                log::error!("evidence artifact failed for {}: {}", base, reason);
            }
        }

        EvidenceReport {
            photo,
            video,
            summary,
            video_meta,
        }
    }

    /// `detection_YYYYmmdd_HHMMSS_<confidence%>`, suffixed `_N` until none
    /// of the three candidate paths exist. Two admissions in the same second
    /// therefore never overwrite each other.
    fn reserve_base_name(&self, at: DateTime<Local>, confidence: f32) -> String {
        let stem = format!(
            "detection_{}_{:.0}",
            at.format("%Y%m%d_%H%M%S"),
            (confidence * 100.0).round()
        );
        let mut candidate = stem.clone();
        let mut n = 1u32;
        while self.any_artifact_exists(&candidate) {
            candidate = format!("{}_{}", stem, n);
            n += 1;
        }
        candidate
    }

    fn any_artifact_exists(&self, base: &str) -> bool {
        self.photo_path(base).exists()
            || self.clip_path(base).exists()
            || self.summary_path(base).exists()
    }

    fn photo_path(&self, base: &str) -> PathBuf {
        self.dirs.photos.join(format!("{}.jpg", base))
    }

    fn clip_path(&self, base: &str) -> PathBuf {
        self.dirs
            .clips
            .join(format!("{}.{}", base, self.encoder.extension()))
    }

    fn summary_path(&self, base: &str) -> PathBuf {
        self.dirs.logs.join(format!("{}.txt", base))
    }

    fn write_photo(&self, base: &str, annotated: &image::RgbImage) -> Result<PathBuf, PipelineError> {
        ensure_dir(&self.dirs.photos)?;
        let path = self.photo_path(base);
        annotated
            .save(&path)
            .map_err(|e| PipelineError::EvidenceWrite(format!("{}: {}", path.display(), e)))?;
        Ok(path)
    }

    fn write_clip(
        &self,
        base: &str,
        snapshot: &[Arc<Frame>],
        annotated_trigger: &image::RgbImage,
    ) -> Result<(PathBuf, VideoMetadata), PipelineError> {
        ensure_dir(&self.dirs.clips)?;
        let path = self.clip_path(base);
        let mut writer = self.encoder.open(&path, self.fps)?;
        for frame in snapshot {
            writer.append(&frame.image)?;
        }
        writer.append(annotated_trigger)?;
        for _ in 0..self.post_roll_frames() {
            writer.append(annotated_trigger)?;
        }
        let meta = writer.finish()?;
        Ok((path, meta))
    }

    #[allow(clippy::too_many_arguments)]
    fn write_summary(
        &self,
        base: &str,
        at: DateTime<Local>,
        detection: &Detection,
        decision: &ClassificationDecision,
        photo: &ArtifactOutcome,
        video: &ArtifactOutcome,
        video_meta: Option<&VideoMetadata>,
    ) -> Result<PathBuf, PipelineError> {
        ensure_dir(&self.dirs.logs)?;
        let path = self.summary_path(base);

        let mut text = String::new();
        text.push_str("SECURITY DETECTION REPORT\n");
        text.push_str("=========================\n");
        text.push_str(&format!("Time:           {}\n", at.format("%Y-%m-%d %H:%M:%S")));
        text.push_str("Source:         local_camera\n");
        text.push_str(&format!("Classification: {}\n", decision.classification));
        text.push_str(&format!("Subject:        {}\n", decision.subject_name()));
        text.push_str(&format!("Label:          {}\n", detection.label));
        text.push_str(&format!(
            "Confidence:     {:.0}%\n",
            (decision.confidence * 100.0).round()
        ));
        text.push('\n');
        text.push_str(&format!("Photo:          {}\n", artifact_line(photo)));
        text.push_str(&format!("Video:          {}\n", artifact_line(video)));
        if let Some(meta) = video_meta {
            text.push_str(&format!(
                "Clip:           {} frames, {:.1}s, {} bytes\n",
                meta.frame_count, meta.duration_secs, meta.byte_size
            ));
        }
        text.push('\n');
        text.push_str(&format!(
            "Settings:       fps={} buffer={}s clip={}s cooldown={}s\n",
            self.fps, self.buffer_seconds, self.clip_duration_seconds, self.cooldown_seconds
        ));

        std::fs::write(&path, text)
            .map_err(|e| PipelineError::EvidenceWrite(format!("{}: {}", path.display(), e)))?;
        Ok(path)
    }
}

fn ensure_dir(dir: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| PipelineError::EvidenceWrite(format!("{}: {}", dir.display(), e)))
}

fn artifact_line(outcome: &ArtifactOutcome) -> String {
    match outcome {
        ArtifactOutcome::Written(path) => path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        ArtifactOutcome::Skipped(reason) => format!("skipped ({})", reason),
        ArtifactOutcome::Failed(reason) => format!("failed ({})", reason),
    }
}
