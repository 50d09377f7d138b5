//! Clip writer seam and the built-in MJPEG implementation.
//!
//! Native container muxing is an external concern; the assembler only needs
//! something that accepts frames and finishes with metadata. The default
//! implementation writes a raw MJPEG stream (concatenated JPEG images),
//! which every common player and ffmpeg accept as `.mjpeg`.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::PipelineError;
use crate::VideoMetadata;

/// Factory for per-clip writers.
pub trait VideoEncoder: Send {
    /// File extension for clips produced by this encoder, without the dot.
    fn extension(&self) -> &'static str;

    fn open(&self, path: &Path, fps: u32) -> Result<Box<dyn ClipWriter>, PipelineError>;
}

/// One clip in progress. Frames are appended in order; `finish` flushes and
/// reports what was written. Dropping without `finish` leaves a partial but
/// well-formed prefix on disk.
pub trait ClipWriter {
    fn append(&mut self, image: &RgbImage) -> Result<(), PipelineError>;

    fn finish(self: Box<Self>) -> Result<VideoMetadata, PipelineError>;
}

/// Raw MJPEG stream encoder.
pub struct MjpegEncoder {
    quality: u8,
}

impl MjpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for MjpegEncoder {
    fn default() -> Self {
        Self::new(80)
    }
}

impl VideoEncoder for MjpegEncoder {
    fn extension(&self) -> &'static str {
        "mjpeg"
    }

    fn open(&self, path: &Path, fps: u32) -> Result<Box<dyn ClipWriter>, PipelineError> {
        let file = File::create(path)
            .map_err(|e| PipelineError::EvidenceWrite(format!("{}: {}", path.display(), e)))?;
        Ok(Box::new(MjpegClipWriter {
            writer: BufWriter::new(file),
            quality: self.quality,
            fps: fps.max(1),
            frame_count: 0,
            byte_size: 0,
        }))
    }
}

struct MjpegClipWriter {
    writer: BufWriter<File>,
    quality: u8,
    fps: u32,
    frame_count: usize,
    byte_size: u64,
}

impl ClipWriter for MjpegClipWriter {
    fn append(&mut self, image: &RgbImage) -> Result<(), PipelineError> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode_image(image)
            .map_err(|e| PipelineError::EvidenceWrite(format!("jpeg encode: {}", e)))?;
        self.writer
            .write_all(&jpeg)
            .map_err(|e| PipelineError::EvidenceWrite(format!("clip write: {}", e)))?;
        self.frame_count += 1;
        self.byte_size += jpeg.len() as u64;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<VideoMetadata, PipelineError> {
        self.writer
            .flush()
            .map_err(|e| PipelineError::EvidenceWrite(format!("clip flush: {}", e)))?;
        Ok(VideoMetadata {
            duration_secs: self.frame_count as f64 / self.fps as f64,
            frame_count: self.frame_count,
            byte_size: self.byte_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mjpeg_writer_counts_frames_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mjpeg");
        let encoder = MjpegEncoder::default();

        let mut writer = encoder.open(&path, 15).unwrap();
        let image = RgbImage::new(32, 24);
        for _ in 0..30 {
            writer.append(&image).unwrap();
        }
        let meta = writer.finish().unwrap();

        assert_eq!(meta.frame_count, 30);
        assert!((meta.duration_secs - 2.0).abs() < f64::EPSILON);
        assert!(meta.byte_size > 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), meta.byte_size);
    }

    #[test]
    fn clip_stream_starts_with_jpeg_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mjpeg");
        let encoder = MjpegEncoder::default();

        let mut writer = encoder.open(&path, 10).unwrap();
        writer.append(&RgbImage::new(8, 8)).unwrap();
        writer.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
