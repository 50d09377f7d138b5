//! Frames and the rolling pre-event ring buffer.
//!
//! The ring holds the last `buffer_seconds * fps` frames so that an admitted
//! event can be evidenced with the seconds leading up to it. Frames are
//! shared as `Arc<Frame>`: `snapshot()` clones the handles, so a snapshot is
//! immutable even while the capture worker keeps pushing.

use chrono::{DateTime, Local};
use image::RgbImage;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// An image sample with its capture timestamps.
///
/// Produced by the capture loop, read-only to all consumers, never mutated
/// after insertion. `captured_at` is monotonic and drives all pipeline
/// timing; `wall_time` is for filenames and human-readable records.
#[derive(Debug)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: Instant,
    pub wall_time: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
            wall_time: Local::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Bounded rolling window of recent frames.
///
/// Single writer (the capture worker), shared readers. Insertion order is
/// capture order; the oldest frame is evicted when capacity is exceeded.
pub struct FrameRing {
    inner: Mutex<RingInner>,
}

struct RingInner {
    frames: VecDeque<Arc<Frame>>,
    capacity: usize,
}

impl FrameRing {
    /// Capacity is time-based: `buffer_seconds * fps` frames.
    pub fn with_horizon(buffer_seconds: u32, fps: u32) -> Self {
        let capacity = Self::capacity_for(buffer_seconds, fps);
        Self {
            inner: Mutex::new(RingInner {
                frames: VecDeque::with_capacity(capacity),
                capacity,
            }),
        }
    }

    fn capacity_for(buffer_seconds: u32, fps: u32) -> usize {
        (buffer_seconds as usize).saturating_mul(fps as usize)
    }

    fn lock(&self) -> MutexGuard<'_, RingInner> {
        // A poisoned lock only means a pushing thread panicked mid-update;
        // the deque itself is never left in a torn state.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a frame, evicting the oldest when over capacity. O(1)
    /// amortized; never blocks on a snapshot reader beyond the short
    /// critical section.
    pub fn push(&self, frame: Frame) {
        let mut inner = self.lock();
        if inner.capacity == 0 {
            return;
        }
        while inner.frames.len() >= inner.capacity {
            inner.frames.pop_front();
        }
        inner.frames.push_back(Arc::new(frame));
    }

    /// Current contents in capture order. Copy-on-read: later pushes never
    /// change a previously returned snapshot.
    pub fn snapshot(&self) -> Vec<Arc<Frame>> {
        self.lock().frames.iter().cloned().collect()
    }

    /// Most recent frame, if any.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.lock().frames.back().cloned()
    }

    /// Recompute capacity after a rate or horizon change.
    ///
    /// This is re-provisioning, not resize-in-place: outstanding snapshots
    /// keep their `Arc` handles and are unaffected. Excess old frames are
    /// evicted immediately if the new capacity is smaller.
    pub fn reprovision(&self, buffer_seconds: u32, fps: u32) {
        let capacity = Self::capacity_for(buffer_seconds, fps);
        let mut inner = self.lock();
        inner.capacity = capacity;
        while inner.frames.len() > capacity {
            inner.frames.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }
}
