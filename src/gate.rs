//! Cooldown/debounce state machine.
//!
//! One gate per pipeline instance; the state is owned exclusively by that
//! pipeline and never shared across threads. The gate is not a rate limiter:
//! it only suppresses re-admission within the cooldown window, and once the
//! window elapses the very next detection is eligible regardless of queue
//! depth downstream.

use crate::classify::Detection;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    /// No recent admission.
    Idle,
    /// Within the cooldown window since the last admission.
    Cooling,
}

/// Per-pipeline cooldown gate.
///
/// On a batch of detections (several persons in one frame), only the
/// highest-confidence detection is considered, ties broken by first-seen
/// order. Admission at exactly `last + interval` succeeds; anything earlier
/// is discarded silently (not queued, logged, or evidenced).
pub struct CooldownGate {
    interval: Duration,
    last_admitted: Option<Instant>,
    dropped: u64,
}

impl CooldownGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_admitted: None,
            dropped: 0,
        }
    }

    pub fn state(&self, now: Instant) -> GateState {
        match self.last_admitted {
            Some(last) if now.duration_since(last) < self.interval => GateState::Cooling,
            _ => GateState::Idle,
        }
    }

    /// Consider a batch of detections at `now`. Returns the admitted
    /// detection, or `None` if the batch is empty or the gate is cooling.
    ///
    /// A zero interval admits the batch winner every time.
    pub fn admit(&mut self, detections: Vec<Detection>, now: Instant) -> Option<Detection> {
        let best = Self::best_of(detections)?;

        if let Some(last) = self.last_admitted {
            if now.duration_since(last) < self.interval {
                self.dropped += 1;
                log::trace!(
                    "cooldown gate discarded detection (confidence {:.2}, {} dropped so far)",
                    best.confidence,
                    self.dropped
                );
                return None;
            }
        }

        self.last_admitted = Some(now);
        Some(best)
    }

    /// Detections the gate has silently discarded. Not queued or evidenced;
    /// exposed only as an operator counter.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn best_of(detections: Vec<Detection>) -> Option<Detection> {
        let mut best: Option<Detection> = None;
        for d in detections {
            match &best {
                // Strict greater-than keeps the first-seen detection on ties.
                Some(current) if d.confidence > current.confidence => best = Some(d),
                Some(_) => {}
                None => best = Some(d),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Region;

    fn detection(label: &str, confidence: f32) -> Detection {
        Detection {
            region: Region {
                x: 0,
                y: 0,
                width: 1,
                height: 1,
            },
            confidence,
            label: label.to_string(),
        }
    }

    #[test]
    fn first_detection_is_admitted() {
        let mut gate = CooldownGate::new(Duration::from_secs(3));
        let now = Instant::now();
        assert!(gate.admit(vec![detection("a", 0.9)], now).is_some());
        assert_eq!(gate.state(now), GateState::Cooling);
    }

    #[test]
    fn within_window_is_discarded_at_boundary_admitted() {
        let mut gate = CooldownGate::new(Duration::from_secs(3));
        let t0 = Instant::now();
        assert!(gate.admit(vec![detection("a", 0.9)], t0).is_some());

        // Strictly inside (t0, t0+3s): discarded.
        let t1 = t0 + Duration::from_millis(2_999);
        assert!(gate.admit(vec![detection("b", 0.95)], t1).is_none());
        assert_eq!(gate.dropped(), 1);

        // Exactly t0 + interval: admitted.
        let t2 = t0 + Duration::from_secs(3);
        assert!(gate.admit(vec![detection("c", 0.5)], t2).is_some());
    }

    #[test]
    fn highest_confidence_wins_ties_go_first_seen() {
        let mut gate = CooldownGate::new(Duration::ZERO);
        let now = Instant::now();

        let admitted = gate
            .admit(
                vec![detection("low", 0.4), detection("high", 0.9), detection("mid", 0.7)],
                now,
            )
            .unwrap();
        assert_eq!(admitted.label, "high");

        let admitted = gate
            .admit(vec![detection("first", 0.8), detection("second", 0.8)], now)
            .unwrap();
        assert_eq!(admitted.label, "first");
    }

    #[test]
    fn zero_interval_admits_every_batch() {
        let mut gate = CooldownGate::new(Duration::ZERO);
        let now = Instant::now();
        for _ in 0..5 {
            assert!(gate.admit(vec![detection("a", 0.9)], now).is_some());
        }
        assert_eq!(gate.dropped(), 0);
    }

    #[test]
    fn empty_batch_does_not_touch_state() {
        let mut gate = CooldownGate::new(Duration::from_secs(3));
        let now = Instant::now();
        assert!(gate.admit(Vec::new(), now).is_none());
        assert_eq!(gate.state(now), GateState::Idle);
    }
}
