use serde::{Deserialize, Serialize};

use crate::easing;

/// Timing of one entrance animation, created the instant the marker becomes
/// visible and dropped when it is lost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimationTimeline {
    pub start_ms: f64,
    pub duration_ms: f64,
    pub complete: bool,
}

impl AnimationTimeline {
    pub fn start(start_ms: f64, duration_ms: f64) -> Self {
        Self {
            start_ms,
            duration_ms,
            complete: false,
        }
    }

    pub fn elapsed(&self, now_ms: f64) -> f64 {
        (now_ms - self.start_ms).max(0.0)
    }

    /// Normalised progress, always within `[0, 1]`.
    pub fn progress(&self, now_ms: f64) -> f32 {
        if self.complete {
            return 1.0;
        }
        easing::clamp_progress(self.elapsed(now_ms), self.duration_ms)
    }

    /// Flips `complete` once the duration has elapsed. Returns the new value.
    pub fn update(&mut self, now_ms: f64) -> bool {
        if !self.complete && self.progress(now_ms) >= 1.0 {
            self.complete = true;
        }
        self.complete
    }
}

/// Fixed-step frame clock used when driving the engine without a display.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameClock {
    pub now_ms: f64,
    pub frame_interval_ms: f64,
}

impl FrameClock {
    pub fn new(fps: u32) -> Self {
        Self {
            now_ms: 0.0,
            frame_interval_ms: 1000.0 / f64::from(fps.max(1)),
        }
    }

    pub fn reset(&mut self) {
        self.now_ms = 0.0;
    }

    pub fn tick(&mut self) -> f64 {
        self.now_ms += self.frame_interval_ms;
        self.now_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_once_duration_elapses() {
        let mut timeline = AnimationTimeline::start(1_000.0, 1500.0);
        assert!(!timeline.update(1_500.0));
        assert!((timeline.progress(1_750.0) - 0.5).abs() < 1e-6);
        assert!(timeline.update(2_500.0));
        assert_eq!(timeline.progress(2_600.0), 1.0);
    }

    #[test]
    fn huge_deltas_clamp_to_one() {
        let timeline = AnimationTimeline::start(0.0, 1500.0);
        assert_eq!(timeline.progress(1.0e12), 1.0);
        assert_eq!(timeline.progress(-50.0), 0.0);
    }

    #[test]
    fn frame_clock_advances_at_fixed_rate() {
        let mut clock = FrameClock::new(50);
        clock.tick();
        assert_eq!(clock.tick(), 40.0);
        clock.reset();
        assert_eq!(clock.now_ms, 0.0);
    }
}
