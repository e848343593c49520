use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Lower bound for a runtime-configured trigger threshold.
pub const MIN_THRESHOLD: u32 = 500;
/// Upper bound for a runtime-configured trigger threshold.
pub const MAX_THRESHOLD: u32 = 5000;
/// Default RMS trigger threshold (16-bit sample units).
pub const DEFAULT_THRESHOLD: u32 = 2000;
/// Default cooldown after a trigger fires.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(5000);

/// Result of processing one sample block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// RMS amplitude normalized against the threshold, clamped to [0, 1]
    pub level: f32,
    /// Raw RMS amplitude of the block (16-bit sample units)
    pub rms: f32,
    /// Whether this block crossed the threshold outside the cooldown window
    pub triggered: bool,
}

/// RMS amplitude detector with a trigger cooldown.
///
/// The threshold is shared across tasks (the capture session reads it for
/// level metering while the trigger loop owns detection), so it lives in an
/// atomic and an update takes effect on the next processed block.
pub struct AmplitudeDetector {
    threshold: AtomicU32,
    cooldown: Duration,
    cooldown_until: Mutex<Option<Instant>>,
}

impl AmplitudeDetector {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: AtomicU32::new(threshold.clamp(MIN_THRESHOLD, MAX_THRESHOLD)),
            cooldown,
            cooldown_until: Mutex::new(None),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold.load(Ordering::Relaxed)
    }

    /// Update the trigger threshold, clamped to [`MIN_THRESHOLD`, `MAX_THRESHOLD`].
    pub fn set_threshold(&self, value: u32) {
        self.threshold.store(
            value.clamp(MIN_THRESHOLD, MAX_THRESHOLD),
            Ordering::Relaxed,
        );
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// RMS amplitude of a sample block. Empty blocks yield 0.
    pub fn rms(samples: &[i16]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_sq / samples.len() as f64).sqrt() as f32
    }

    /// Normalized level for metering. Pure: never touches cooldown state.
    pub fn level(&self, samples: &[i16]) -> f32 {
        let threshold = self.threshold() as f32;
        (Self::rms(samples) / threshold).clamp(0.0, 1.0)
    }

    /// Process one block: compute level and the trigger decision.
    ///
    /// At most one triggered result per cooldown window, regardless of
    /// sustained loud input.
    pub fn process(&self, samples: &[i16]) -> Detection {
        let rms = Self::rms(samples);
        let threshold = self.threshold() as f32;
        let level = (rms / threshold).clamp(0.0, 1.0);

        if rms <= threshold {
            return Detection {
                level,
                rms,
                triggered: false,
            };
        }

        let now = Instant::now();
        let mut until = self.cooldown_until.lock().expect("cooldown lock poisoned");
        let in_cooldown = until.map(|t| now < t).unwrap_or(false);
        if in_cooldown {
            return Detection {
                level,
                rms,
                triggered: false,
            };
        }

        *until = Some(now + self.cooldown);
        Detection {
            level,
            rms,
            triggered: true,
        }
    }
}

impl Default for AmplitudeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_block_is_silent() {
        let detector = AmplitudeDetector::default();
        let det = detector.process(&[]);
        assert_eq!(det.level, 0.0);
        assert!(!det.triggered);
    }

    #[test]
    fn threshold_is_clamped() {
        let detector = AmplitudeDetector::new(10, DEFAULT_COOLDOWN);
        assert_eq!(detector.threshold(), MIN_THRESHOLD);
        detector.set_threshold(1_000_000);
        assert_eq!(detector.threshold(), MAX_THRESHOLD);
    }

    #[test]
    fn rms_of_constant_signal() {
        let samples = vec![3000i16; 160];
        assert!((AmplitudeDetector::rms(&samples) - 3000.0).abs() < 1.0);
    }
}
