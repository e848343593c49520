// Amplitude trigger detection: RMS thresholding and the cooldown window.

use std::time::Duration;

use whisperworks::audio::detector::{MAX_THRESHOLD, MIN_THRESHOLD};
use whisperworks::AmplitudeDetector;

fn block(amplitude: i16) -> Vec<i16> {
    vec![amplitude; 160]
}

#[tokio::test(start_paused = true)]
async fn quiet_blocks_never_trigger() {
    let detector = AmplitudeDetector::new(2000, Duration::from_secs(5));

    for amplitude in [0i16, 100, 500, 1500, 1999] {
        let det = detector.process(&block(amplitude));
        assert!(
            !det.triggered,
            "amplitude {} must not cross threshold 2000",
            amplitude
        );
    }
}

#[tokio::test(start_paused = true)]
async fn loud_block_triggers_once_per_cooldown_window() {
    let detector = AmplitudeDetector::new(2000, Duration::from_secs(5));

    assert!(detector.process(&block(3000)).triggered);

    // Sustained loud input inside the window never re-triggers.
    for _ in 0..10 {
        tokio::time::advance(Duration::from_millis(400)).await;
        assert!(!detector.process(&block(3000)).triggered);
    }

    // Past the window the next loud block fires again.
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(detector.process(&block(3000)).triggered);
}

#[tokio::test(start_paused = true)]
async fn level_is_normalized_and_clamped() {
    let detector = AmplitudeDetector::new(2000, Duration::from_secs(5));

    let quiet = detector.process(&block(1000));
    assert!((quiet.level - 0.5).abs() < 0.01);

    let loud = detector.process(&block(4000));
    assert_eq!(loud.level, 1.0);

    let silent = detector.process(&[]);
    assert_eq!(silent.level, 0.0);
    assert!(!silent.triggered);
}

#[tokio::test(start_paused = true)]
async fn threshold_update_applies_to_next_block() {
    let detector = AmplitudeDetector::new(2000, Duration::from_secs(5));

    assert!(!detector.process(&block(1500)).triggered);

    detector.set_threshold(1000);
    assert!(detector.process(&block(1500)).triggered);
}

#[tokio::test(start_paused = true)]
async fn threshold_is_clamped_to_configured_range() {
    let detector = AmplitudeDetector::new(2000, Duration::from_secs(5));

    detector.set_threshold(1);
    assert_eq!(detector.threshold(), MIN_THRESHOLD);

    detector.set_threshold(u32::MAX);
    assert_eq!(detector.threshold(), MAX_THRESHOLD);
}

#[tokio::test(start_paused = true)]
async fn metering_does_not_consume_the_cooldown() {
    let detector = AmplitudeDetector::new(2000, Duration::from_secs(5));

    // Level metering is pure; a loud metered block must not arm cooldown.
    assert_eq!(detector.level(&block(4000)), 1.0);
    assert!(detector.process(&block(4000)).triggered);
}
