//! Per-bar peak hold with hold time and linear dB decay.

use std::time::Duration;

/// Peak hold state for every bar.
///
/// A magnitude at or above the held peak resets the peak and restarts its
/// hold timer. Otherwise the peak stays put for `hold_time`, then falls at
/// `decay_db_per_sec`, never below the current magnitude or the floor.
#[derive(Debug, Clone)]
pub struct PeakHold {
    peaks: Vec<f32>,
    held: Vec<f32>,
    decay_db_per_sec: f32,
    hold_secs: f32,
    floor_db: f32,
}

impl PeakHold {
    /// Creates peak state for `bars` bars, all resting at the floor.
    pub fn new(bars: usize, decay_db_per_sec: f32, hold_time: Duration, floor_db: f32) -> Self {
        Self {
            peaks: vec![floor_db; bars],
            held: vec![0.0; bars],
            decay_db_per_sec,
            hold_secs: hold_time.as_secs_f32(),
            floor_db,
        }
    }

    /// Changes the decay rate and hold time, keeping the held peaks.
    pub fn set_timing(&mut self, decay_db_per_sec: f32, hold_time: Duration) {
        self.decay_db_per_sec = decay_db_per_sec;
        self.hold_secs = hold_time.as_secs_f32();
    }

    /// Advances the state by `elapsed` and folds in the current magnitudes.
    pub fn update(&mut self, current: &[f32], elapsed: Duration) {
        let dt = elapsed.as_secs_f32();

        for ((peak, held), &value) in self.peaks.iter_mut().zip(&mut self.held).zip(current) {
            if value >= *peak {
                *peak = value;
                *held = 0.0;
                continue;
            }

            let before = *held;
            *held += dt;
            let decaying = (*held - self.hold_secs.max(before)).max(0.0);
            *peak -= self.decay_db_per_sec * decaying;
            *peak = peak.max(value).max(self.floor_db);
        }
    }

    /// Held peaks in dB, one per bar.
    pub fn peaks(&self) -> &[f32] {
        &self.peaks
    }

    /// Drops every peak back to the floor.
    pub fn reset(&mut self) {
        self.peaks.fill(self.floor_db);
        self.held.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: Duration = Duration::from_millis(100);

    #[test]
    fn test_peak_tracks_rising_signal() {
        let mut hold = PeakHold::new(2, 20.0, Duration::ZERO, -100.0);
        hold.update(&[-30.0, -10.0], STEP);
        assert_eq!(hold.peaks(), &[-30.0, -10.0]);
    }

    #[test]
    fn test_decays_at_configured_rate() {
        let mut hold = PeakHold::new(1, 20.0, Duration::ZERO, -100.0);
        hold.update(&[0.0], STEP);
        hold.update(&[-90.0], STEP);
        assert!((hold.peaks()[0] - -2.0).abs() < 1e-4);
        hold.update(&[-90.0], STEP);
        assert!((hold.peaks()[0] - -4.0).abs() < 1e-4);
    }

    #[test]
    fn test_never_below_current() {
        let mut hold = PeakHold::new(1, 1000.0, Duration::ZERO, -100.0);
        hold.update(&[0.0], STEP);
        hold.update(&[-6.0], STEP);
        assert_eq!(hold.peaks()[0], -6.0);
    }

    #[test]
    fn test_hold_time_delays_decay() {
        let mut hold = PeakHold::new(1, 10.0, Duration::from_millis(250), -100.0);
        hold.update(&[0.0], STEP);

        hold.update(&[-50.0], STEP); // held 100ms
        hold.update(&[-50.0], STEP); // held 200ms
        assert_eq!(hold.peaks()[0], 0.0);

        hold.update(&[-50.0], STEP); // held 300ms, 50ms of decay
        assert!((hold.peaks()[0] - -0.5).abs() < 1e-4);

        hold.update(&[-50.0], STEP); // full step of decay
        assert!((hold.peaks()[0] - -1.5).abs() < 1e-4);
    }

    #[test]
    fn test_converges_to_floor_under_silence() {
        let mut hold = PeakHold::new(1, 20.0, Duration::ZERO, -100.0);
        hold.update(&[0.0], STEP);
        for _ in 0..100 {
            hold.update(&[-100.0], STEP);
        }
        assert_eq!(hold.peaks()[0], -100.0);
    }

    #[test]
    fn test_reset() {
        let mut hold = PeakHold::new(3, 20.0, Duration::ZERO, -80.0);
        hold.update(&[0.0, -10.0, -20.0], STEP);
        hold.reset();
        assert!(hold.peaks().iter().all(|&p| p == -80.0));
    }
}
