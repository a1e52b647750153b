//! Per-identity sliding-window flood counter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timestamps of recently accepted user-originated messages, bounded to
/// the suppression window.
#[derive(Debug, Default)]
pub struct RateWindow {
    stamps: VecDeque<Instant>,
}

impl RateWindow {
    /// Admit or reject one message at `now`.
    ///
    /// Stamps older than the window are dropped first. A rejected message
    /// is not recorded, so a flooding peer cannot push its own window
    /// forward.
    pub fn try_admit(&mut self, now: Instant, window: Duration, limit: usize) -> bool {
        while let Some(&front) = self.stamps.front() {
            if now.duration_since(front) > window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
        if self.stamps.len() >= limit {
            return false;
        }
        self.stamps.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn admits_up_to_the_limit() {
        let mut w = RateWindow::default();
        let now = Instant::now();
        for _ in 0..30 {
            assert!(w.try_admit(now, WINDOW, 30));
        }
        assert!(!w.try_admit(now, WINDOW, 30));
    }

    #[test]
    fn rejection_does_not_consume_a_slot() {
        let mut w = RateWindow::default();
        let now = Instant::now();
        for _ in 0..30 {
            assert!(w.try_admit(now, WINDOW, 30));
        }
        for _ in 0..10 {
            assert!(!w.try_admit(now, WINDOW, 30));
        }
        // Once the old stamps age out, exactly `limit` slots come back.
        let later = now + Duration::from_secs(61);
        for _ in 0..30 {
            assert!(w.try_admit(later, WINDOW, 30));
        }
        assert!(!w.try_admit(later, WINDOW, 30));
    }

    #[test]
    fn old_stamps_age_out_incrementally() {
        let mut w = RateWindow::default();
        let start = Instant::now();
        for i in 0..30 {
            assert!(w.try_admit(start + Duration::from_secs(i), WINDOW, 30));
        }
        // t = 29: window full.
        assert!(!w.try_admit(start + Duration::from_secs(29), WINDOW, 30));
        // t = 61: the stamp from t = 0 has aged out.
        assert!(w.try_admit(start + Duration::from_secs(61), WINDOW, 30));
    }
}
