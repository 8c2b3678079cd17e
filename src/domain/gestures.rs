use std::time::{Duration, Instant};

/// Two stop taps inside the window confirm an emergency stop; a lone tap is
/// treated as accidental and expires silently.
pub struct DoublePressDetector {
    window: Duration,
    first_press: Option<Instant>,
}

impl DoublePressDetector {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            first_press: None,
        }
    }

    /// Register a stop tap at `now`. Returns true when the tap confirms the
    /// gesture, i.e. it is the second tap inside the window.
    pub fn press(&mut self, now: Instant) -> bool {
        match self.first_press {
            Some(first) if now.saturating_duration_since(first) <= self.window => {
                self.first_press = None;
                true
            }
            _ => {
                // First tap, or the previous one already expired: arm a new window.
                self.first_press = Some(now);
                false
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        self.first_press.is_some()
    }

    pub fn reset(&mut self) {
        self.first_press = None;
    }
}
