use crate::domain::models::Command;

/// Step applied by one accelerate/decelerate tap, in hundredths of duty cycle.
const STEP: i16 = 2;
/// Smallest duty cycle that moves the board. Values between zero and the
/// notch are a dead zone the motors cannot hold, so the ramp never rests
/// inside it.
const NOTCH: i16 = 5;
/// Duty cycle magnitude cap.
const MAX_DUTY: i16 = 60;
/// Indicator position while stationary.
const CENTER_SEGMENT: i16 = 12;
/// Highest indicator position.
const MAX_SEGMENT: i16 = 24;

/// Maps repeated accelerate/decelerate/stop taps to a bounded signed duty
/// cycle and a discrete indicator position.
///
/// The duty cycle is kept in integer hundredths so the notch and snap cases
/// compare exactly. The indicator segment and the legacy speed scalar are
/// projections of the duty cycle, never stored separately.
#[derive(Debug, Clone, Copy, Default)]
pub struct RampEngine {
    duty: i16,
}

impl RampEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// One accelerate tap. From rest the duty cycle jumps straight to the
    /// positive notch; from the single reverse notch it snaps back to zero
    /// instead of ramping through the dead zone.
    pub fn accelerate(&mut self) -> Command {
        self.duty = match self.duty {
            0 => NOTCH,
            d if d < 0 && d >= -NOTCH => 0,
            d => {
                let next = (d + STEP).min(MAX_DUTY);
                // stepping up out of reverse must not land in the dead zone
                if next > -NOTCH && next < 0 {
                    -NOTCH
                } else {
                    next
                }
            }
        };
        Command::Accelerate
    }

    /// One decelerate tap, the mirror image of [`accelerate`](Self::accelerate).
    pub fn decelerate(&mut self) -> Command {
        self.duty = match self.duty {
            0 => -NOTCH,
            d if d > 0 && d <= NOTCH => 0,
            d => {
                let next = (d - STEP).max(-MAX_DUTY);
                if next > 0 && next < NOTCH {
                    NOTCH
                } else {
                    next
                }
            }
        };
        Command::Decelerate
    }

    /// Confirmed emergency stop: back to rest unconditionally.
    pub fn stop(&mut self) -> Command {
        self.duty = 0;
        Command::Stop
    }

    pub fn reset(&mut self) {
        self.duty = 0;
    }

    /// Signed duty cycle in hundredths, within [-60, 60].
    pub fn duty_hundredths(&self) -> i16 {
        self.duty
    }

    /// Signed duty cycle as a fraction, within [-0.6, 0.6].
    pub fn duty_cycle(&self) -> f32 {
        f32::from(self.duty) / 100.0
    }

    /// Indicator position in [0, 24], center 12. Zero duty maps to the
    /// center and nothing else does; past the point where the indicator
    /// saturates the duty cycle keeps climbing on its own.
    pub fn segment(&self) -> u8 {
        let offset = match self.duty {
            0 => 0,
            d => {
                let steps = 1 + (d.abs() - NOTCH) / STEP;
                if d > 0 {
                    steps
                } else {
                    -steps
                }
            }
        };
        (CENTER_SEGMENT + offset).clamp(0, MAX_SEGMENT) as u8
    }

    /// Legacy telemetry scalar: duty cycle magnitude in hundredths.
    pub fn speed(&self) -> u32 {
        u32::from(self.duty.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(engine: &RampEngine) {
        let duty = engine.duty_hundredths();
        assert!((-60..=60).contains(&duty), "duty out of range: {duty}");
        let segment = engine.segment();
        assert!(segment <= 24, "segment out of range: {segment}");
        assert_eq!(duty == 0, segment == 12, "duty {duty} vs segment {segment}");
    }

    #[test]
    fn starts_at_rest() {
        let engine = RampEngine::new();
        assert_eq!(engine.duty_hundredths(), 0);
        assert_eq!(engine.segment(), 12);
        assert_eq!(engine.speed(), 0);
    }

    #[test]
    fn first_accelerate_jumps_the_dead_zone() {
        let mut engine = RampEngine::new();
        assert_eq!(engine.accelerate(), Command::Accelerate);
        assert_eq!(engine.duty_hundredths(), 5);
        assert_eq!(engine.segment(), 13);
    }

    #[test]
    fn first_decelerate_jumps_the_dead_zone_in_reverse() {
        let mut engine = RampEngine::new();
        assert_eq!(engine.decelerate(), Command::Decelerate);
        assert_eq!(engine.duty_hundredths(), -5);
        assert_eq!(engine.segment(), 11);
    }

    #[test]
    fn accelerate_then_decelerate_returns_to_rest() {
        let mut engine = RampEngine::new();
        engine.accelerate();
        engine.decelerate();
        assert_eq!(engine.duty_hundredths(), 0);
        assert_eq!(engine.segment(), 12);
    }

    #[test]
    fn decelerate_then_accelerate_returns_to_rest() {
        let mut engine = RampEngine::new();
        engine.decelerate();
        engine.accelerate();
        assert_eq!(engine.duty_hundredths(), 0);
        assert_eq!(engine.segment(), 12);
    }

    #[test]
    fn thirty_accelerates_saturate() {
        let mut engine = RampEngine::new();
        for _ in 0..30 {
            engine.accelerate();
            assert_invariants(&engine);
        }
        assert_eq!(engine.duty_hundredths(), 60);
        assert_eq!(engine.duty_cycle(), 0.6);
        assert_eq!(engine.segment(), 24);
        assert_eq!(engine.speed(), 60);
    }

    #[test]
    fn ramp_down_from_saturation_reaches_rest() {
        let mut engine = RampEngine::new();
        for _ in 0..30 {
            engine.accelerate();
        }
        let mut taps = 0;
        while engine.duty_hundredths() != 0 {
            engine.decelerate();
            assert_invariants(&engine);
            taps += 1;
            assert!(taps < 100, "decelerating never reached rest");
        }
        assert_eq!(engine.segment(), 12);
    }

    #[test]
    fn stop_forces_rest_from_anywhere() {
        let mut engine = RampEngine::new();
        for _ in 0..7 {
            engine.accelerate();
        }
        assert_eq!(engine.stop(), Command::Stop);
        assert_eq!(engine.duty_hundredths(), 0);
        assert_eq!(engine.segment(), 12);

        for _ in 0..4 {
            engine.decelerate();
        }
        engine.stop();
        assert_eq!(engine.duty_hundredths(), 0);
        assert_eq!(engine.segment(), 12);
    }

    #[test]
    fn invariants_hold_for_mixed_sequences() {
        let mut engine = RampEngine::new();
        // Long alternating pattern that crosses the center and both limits.
        for round in 0..200usize {
            match round % 7 {
                0 | 1 | 2 | 3 => engine.accelerate(),
                4 | 5 => engine.decelerate(),
                _ => engine.stop(),
            };
            assert_invariants(&engine);
        }
        for _ in 0..80 {
            engine.decelerate();
            assert_invariants(&engine);
        }
        assert_eq!(engine.duty_hundredths(), -60);
        assert_eq!(engine.segment(), 0);
    }
}
