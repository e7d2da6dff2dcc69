//! Level-dependent stages: soft limiter and envelope follower.

use crate::constants::{ENVELOPE_ATTACK, ENVELOPE_DECAY};
use crate::fixed_point::{Q15, Q15_ONE, q15_abs};

/// Two-segment soft limiter.
///
/// Samples below the knee pass unchanged; above it the slope drops to 1/2.
/// The knee sits at `2 * ceiling - full scale`, so a full-scale input lands
/// exactly on the ceiling and the output magnitude never exceeds it.
#[derive(Debug, Clone, Copy)]
pub struct SoftLimiter {
    ceiling: i32,
    knee: i32,
}

impl SoftLimiter {
    pub fn new(ceiling: Q15) -> Self {
        let ceiling = (ceiling as i32).max(0);
        Self {
            ceiling,
            knee: (2 * ceiling - Q15_ONE).max(0),
        }
    }

    pub fn ceiling(&self) -> Q15 {
        self.ceiling as Q15
    }

    #[inline]
    pub fn process(&self, x: Q15) -> Q15 {
        let mag = (x as i32).abs();
        if mag <= self.knee {
            return x;
        }
        let limited = (self.knee + (mag - self.knee) / 2).min(self.ceiling);
        if x < 0 { -limited as Q15 } else { limited as Q15 }
    }
}

/// Fast-attack, slow-decay follower of `|x|`.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    state: i64,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level in Q15.
    pub fn level(&self) -> Q15 {
        (self.state >> 15) as Q15
    }

    #[inline]
    pub fn update(&mut self, x: Q15) -> Q15 {
        let mag = q15_abs(x) as i64;
        let memory = if mag > self.level() as i64 {
            ENVELOPE_ATTACK
        } else {
            ENVELOPE_DECAY
        } as i64;
        self.state = ((memory * self.state) >> 15) + (Q15_ONE as i64 - memory) * mag;
        self.level()
    }

    pub fn reset(&mut self) {
        self.state = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FM_AUDIO_LIMIT;

    #[test]
    fn test_limiter_passes_below_knee() {
        let limiter = SoftLimiter::new(FM_AUDIO_LIMIT);
        for x in [-20000, -1, 0, 1, 12345, 26000] {
            assert_eq!(limiter.process(x), x);
        }
    }

    #[test]
    fn test_limiter_never_exceeds_ceiling() {
        let limiter = SoftLimiter::new(FM_AUDIO_LIMIT);
        for x in (i16::MIN..=i16::MAX).step_by(7) {
            let y = limiter.process(x);
            assert!(
                (y as i32).abs() <= FM_AUDIO_LIMIT as i32,
                "{} -> {} exceeds ceiling",
                x,
                y
            );
        }
        assert_eq!(limiter.process(i16::MIN), -FM_AUDIO_LIMIT);
        assert!(limiter.process(i16::MAX) >= FM_AUDIO_LIMIT - 1);
    }

    #[test]
    fn test_limiter_is_monotonic() {
        let limiter = SoftLimiter::new(FM_AUDIO_LIMIT);
        let mut prev = limiter.process(i16::MIN);
        for x in i16::MIN + 1..=i16::MAX {
            let y = limiter.process(x);
            assert!(y >= prev, "not monotonic at {}", x);
            prev = y;
        }
    }

    #[test]
    fn test_low_ceiling_clamps() {
        let limiter = SoftLimiter::new(10000);
        assert_eq!(limiter.process(32767), 10000);
        assert_eq!(limiter.process(-32768), -10000);
        assert_eq!(limiter.process(4000), 2000);
    }

    #[test]
    fn test_envelope_attack_faster_than_decay() {
        let mut env = Envelope::new();
        let mut rise = 0;
        while env.update(10000) < 5000 {
            rise += 1;
        }
        let mut fall = 0;
        while env.update(0) > 5000 / 2 {
            fall += 1;
        }
        assert!(rise < 10, "attack took {} samples", rise);
        assert!(fall > 5 * rise, "decay ({}) should be much slower than attack ({})", fall, rise);
    }

    #[test]
    fn test_envelope_decays_to_zero() {
        let mut env = Envelope::new();
        for _ in 0..100 {
            env.update(-20000);
        }
        assert!(env.level() > 15000);
        for _ in 0..5000 {
            env.update(0);
        }
        assert_eq!(env.level(), 0);
    }
}
