//! Randomized delays that mimic human cadence
//!
//! Delays are returned to the caller as a scheduling hint; nothing here sleeps.

use rand::Rng;
use std::time::Duration;

/// Uniform delay range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDelay {
    min: Duration,
    max: Duration,
}

impl HumanDelay {
    /// Range in whole minutes; bounds are swapped if given in the wrong order
    pub fn minutes(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min * 60), Duration::from_secs(max * 60))
    }

    /// Range in whole seconds
    pub fn seconds(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw a delay from the range
    pub fn sample(&self) -> Duration {
        self.sample_with(&mut rand::thread_rng())
    }

    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let secs = rng.gen_range(self.min.as_secs()..=self.max.as_secs());
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_within_bounds() {
        let delay = HumanDelay::minutes(5, 15);
        for _ in 0..200 {
            let d = delay.sample();
            assert!(d >= Duration::from_secs(300) && d <= Duration::from_secs(900));
        }
    }

    #[test]
    fn test_swapped_bounds() {
        let delay = HumanDelay::seconds(90, 30);
        assert_eq!(delay.min(), Duration::from_secs(30));
        assert_eq!(delay.max(), Duration::from_secs(90));
        assert_eq!(HumanDelay::seconds(7, 7).sample(), Duration::from_secs(7));
    }
}
