//! Politeness delay between consecutive requests to a catalog site

use rand::Rng;
use std::time::Duration;

pub const DEFAULT_MIN_DELAY_MS: u64 = 2000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 3000;

pub trait Pause {
    fn pause(&mut self);
}

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Sleeps a uniformly random duration in `[min, max]` on every pause
pub struct Throttle<S = ThreadSleeper> {
    min: Duration,
    max: Duration,
    sleeper: S,
}

impl Throttle<ThreadSleeper> {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self::with_sleeper(min, max, ThreadSleeper)
    }
}

impl<S: Sleeper> Throttle<S> {
    pub fn with_sleeper(min: Duration, max: Duration, sleeper: S) -> Self {
        Self { min, max, sleeper }
    }

    pub fn next_delay(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    #[cfg(test)]
    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }
}

impl<S: Sleeper> Pause for Throttle<S> {
    fn pause(&mut self) {
        let delay = self.next_delay();
        self.sleeper.sleep(delay);
    }
}

/// Records requested sleeps instead of sleeping
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSleeper {
    pub sleeps: Vec<Duration>,
}

#[cfg(test)]
impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_stay_within_bounds() {
        let min = Duration::from_millis(2000);
        let max = Duration::from_millis(3000);
        let mut throttle = Throttle::with_sleeper(min, max, RecordingSleeper::default());
        for _ in 0..200 {
            throttle.pause();
        }
        let sleeps = &throttle.sleeper().sleeps;
        assert_eq!(sleeps.len(), 200);
        assert!(sleeps.iter().all(|d| *d >= min && *d <= max));
    }

    #[test]
    fn test_degenerate_bounds_use_min() {
        let d = Duration::from_millis(500);
        let throttle = Throttle::with_sleeper(d, d, RecordingSleeper::default());
        assert_eq!(throttle.next_delay(), d);
    }
}
