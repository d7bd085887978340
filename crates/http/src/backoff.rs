//! Retry-delay policies for transient failures.
//!
//! A [`BackOff`] computes successive delays for one logical call and reports
//! stop once its budget is spent. Instances carry mutable state and must not
//! be shared across concurrent calls; executors take a factory and build one
//! per call.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::clock::{Clock, SystemClock};

/// Invalid backoff configuration.
#[derive(Debug, Error)]
#[error("invalid backoff configuration: {message}")]
pub struct BackOffConfigError {
    message: String,
}

/// Pluggable retry-delay policy.
///
/// `None` from [`next_backoff`](BackOff::next_backoff) means stop retrying.
pub trait BackOff: Send {
    /// Compute the delay before the next retry, or `None` to stop.
    fn next_backoff(&mut self) -> Option<Duration>;

    /// Reset to the initial state, for reuse on an independent logical call.
    fn reset(&mut self);
}

/// Policy that never allows a retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopBackOff;

impl BackOff for StopBackOff {
    fn next_backoff(&mut self) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}
}

/// Constant delay with a bounded number of retries.
#[derive(Debug, Clone)]
pub struct FixedBackOff {
    delay: Duration,
    max_retries: u32,
    taken: u32,
}

impl FixedBackOff {
    pub fn new(delay: Duration, max_retries: u32) -> Self {
        Self { delay, max_retries, taken: 0 }
    }
}

impl BackOff for FixedBackOff {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.taken >= self.max_retries {
            return None;
        }
        self.taken += 1;
        Some(self.delay)
    }

    fn reset(&mut self) {
        self.taken = 0;
    }
}

/// Exponential backoff with randomization, an interval cap, and a total
/// elapsed-time budget.
///
/// Each delay is drawn uniformly from
/// `[interval * (1 - randomization), interval * (1 + randomization))`, after
/// which the interval grows by `multiplier` up to `max_interval`. Once the
/// elapsed time since the last reset exceeds `max_elapsed`, the policy stops.
///
/// The jitter source is a linear congruential generator; a fixed seed yields
/// a fully deterministic delay sequence.
pub struct ExponentialBackOff {
    initial_interval: Duration,
    randomization_factor: f64,
    multiplier: f64,
    max_interval: Duration,
    max_elapsed: Duration,
    clock: Box<dyn Clock>,

    current_interval: Duration,
    start_time: Instant,
    rng_state: u64,
    seed: u64,
}

impl ExponentialBackOff {
    /// Default initial retry interval.
    pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);
    /// Default randomization factor applied to every interval.
    pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;
    /// Default growth multiplier.
    pub const DEFAULT_MULTIPLIER: f64 = 1.5;
    /// Default cap on a single interval.
    pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60);
    /// Default total retry budget.
    pub const DEFAULT_MAX_ELAPSED: Duration = Duration::from_secs(900);

    /// Create a policy with the default parameters and the system clock.
    pub fn new() -> Self {
        // Seed from the wall clock; tests use an explicit seed instead.
        let seed = SystemClock.secs_since_epoch().wrapping_mul(0x9E37_79B9_7F4A_7C15);
        ExponentialBackOffBuilder::new().seed(seed).build_unchecked()
    }

    pub fn builder() -> ExponentialBackOffBuilder {
        ExponentialBackOffBuilder::new()
    }

    /// Elapsed time since construction or the last [`reset`](BackOff::reset).
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.start_time)
    }

    // LCG step, constants from Numerical Recipes.
    fn next_random_unit(&mut self) -> f64 {
        self.rng_state = self.rng_state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        // Use the high 53 bits for a uniform value in [0, 1).
        (self.rng_state >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl Default for ExponentialBackOff {
    fn default() -> Self {
        Self::new()
    }
}

impl BackOff for ExponentialBackOff {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.elapsed() > self.max_elapsed {
            return None;
        }

        let interval_ms = self.current_interval.as_secs_f64() * 1000.0;
        let delta = self.randomization_factor * interval_ms;
        let lower = interval_ms - delta;
        let randomized_ms = lower + self.next_random_unit() * (2.0 * delta);

        // Grow the interval for the next call, capped.
        let grown = self.current_interval.as_secs_f64() * self.multiplier;
        self.current_interval = if grown >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(grown)
        };

        Some(Duration::from_secs_f64(randomized_ms / 1000.0))
    }

    fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.start_time = self.clock.now();
        self.rng_state = self.seed;
    }
}

/// Builder for [`ExponentialBackOff`] with validation.
pub struct ExponentialBackOffBuilder {
    initial_interval: Duration,
    randomization_factor: f64,
    multiplier: f64,
    max_interval: Duration,
    max_elapsed: Duration,
    seed: u64,
    clock: Box<dyn Clock>,
}

impl ExponentialBackOffBuilder {
    pub fn new() -> Self {
        Self {
            initial_interval: ExponentialBackOff::DEFAULT_INITIAL_INTERVAL,
            randomization_factor: ExponentialBackOff::DEFAULT_RANDOMIZATION_FACTOR,
            multiplier: ExponentialBackOff::DEFAULT_MULTIPLIER,
            max_interval: ExponentialBackOff::DEFAULT_MAX_INTERVAL,
            max_elapsed: ExponentialBackOff::DEFAULT_MAX_ELAPSED,
            seed: 0,
            clock: Box::new(SystemClock),
        }
    }

    pub fn initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn max_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_elapsed = elapsed;
        self
    }

    /// Seed for the jitter generator. A fixed seed gives a deterministic
    /// delay sequence.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Clock used for elapsed-time accounting.
    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn build(self) -> Result<ExponentialBackOff, BackOffConfigError> {
        if self.multiplier < 1.0 {
            return Err(BackOffConfigError { message: "multiplier must be >= 1.0".into() });
        }
        if !(0.0..1.0).contains(&self.randomization_factor) {
            return Err(BackOffConfigError {
                message: "randomization factor must be in [0, 1)".into(),
            });
        }
        if self.initial_interval.is_zero() {
            return Err(BackOffConfigError { message: "initial interval must be non-zero".into() });
        }
        Ok(self.build_unchecked())
    }

    fn build_unchecked(self) -> ExponentialBackOff {
        let start_time = self.clock.now();
        ExponentialBackOff {
            initial_interval: self.initial_interval,
            randomization_factor: self.randomization_factor,
            multiplier: self.multiplier,
            max_interval: self.max_interval,
            max_elapsed: self.max_elapsed,
            current_interval: self.initial_interval,
            start_time,
            rng_state: self.seed,
            seed: self.seed,
            clock: self.clock,
        }
    }
}

impl Default for ExponentialBackOffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for backoff policies.
    use super::*;
    use crate::clock::MockClock;

    #[test]
    fn stop_backoff_never_retries() {
        let mut backoff = StopBackOff;
        assert_eq!(backoff.next_backoff(), None);
    }

    #[test]
    fn fixed_backoff_bounded() {
        let mut backoff = FixedBackOff::new(Duration::from_millis(10), 2);
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_backoff(), None);

        backoff.reset();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(10)));
    }

    /// Validates the deterministic jitter scenario: two policies built with
    /// the same seed produce identical delay sequences.
    #[test]
    fn exponential_backoff_deterministic_with_seed() {
        let make = || {
            ExponentialBackOff::builder()
                .seed(42)
                .build()
                .unwrap()
        };
        let mut a = make();
        let mut b = make();

        for _ in 0..20 {
            assert_eq!(a.next_backoff(), b.next_backoff());
        }
    }

    #[test]
    fn exponential_backoff_delays_within_randomization_bounds() {
        let mut backoff = ExponentialBackOff::builder()
            .initial_interval(Duration::from_millis(500))
            .randomization_factor(0.5)
            .multiplier(1.5)
            .seed(7)
            .build()
            .unwrap();

        let mut expected_interval_ms = 500.0;
        for _ in 0..10 {
            let delay = backoff.next_backoff().unwrap();
            let lower = expected_interval_ms * 0.5;
            let upper = expected_interval_ms * 1.5;
            let ms = delay.as_secs_f64() * 1000.0;
            assert!(ms >= lower && ms < upper, "delay {ms}ms outside [{lower}, {upper})");
            expected_interval_ms = (expected_interval_ms * 1.5).min(60_000.0);
        }
    }

    #[test]
    fn exponential_backoff_interval_caps_at_max() {
        let mut backoff = ExponentialBackOff::builder()
            .initial_interval(Duration::from_millis(500))
            .randomization_factor(0.0)
            .multiplier(2.0)
            .max_interval(Duration::from_secs(2))
            .seed(1)
            .build()
            .unwrap();

        let mut last = Duration::ZERO;
        for _ in 0..10 {
            last = backoff.next_backoff().unwrap();
        }
        assert_eq!(last, Duration::from_secs(2));
    }

    /// Validates the STOP-after-budget scenario with a mock clock: default
    /// parameters must report stop once 15 minutes have elapsed.
    #[test]
    fn exponential_backoff_stops_after_max_elapsed() {
        let clock = MockClock::new();
        let mut backoff = ExponentialBackOff::builder()
            .seed(3)
            .clock(clock.clone())
            .build()
            .unwrap();

        assert!(backoff.next_backoff().is_some());

        clock.advance(Duration::from_secs(901));
        assert_eq!(backoff.next_backoff(), None);

        // Reset restarts the budget and the jitter sequence.
        backoff.reset();
        assert!(backoff.next_backoff().is_some());
    }

    #[test]
    fn builder_rejects_bad_configuration() {
        assert!(ExponentialBackOff::builder().multiplier(0.5).build().is_err());
        assert!(ExponentialBackOff::builder().randomization_factor(1.0).build().is_err());
        assert!(ExponentialBackOff::builder().initial_interval(Duration::ZERO).build().is_err());
    }
}
