//! Exponential backoff with multiplicative jitter, and a generic retry loop
//! built on top of it.
//!
//! Grounded on the original Go `sender/retry/exponential.go` and
//! `sender/retry/retry.go`.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::constants;

/// Exponential backoff: each `next()` returns a duration uniformly sampled
/// from `current * (1 ± randomization_factor)`, then grows `current` by
/// `multiplier`.
pub struct ExpBackOff {
    initial_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    current_interval: Duration,
    retry_count: usize,
}

impl Default for ExpBackOff {
    fn default() -> Self {
        ExpBackOff {
            initial_interval: constants::DEFAULT_INITIAL_INTERVAL,
            multiplier: constants::DEFAULT_MULTIPLIER,
            randomization_factor: constants::DEFAULT_RANDOMIZATION_FACTOR,
            current_interval: constants::DEFAULT_INITIAL_INTERVAL,
            retry_count: 0,
        }
    }
}

impl ExpBackOff {
    pub fn new(initial_interval: Duration, multiplier: f64, randomization_factor: f64) -> ExpBackOff {
        ExpBackOff {
            initial_interval,
            multiplier,
            randomization_factor,
            current_interval: initial_interval,
            retry_count: 0,
        }
    }

    pub fn retry_count(&self) -> usize {
        self.retry_count
    }

    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.retry_count = 0;
    }

    /// Sample the next wait duration, then grow `current_interval`.
    pub fn next(&mut self) -> Duration {
        let wait = random_value_from_interval(self.randomization_factor, rand::thread_rng().gen::<f64>(), self.current_interval);
        self.current_interval = self.current_interval.mul_f64(self.multiplier);
        self.retry_count += 1;
        wait
    }
}

fn random_value_from_interval(randomization_factor: f64, random: f64, current_interval: Duration) -> Duration {
    let current = current_interval.as_secs_f64();
    let delta = randomization_factor * current;
    let min_interval = current - delta;
    let max_interval = current + delta;
    let value = min_interval + random * (max_interval - min_interval);
    Duration::from_secs_f64(value.max(0.0))
}

/// Reset `backoff`, then call `fn` up to `n` times, sleeping `backoff.next()`
/// between failed attempts. Returns the last error, if every attempt failed.
pub async fn retry<T, E, F, Fut>(n: usize, backoff: &mut ExpBackOff, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    backoff.reset();
    let mut last_err = None;

    for attempt in 0..n {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < n {
                    tokio::time::sleep(backoff.next()).await;
                }
            }
        }
    }

    Err(last_err.expect("n must be > 0"))
}
