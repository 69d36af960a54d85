//! Wall-clock measurement of units of work.

use std::fmt;
use std::time::{Duration, Instant};

/// A value together with the time it took to produce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timed<T> {
    pub value: T,
    pub elapsed: Duration,
}

impl<T> Timed<T> {
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        duration_ms(self.elapsed)
    }
}

/// The wrapped operation's error, unchanged, tagged with the time spent
/// before it failed.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedError<E> {
    pub source: E,
    pub elapsed: Duration,
}

impl<E> TimedError<E> {
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        duration_ms(self.elapsed)
    }
}

impl<E: fmt::Display> fmt::Display for TimedError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {:.2}ms)", self.source, self.elapsed_ms())
    }
}

impl<E: std::error::Error + 'static> std::error::Error for TimedError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Run `work` and measure it.  Errors are passed through untouched apart
/// from the duration tag.
pub fn timed<T, E, F>(work: F) -> Result<Timed<T>, TimedError<E>>
where
    F: FnOnce() -> Result<T, E>,
{
    let started = Instant::now();
    let outcome = work();
    let elapsed = started.elapsed();
    match outcome {
        Ok(value) => Ok(Timed { value, elapsed }),
        Err(source) => Err(TimedError { source, elapsed }),
    }
}

#[must_use]
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Operations per second: `count / (elapsed_ms / 1000)`.
///
/// Zero (or non-finite) elapsed time and zero count both yield exactly 0, as
/// does an elapsed time so small the quotient overflows.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ops_per_sec(count: u64, elapsed_ms: f64) -> f64 {
    if count == 0 || !elapsed_ms.is_finite() || elapsed_ms <= 0.0 {
        return 0.0;
    }
    let rate = count as f64 / (elapsed_ms / 1000.0);
    if rate.is_finite() { rate } else { 0.0 }
}

/// `part / whole` as a fraction, 0 when `whole` is 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64
}

/// Milliseconds since the Unix epoch; 0 if the clock is before it.
#[must_use]
pub fn unix_ms_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
