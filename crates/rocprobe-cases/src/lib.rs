//! Shared reporting helpers for the regression scenario binaries.

use std::time::Instant;

use rocprobe::{DeviceTensor, Element, Result};

/// Compares a device tensor against host reference data and prints a named
/// PASS/FAIL line. A mismatch is reported with per-element detail but does
/// not fail the process; only fatal errors do.
pub fn check<T: Element, R: Element>(
    name: &str,
    actual: &DeviceTensor<T>,
    expected: &[R],
) -> Result<bool> {
    let outcome = actual.compare_host(expected, true)?;
    report(name, outcome.matches, &outcome.detail);
    Ok(outcome.matches)
}

/// Tensor-vs-tensor variant of [`check`].
pub fn check_tensor<T: Element, R: Element>(
    name: &str,
    actual: &DeviceTensor<T>,
    expected: &DeviceTensor<R>,
) -> Result<bool> {
    let outcome = actual.compare(expected, true)?;
    report(name, outcome.matches, &outcome.detail);
    Ok(outcome.matches)
}

fn report(name: &str, matches: bool, detail: &str) {
    if matches {
        eprintln!("{name} Test Passed!");
    } else {
        eprintln!("{name} Test Failed:");
        eprint!("{detail}");
    }
}

/// Microsecond stopwatch for coarse step timing.
pub struct Stopwatch {
    last: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Stopwatch {
            last: Instant::now(),
        }
    }

    /// Microseconds since the previous lap (or since start), resetting the
    /// lap point.
    pub fn lap_micros(&mut self) -> u128 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_micros();
        self.last = now;
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn laps_reset_the_reference_point() {
        let mut watch = Stopwatch::start();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let first = watch.lap_micros();
        let second = watch.lap_micros();
        assert!(first >= 2_000);
        assert!(second < first);
    }
}
