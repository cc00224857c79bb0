//! Bounded retry with a fixed inter-attempt delay.
//!
//! One decision surface for the routines: an attempt yields
//! `Ok(true)` (done), `Ok(false)` (domain failure, retry), a recoverable
//! error (retry), or a fatal error (propagate immediately).

use std::time::Duration;

use anyhow::Result;

use super::AttemptError;

/// Runs `task` up to `max_attempts` times, sleeping `delay` before every
/// attempt after the first. Returns `Ok(true)` on the first success,
/// `Ok(false)` once attempts are exhausted, and `Err` as soon as a task
/// failure is not recoverable.
pub fn run_with_retry<F>(name: &str, max_attempts: u32, delay: Duration, task: F) -> Result<bool>
where
    F: FnMut() -> Result<bool, AttemptError>,
{
    run_with_sleeper(name, max_attempts, delay, task, std::thread::sleep)
}

fn run_with_sleeper<F, S>(
    name: &str,
    max_attempts: u32,
    delay: Duration,
    mut task: F,
    mut sleep: S,
) -> Result<bool>
where
    F: FnMut() -> Result<bool, AttemptError>,
    S: FnMut(Duration),
{
    for attempt in 1..=max_attempts {
        if attempt > 1 {
            log::info!("{}: delaying {:?} before retry", name, delay);
            sleep(delay);
        }
        log::info!("{}: attempt {}/{}", name, attempt, max_attempts);

        match task() {
            Ok(true) => {
                log::info!("{}: succeeded on attempt {}", name, attempt);
                return Ok(true);
            }
            Ok(false) => {
                log::warn!("{}: attempt {} reported failure", name, attempt);
            }
            Err(e) if e.is_recoverable() => {
                log::warn!("{}: attempt {} failed: {}", name, attempt, e);
            }
            Err(e) => {
                log::error!("{}: fatal failure on attempt {}: {}", name, attempt, e);
                return Err(e.into());
            }
        }
    }

    log::error!("{}: giving up after {} attempts", name, max_attempts);
    Ok(false)
}
