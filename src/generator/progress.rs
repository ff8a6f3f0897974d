//! Cosmetic progress ramps.
//!
//! These run after the endpoint has already answered. They pace the UI and
//! say nothing about work happening on the server.

use std::time::Duration;

pub const RAMP_STEPS: u32 = 20;

/// Walks progress from `start` to `end` in [`RAMP_STEPS`] equal ticks spread
/// over `duration`. Intermediate ticks report the floored value; the last
/// tick always reports exactly `end`.
pub async fn ramp<P>(on_progress: &mut P, start: u8, end: u8, duration: Duration)
where
    P: FnMut(u8, Option<&str>) + Send,
{
    let delay = duration / RAMP_STEPS;
    let increment = f64::from(end.saturating_sub(start)) / f64::from(RAMP_STEPS);

    for step in 1..=RAMP_STEPS {
        tokio::time::sleep(delay).await;

        let current = f64::from(start) + increment * f64::from(step);
        if current >= f64::from(end) || step == RAMP_STEPS {
            on_progress(end, None);
            return;
        }
        on_progress(current.floor() as u8, None);
    }
}
