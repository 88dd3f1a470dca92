//! Monotonic time source and bounded waits
//!
//! The drivers never read a platform clock directly. Scheduling decisions
//! run off the `now_ms` handed to `tick()`, and the two short waits the
//! protocol requires (command spacing, post-reset settling) consume an
//! injected [`Clock`]. Both counters are free-running `u32` values that are
//! expected to wrap; all comparisons go through [`time_reached`].

use crate::status::{Error, Result};

/// Free-running monotonic time source.
///
/// `now_ms` and `now_us` wrap independently at `u32::MAX`; neither needs an
/// epoch. Hosted implementations can derive both from a steady clock, a
/// bare-metal one from a hardware timer.
pub trait Clock {
    /// Milliseconds since an arbitrary origin.
    fn now_ms(&mut self) -> u32;

    /// Microseconds since an arbitrary origin.
    fn now_us(&mut self) -> u32;
}

/// Wraparound-safe "has `now` reached `target`".
///
/// Treats the signed distance between the two counters as the verdict, so
/// the answer stays correct when the counter wraps between `target` and
/// `now` (valid for distances below half the counter range).
pub fn time_reached(now: u32, target: u32) -> bool {
    now.wrapping_sub(target) as i32 >= 0
}

/// Spin iterations tolerated without the millisecond counter advancing
/// before a wait concludes the time source has stalled.
const MAX_STABLE_ITERS: u32 = 500_000;

/// Spin until `command_delay_ms` has elapsed since `last_command_us`.
///
/// Bounded two ways: a hard deadline of `command_delay_ms + i2c_timeout_ms`
/// on the wall clock, and the stalled-clock watchdog. Both expire into
/// `TIMEOUT` instead of looping forever.
pub(crate) fn ensure_command_delay<C: Clock>(
    clock: &mut C,
    last_command_us: u32,
    command_delay_ms: u16,
    i2c_timeout_ms: u32,
) -> Result<()> {
    if last_command_us == 0 {
        return Ok(());
    }

    let target_us = last_command_us.wrapping_add(u32::from(command_delay_ms) * 1000);
    let start_ms = clock.now_ms();
    let timeout_ms = u32::from(command_delay_ms) + i2c_timeout_ms;
    let mut last_ms = start_ms;
    let mut stable_loops: u32 = 0;

    while !time_reached(clock.now_us(), target_us) {
        let now_ms = clock.now_ms();
        if now_ms.wrapping_sub(start_ms) > timeout_ms {
            return Err(Error::timeout("command spacing timeout"));
        }
        if now_ms != last_ms {
            last_ms = now_ms;
            stable_loops = 0;
        } else {
            stable_loops += 1;
            if stable_loops >= MAX_STABLE_ITERS {
                return Err(Error::timeout("command spacing timeout"));
            }
        }
    }

    Ok(())
}

/// Spin for `delay_ms`, bounded like [`ensure_command_delay`].
pub(crate) fn wait_ms<C: Clock>(clock: &mut C, delay_ms: u32, i2c_timeout_ms: u32) -> Result<()> {
    if delay_ms == 0 {
        return Ok(());
    }

    let start_ms = clock.now_ms();
    let deadline = start_ms.wrapping_add(delay_ms);
    let timeout_ms = delay_ms + i2c_timeout_ms;
    let mut last_ms = start_ms;
    let mut stable_loops: u32 = 0;

    loop {
        let now_ms = clock.now_ms();
        if time_reached(now_ms, deadline) {
            return Ok(());
        }
        if now_ms.wrapping_sub(start_ms) > timeout_ms {
            return Err(Error::timeout("wait timeout"));
        }
        if now_ms != last_ms {
            last_ms = now_ms;
            stable_loops = 0;
        } else {
            stable_loops += 1;
            if stable_loops >= MAX_STABLE_ITERS {
                return Err(Error::timeout("wait timeout"));
            }
        }
    }
}
