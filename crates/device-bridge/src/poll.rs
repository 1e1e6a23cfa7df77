//! Bounded Polling
//!
//! Repeatedly evaluates a probe until it yields a value or a deadline
//! passes. The deadline is absolute: it is anchored once by the caller
//! and never extended by slow probes.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::channel::DeviceChannel;

/// Poll `probe` until it returns a value or `deadline` is reached.
///
/// The deadline is checked before each probe, so a deadline in the
/// past means zero probes. Slow probes eat into the budget; the final
/// sleep is skipped once the deadline has passed.
pub async fn poll_until<T, F, Fut>(deadline: Instant, interval: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    loop {
        if Instant::now() >= deadline {
            return None;
        }
        if let Some(value) = probe().await {
            return Some(value);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Resolve the process ID of a freshly launched app.
///
/// Polls the device until the process appears or the deadline passes.
/// The deadline is anchored at the launch moment, not at the first
/// poll. `quiet` suppresses per-poll command echo.
pub async fn resolve_pid<C: DeviceChannel>(
    channel: &C,
    package: &str,
    deadline: Instant,
    interval: Duration,
    quiet: bool,
) -> Option<u32> {
    poll_until(deadline, interval, move || async move {
        channel.pidof(package, quiet).await
    })
    .await
}
