use std::time::Duration;

/// Computes the delay before retrying after `attempt` (1-based).
///
/// `min * 2^attempt`, capped at `max`. With a 250 ms minimum this yields
/// 500 ms, 1 s, 2 s, ... until the cap.
pub fn delay_for_attempt(attempt: usize, min: Duration, max: Duration) -> Duration {
    let exp = attempt.min(127) as u32;
    let delay_ns = min.as_nanos().saturating_mul(1u128 << exp);
    if delay_ns >= max.as_nanos() {
        return max;
    }
    // Below `max`, so the whole-second part fits in u64.
    Duration::new(
        (delay_ns / NANOS_PER_SEC) as u64,
        (delay_ns % NANOS_PER_SEC) as u32,
    )
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Sleeps for [`delay_for_attempt`].
pub(crate) async fn wait_for_attempt(attempt: usize, min: Duration, max: Duration) {
    tokio::time::sleep(delay_for_attempt(attempt, min, max)).await;
}
