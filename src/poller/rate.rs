//! Counter delta to rate conversion.

use tokio::time::Instant;

/// One reading of a monotonically increasing counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub value: u64,
    pub at: Instant,
}

impl Sample {
    pub fn new(value: u64, at: Instant) -> Self {
        Self { value, at }
    }
}

/// Compute a per-second rate from two consecutive samples of a counter that
/// is `counter_bits` wide.
///
/// Returns `None` when there is no previous sample or the clock did not move
/// forward between the two. A current value below the previous one is taken
/// as exactly one wraparound; several wraps within one interval cannot be
/// told apart from one and yield an undercount.
pub fn compute_rate(prev: Option<Sample>, cur: Sample, counter_bits: u32) -> Option<u64> {
    let prev = prev?;
    let elapsed = cur.at.checked_duration_since(prev.at)?.as_secs_f64();
    if elapsed <= 0.0 {
        return None;
    }

    let delta = counter_delta(prev.value, cur.value, counter_bits)?;
    Some((delta as f64 / elapsed) as u64)
}

/// Difference between two counter readings, correcting for a single wrap.
///
/// Returns `None` if `prev` does not fit in `counter_bits`, since no single
/// wrap can explain the drop.
pub fn counter_delta(prev: u64, cur: u64, counter_bits: u32) -> Option<u64> {
    if cur >= prev {
        return Some(cur - prev);
    }

    let modulus = 1u128 << counter_bits.min(64);
    (u128::from(cur) + modulus)
        .checked_sub(u128::from(prev))
        .and_then(|delta| u64::try_from(delta).ok())
}
