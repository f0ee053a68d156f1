use std::time::Instant;

/// Current instant when timing is enabled, `None` otherwise.
#[inline]
pub(crate) fn stamp(enabled: bool) -> Option<Instant> {
    enabled.then(Instant::now)
}

/// return microseconds between two instants, zero if `to` precedes `from`
pub(crate) fn elapsed_micros(
    from: Instant,
    to: Instant,
) -> f64 {
    to.saturating_duration_since(from).as_secs_f64() * 1_000_000.0
}
