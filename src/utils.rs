use std::time::{Duration, Instant};

/// Render a duration with two decimals and a scaled unit, e.g. `1.94ms` or `3.12s`.
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// Warn when a request to the portal took longer than `threshold`.
///
/// Timed enrollment is only useful if the request lands within a few
/// hundred milliseconds of opening, so slow calls are worth surfacing.
pub fn log_if_slow(start: Instant, threshold: Duration, label: &str) {
    let elapsed = start.elapsed();
    if elapsed > threshold {
        tracing::warn!(
            duration = fmt_duration(elapsed),
            threshold = fmt_duration(threshold),
            "Slow portal call: {label}"
        );
    }
}
