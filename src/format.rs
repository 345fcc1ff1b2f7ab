//! Human-readable formatting for command-line reports.

use std::time::Duration;

use crate::stats::{ActivationKind, ActivationStats, PrefetchStats};

/// Formats a byte count with binary units (B, KB, MB, GB).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(&str, u64); 3] = [("GB", 1 << 30), ("MB", 1 << 20), ("KB", 1 << 10)];

    UNITS
        .iter()
        .find(|(_, size)| bytes >= *size)
        .map_or_else(
            || format!("{bytes} B"),
            |(unit, size)| format!("{:.2} {unit}", bytes as f64 / *size as f64),
        )
}

/// Formats a short duration, switching from milliseconds to seconds at 1s.
#[must_use]
pub fn format_elapsed(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

/// One-line summary of an activation.
#[must_use]
pub fn activation_summary(stats: &ActivationStats) -> String {
    let kind = match stats.kind {
        ActivationKind::FreshInstall => "fresh install",
        ActivationKind::Upgrade => "upgrade",
    };
    format!(
        "{kind}: {} retained, {} evicted, {} promoted in {}",
        stats.retained,
        stats.evicted,
        stats.promoted,
        format_elapsed(stats.elapsed)
    )
}

/// One-line summary of an offline download.
#[must_use]
pub fn prefetch_summary(stats: &PrefetchStats) -> String {
    format!(
        "{} downloaded ({}), {} already cached",
        stats.fetched,
        format_bytes(stats.total_bytes),
        stats.skipped
    )
}
