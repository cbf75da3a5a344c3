use std::time::Duration;

use qdrill_core::runner::PhaseStats;

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

/// Compact elapsed time: `1.52s`, `84.10ms`, `950us`.
pub(crate) fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs >= 1.0 {
        return format!("{secs:.2}s");
    }
    if d.as_micros() >= 1000 {
        return format!("{:.2}ms", secs * 1000.0);
    }
    format!("{}us", d.as_micros())
}

fn opt_or_na(v: Option<f64>, fmt: impl Fn(f64) -> String) -> String {
    v.map_or_else(|| "n/a".to_string(), fmt)
}

/// `send: 1.52s (657 per sec ~ 1.52 ms/req)`
pub(crate) fn phase_line(stats: &PhaseStats) -> String {
    format!(
        "{}: {} ({} per sec ~ {} ms/req)",
        stats.phase,
        format_elapsed(stats.elapsed),
        opt_or_na(stats.rate, format_rate),
        opt_or_na(stats.avg_latency_ms, |ms| format!("{ms:.2}")),
    )
}
