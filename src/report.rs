//! Terminal rendering for history listings, per-session reports, and the
//! post-capture summary. Nothing here feeds back into the engine.

use chrono::DateTime;
use colored::Colorize;

use crate::downloader::CaptureSummary;
use crate::store::{SessionReport, SessionSummary};

/// `1536` → `"1.50 KB"`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GB", b / GB)
    } else if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.2} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

/// `9500` → `"9.50s"`, sub-second values stay in milliseconds.
pub fn format_duration_ms(ms: i64) -> String {
    if ms >= 60_000 {
        format!("{}m {:.1}s", ms / 60_000, (ms % 60_000) as f64 / 1000.0)
    } else if ms >= 1000 {
        format!("{:.2}s", ms as f64 / 1000.0)
    } else {
        format!("{ms} ms")
    }
}

fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

/// All sessions, most recent first.
pub fn print_history(sessions: &[SessionSummary]) {
    if sessions.is_empty() {
        println!("{}", "no capture history".yellow());
        return;
    }
    println!(
        "{:>4}  {:<28}  {:<19}  {:>10}  {:>12}",
        "ID", "Site", "Started", "Duration", "Size"
    );
    for s in sessions {
        let duration = s
            .elapsed_ms
            .map(format_duration_ms)
            .unwrap_or_else(|| "-".into());
        let size = s
            .total_kb
            .map(|kb| format!("{kb:.2} KB"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:>4}  {:<28}  {:<19}  {:>10}  {:>12}",
            s.id,
            truncate(&s.name, 28),
            format_timestamp(s.started_at),
            duration,
            size
        );
    }
}

/// One session plus every resource record it produced.
pub fn print_report(report: &SessionReport) {
    let s = &report.session;
    println!("{}", format!("capture #{} — {}", s.id, s.name).bold());
    println!("  started   {}", format_timestamp(s.started_at));
    match s.ended_at {
        Some(end) => println!("  ended     {}", format_timestamp(end)),
        None => println!("  ended     {}", "never finalized".red()),
    }
    if let Some(ms) = s.elapsed_ms {
        println!("  duration  {}", format_duration_ms(ms).yellow());
    }
    if let Some(kb) = s.total_kb {
        println!("  size      {}", format!("{kb:.2} KB").green());
    }
    println!("  resources {}", report.resources.len());

    if report.resources.is_empty() {
        println!("  {}", "no resources recorded".yellow());
        return;
    }
    println!();
    println!("  {:<56}  {:>10}  {:>12}", "Resource", "Duration", "Size");
    for r in &report.resources {
        println!(
            "  {:<56}  {:>10}  {:>12}",
            truncate(&r.url, 56),
            format_duration_ms(r.elapsed_ms),
            format!("{:.2} KB", r.size_kb)
        );
    }
}

/// Post-capture summary block printed by the `download` command.
pub fn print_summary(summary: &CaptureSummary) {
    let elapsed_ms = summary.elapsed.as_millis() as i64;
    let speed = if elapsed_ms > 0 {
        (summary.total_bytes as f64 * 1000.0 / elapsed_ms as f64) as u64
    } else {
        0
    };
    println!();
    println!("{}", "capture complete".green().bold());
    println!("  session   #{} ({})", summary.session_id, summary.site_name);
    println!("  files     {}/{}", summary.completed, summary.discovered);
    println!("  size      {}", format_bytes(summary.total_bytes).green());
    println!("  duration  {}", format_duration_ms(elapsed_ms).yellow());
    println!("  speed     {}/s", format_bytes(speed));
    if summary.malformed_refs > 0 {
        println!(
            "  {}",
            format!("{} unparseable reference(s) skipped", summary.malformed_refs).yellow()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_scale_through_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn durations_scale_through_units() {
        assert_eq!(format_duration_ms(42), "42 ms");
        assert_eq!(format_duration_ms(9500), "9.50s");
        assert_eq!(format_duration_ms(125_000), "2m 5.0s");
    }

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-rather-long-name", 10), "a-rathe...");
    }

    #[test]
    fn timestamps_render_as_utc_datetimes() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
    }
}
