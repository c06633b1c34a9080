use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;
use std::sync::atomic::{AtomicI64, Ordering};

/// External interface for incremental byte-count updates and per-part completion
/// notices. `add` accepts negative deltas so a discarded partial fetch can be
/// refunded, keeping the displayed total equal to the on-disk complete-bytes total at
/// all times. Object-safe so the orchestrator can hold a `dyn ProgressSink` and swap
/// implementations (bar vs. no-op vs. JSON) without generic plumbing.
pub trait ProgressSink: Send + Sync {
    fn add(&self, delta: i64);
    fn add_detail(&self, line: &str);
    fn finish(&self, message: &str);
    /// Sets the known total once the probe resolves it. No-op for sinks that don't
    /// render a bounded bar.
    fn set_total(&self, _total: u64) {}
}

/// Visual `indicatif::ProgressBar`-backed sink, the default for interactive runs.
pub struct BarProgressSink {
    bar: ProgressBar,
}

impl BarProgressSink {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(style_download_bar());
        bar.set_message("Downloading");
        Self { bar }
    }
}

impl ProgressSink for BarProgressSink {
    fn add(&self, delta: i64) {
        if delta >= 0 {
            self.bar.inc(delta as u64);
        } else {
            self.bar.set_position(self.bar.position().saturating_sub((-delta) as u64));
        }
    }

    fn add_detail(&self, line: &str) {
        self.bar.set_message(line.to_string());
    }

    fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
    }
}

/// No-op sink used by tests and whenever a visual bar would get in the way.
#[derive(Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn add(&self, _delta: i64) {}
    fn add_detail(&self, _line: &str) {}
    fn finish(&self, _message: &str) {}
}

/// Emits one JSON line per event to stdout, for `--json-output` automation. Bytes are
/// accumulated locally (not read back) purely so a future `total()` accessor would be
/// cheap; the sink itself only ever writes forward.
pub struct JsonProgressSink {
    total_downloaded: AtomicI64,
}

impl JsonProgressSink {
    pub fn new() -> Self {
        Self { total_downloaded: AtomicI64::new(0) }
    }
}

impl Default for JsonProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for JsonProgressSink {
    fn add(&self, delta: i64) {
        let total = self.total_downloaded.fetch_add(delta, Ordering::Relaxed) + delta;
        println!("{}", serde_json::json!({ "event": "progress", "downloaded": total }));
    }

    fn add_detail(&self, line: &str) {
        println!("{}", serde_json::json!({ "event": "detail", "message": line }));
    }

    fn finish(&self, message: &str) {
        println!("{}", serde_json::json!({ "event": "finished", "message": message }));
    }
}

/// Format: `Spinner [Elapsed] [Bar] Bytes/Total (Speed, ETA)`.
pub fn style_download_bar() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
        .unwrap()
        .progress_chars("#>-")
}

/// Format: `Spinner Message`, for indeterminate states like merging.
pub fn style_spinner() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.blue} {msg}")
        .unwrap()
}

/// Formats bytes into human-readable KB/MB/GB strings, for log lines.
pub fn format_bytes(bytes: u64) -> Cow<'static, str> {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64).into()
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64).into()
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64).into()
    } else {
        format!("{bytes} B").into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_picks_largest_unit() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn null_sink_is_inert() {
        let sink = NullProgressSink;
        sink.add(100);
        sink.add(-50);
        sink.add_detail("whatever");
        sink.finish("done");
    }
}
