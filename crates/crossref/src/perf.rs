// perf.rs - Performance timing infrastructure for crossref
//
// Timing instrumentation for diagnosing slow scans and rebuilds.
// Controlled via CROSSREF_PERF environment variable.
//
// Usage:
//   CROSSREF_PERF=1 crossref index-stats ./vault        # Enable basic timing logs
//   CROSSREF_PERF=verbose crossref index-stats ./vault  # Also warn on slow phases

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Global flag indicating whether performance timing is enabled
static PERF_ENABLED: OnceLock<bool> = OnceLock::new();

/// Global flag indicating verbose mode (includes threshold warnings)
static PERF_VERBOSE: OnceLock<bool> = OnceLock::new();

/// Check if performance timing is enabled
pub fn is_enabled() -> bool {
    *PERF_ENABLED.get_or_init(|| {
        std::env::var("CROSSREF_PERF")
            .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
            .unwrap_or(false)
    })
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    *PERF_VERBOSE.get_or_init(|| {
        std::env::var("CROSSREF_PERF")
            .map(|v| v.to_lowercase() == "verbose")
            .unwrap_or(false)
    })
}

/// RAII timing guard that logs duration on drop
///
/// ```
/// use crossref::perf::TimingGuard;
///
/// let _guard = TimingGuard::new("rebuild_all");
/// // ... do work ...
/// // Duration logged when _guard goes out of scope
/// ```
pub struct TimingGuard {
    start: Instant,
    name: &'static str,
    threshold_warn_ms: Option<u64>,
    enabled: bool,
}

impl TimingGuard {
    /// Duration will be logged at INFO level when the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
            threshold_warn_ms: None,
            enabled: is_enabled(),
        }
    }

    /// Like `new`, but warns in verbose mode if the scope takes longer than
    /// `threshold_ms`.
    pub fn with_threshold(name: &'static str, threshold_ms: u64) -> Self {
        Self {
            start: Instant::now(),
            name,
            threshold_warn_ms: Some(threshold_ms),
            enabled: is_enabled(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Consume the guard without logging and return the duration
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        std::mem::forget(self); // Prevent Drop from running
        elapsed
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }

        let elapsed = self.start.elapsed();
        log::info!("[PERF] {} completed in {:?}", self.name, elapsed);

        if let Some(threshold) = self.threshold_warn_ms {
            if elapsed.as_millis() > threshold as u128 && is_verbose() {
                log::warn!(
                    "[PERF] {} exceeded threshold ({}ms > {}ms)",
                    self.name,
                    elapsed.as_millis(),
                    threshold
                );
            }
        }
    }
}

/// Aggregated metrics of the most recent full rebuild
#[derive(Debug, Default, Clone)]
pub struct RebuildMetrics {
    /// Duration of listing the corpus
    pub scan_duration: Option<Duration>,
    /// Duration of the whole rebuild, listing included
    pub rebuild_duration: Option<Duration>,
    pub documents: usize,
    pub records: usize,
    /// Detector, provider and source failures contained during the rebuild
    pub contained_errors: usize,
}

impl RebuildMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_summary(&self) {
        if !is_enabled() {
            return;
        }

        log::info!("[PERF] === Rebuild Performance Summary ===");
        if let Some(d) = self.scan_duration {
            log::info!("[PERF] Corpus scan: {:?} ({} documents)", d, self.documents);
        }
        if let Some(d) = self.rebuild_duration {
            log::info!(
                "[PERF] Rebuild: {:?} ({} records, {} contained errors)",
                d,
                self.records,
                self.contained_errors
            );
        }
    }
}

/// Returns the peak resident set size (RSS) of the current process in bytes.
///
/// Reads `VmHWM` from `/proc/self/status` on Linux; `None` elsewhere.
pub fn peak_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        peak_rss_linux()
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(target_os = "linux")]
fn peak_rss_linux() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmHWM:") {
            // Format: "VmHWM:    12345 kB"
            let trimmed = rest.trim();
            let kb_str = trimmed.strip_suffix("kB").unwrap_or(trimmed).trim();
            let kb: u64 = kb_str.parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_guard_elapsed() {
        let guard = TimingGuard::new("test");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(guard.elapsed().as_millis() >= 10);
    }

    #[test]
    fn test_timing_guard_finish() {
        let guard = TimingGuard::with_threshold("test", 1);
        std::thread::sleep(std::time::Duration::from_millis(10));
        let duration = guard.finish();
        assert!(duration.as_millis() >= 10);
    }

    #[test]
    fn test_rebuild_metrics_default() {
        let metrics = RebuildMetrics::new();
        assert!(metrics.scan_duration.is_none());
        assert!(metrics.rebuild_duration.is_none());
        assert_eq!(metrics.documents, 0);
    }

    #[test]
    fn test_peak_rss_bytes_returns_value_on_linux() {
        let rss = peak_rss_bytes();
        if cfg!(target_os = "linux") {
            assert!(rss.is_some_and(|bytes| bytes > 0));
        } else {
            assert!(rss.is_none());
        }
    }
}
