//! Progress events and running counters for one capture session.
//!
//! The engine publishes events to an mpsc channel and keeps its totals in
//! [`CaptureStats`]; rendering lives entirely outside the core. Delivery
//! is lossy (`try_send`) and optional: correctness never depends on a
//! receiver being attached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// What kind of entity a fetch concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Page,
    Stylesheet,
    Script,
    Image,
}

impl ResourceKind {
    /// Short label used in progress lines.
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Page => "HTML",
            ResourceKind::Stylesheet => "CSS",
            ResourceKind::Script => "JS",
            ResourceKind::Image => "IMG",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A fetch attempt begins.
    Started { kind: ResourceKind, url: String },

    /// Streamed fetch update, emitted roughly every 100 ms.
    Transferring {
        kind: ResourceKind,
        filename: String,
        bytes_so_far: u64,
        elapsed: Duration,
    },

    /// A fetch attempt finished, successfully or not. `done`/`total` are a
    /// snapshot of the completed/discovered counters after this attempt.
    Finished {
        kind: ResourceKind,
        url: String,
        filename: String,
        status: Option<u16>,
        bytes: u64,
        elapsed: Duration,
        succeeded: bool,
        done: u64,
        total: u64,
    },

    /// References were skipped because they could not be resolved to URLs.
    MalformedReferences { count: u64 },
}

/// Running totals for one `download_site` invocation.
///
/// Counters only go up. They are plain atomics so the rendering task can
/// read them while the engine increments; a fresh set is created per
/// invocation, never shared across sessions.
#[derive(Debug, Default)]
pub struct CaptureStats {
    discovered: AtomicU64,
    completed: AtomicU64,
    bytes: AtomicU64,
    malformed: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the discovered counter and returns the new value.
    pub fn add_discovered(&self) -> u64 {
        self.discovered.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Increments the completed counter and returns the new value.
    pub fn add_completed(&self) -> u64 {
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_malformed(&self, n: u64) {
        self.malformed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn discovered(&self) -> u64 {
        self.discovered.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Accumulated size in kilobytes, the unit the session record stores.
    pub fn total_kb(&self) -> f64 {
        self.bytes() as f64 / 1024.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counters_accumulate() {
        let stats = CaptureStats::new();
        assert_eq!(stats.add_discovered(), 1);
        assert_eq!(stats.add_discovered(), 2);
        assert_eq!(stats.add_completed(), 1);
        stats.add_bytes(2048);
        stats.add_bytes(1024);
        assert_eq!(stats.discovered(), 2);
        assert_eq!(stats.completed(), 1);
        assert_eq!(stats.bytes(), 3072);
        assert_eq!(stats.total_kb(), 3.0);
    }

    #[test]
    fn counters_survive_concurrent_increments() {
        let stats = Arc::new(CaptureStats::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = Arc::clone(&stats);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    stats.add_discovered();
                    stats.add_bytes(1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.discovered(), 8000);
        assert_eq!(stats.bytes(), 8000);
    }
}
