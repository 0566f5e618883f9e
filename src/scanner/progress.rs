//! Scan progress events and reporting.
//!
//! Progress flows from the scan worker to the caller through a single typed
//! channel; the caller owns draining it. Percentages forwarded through a
//! [`ProgressSink`] are monotonically non-decreasing within one job, even
//! when several sub-scans share the job's progress space.

use serde::Serialize;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A progress update emitted during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Overall job progress, 0-100
    pub percent: u8,
    /// Files processed so far in the current sub-scan
    pub scanned: u64,
    /// Total files known from the pre-pass (0 when not file-based)
    pub total: u64,
}

/// Sending half of the progress channel.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
/// Receiving half of the progress channel, owned by the caller.
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Create a progress channel.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Writes progress into a slice of the overall job's progress space.
///
/// A root sink spans 0..100; [`ProgressSink::slice`] derives sinks for
/// sub-scans (drive _i_ of _N_ occupies `[i/N, (i+1)/N)`). All sinks derived
/// from one root share a floor value so the reported percentage never moves
/// backwards.
#[derive(Clone)]
pub struct ProgressSink {
    tx: ProgressSender,
    base: f64,
    span: f64,
    floor: Arc<AtomicU8>,
}

impl ProgressSink {
    /// Create a root sink spanning the whole 0..100 range.
    pub fn new(tx: ProgressSender) -> Self {
        Self {
            tx,
            base: 0.0,
            span: 100.0,
            floor: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Derive a sink for sub-scan `index` of `count`, mapping its local
    /// 0..100 into the slice `[index/count, (index+1)/count)` of this sink.
    pub fn slice(&self, index: usize, count: usize) -> Self {
        let count = count.max(1) as f64;
        let width = self.span / count;
        Self {
            tx: self.tx.clone(),
            base: self.base + width * index as f64,
            span: width,
            floor: Arc::clone(&self.floor),
        }
    }

    /// Emit a progress event at `local_percent` of this sink's slice.
    ///
    /// Send failures are ignored: a caller that dropped the receiver simply
    /// stops observing progress.
    pub fn emit(&self, local_percent: u8, scanned: u64, total: u64) {
        let overall = self.base + self.span * f64::from(local_percent.min(100)) / 100.0;
        let overall = (overall.round() as u8).min(100);
        let previous = self.floor.fetch_max(overall, Ordering::SeqCst);
        let percent = previous.max(overall);

        let _ = self.tx.send(ProgressEvent {
            percent,
            scanned,
            total,
        });
    }

    /// The highest percentage emitted so far across all derived sinks.
    pub fn current(&self) -> u8 {
        self.floor.load(Ordering::SeqCst)
    }
}

/// Console progress reporter rendering a carriage-return progress bar.
pub struct ConsoleProgressReporter {
    bar_width: usize,
    last_line_length: AtomicUsize,
}

impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleProgressReporter {
    /// Create a new console reporter.
    pub fn new() -> Self {
        Self {
            bar_width: 40,
            last_line_length: AtomicUsize::new(0),
        }
    }

    /// Render one progress event.
    pub fn report(&self, event: &ProgressEvent) {
        let filled = self.bar_width * usize::from(event.percent) / 100;
        let bar: String = "█".repeat(filled) + &"-".repeat(self.bar_width - filled);

        let message = if event.total > 0 {
            format!(
                "\r[{}] {}% ({}/{} files scanned)",
                bar, event.percent, event.scanned, event.total
            )
        } else {
            format!("\r[{}] {}%", bar, event.percent)
        };

        // Pad over any longer previous line
        let last_len = self.last_line_length.load(Ordering::Relaxed);
        let padding = last_len.saturating_sub(message.len());
        eprint!("{}{}", message, " ".repeat(padding));
        self.last_line_length.store(message.len(), Ordering::Relaxed);
    }

    /// Terminate the progress line.
    pub fn finish(&self) {
        if self.last_line_length.load(Ordering::Relaxed) > 0 {
            eprintln!();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_sink_passthrough() {
        let (tx, mut rx) = progress_channel();
        let sink = ProgressSink::new(tx);

        sink.emit(25, 50, 200);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.percent, 25);
        assert_eq!(event.scanned, 50);
        assert_eq!(event.total, 200);
    }

    #[test]
    fn test_slice_scaling() {
        let (tx, mut rx) = progress_channel();
        let sink = ProgressSink::new(tx);

        // Second of four slices: local 50% -> overall 25 + 12.5 -> 38
        let slice = sink.slice(1, 4);
        slice.emit(50, 10, 20);
        assert_eq!(rx.try_recv().unwrap().percent, 38);

        // Completing the slice lands on the slice boundary
        slice.emit(100, 20, 20);
        assert_eq!(rx.try_recv().unwrap().percent, 50);
    }

    #[test]
    fn test_monotonic_across_slices() {
        let (tx, mut rx) = progress_channel();
        let sink = ProgressSink::new(tx);

        sink.slice(1, 2).emit(100, 0, 0); // overall 100
        assert_eq!(rx.try_recv().unwrap().percent, 100);

        // A lagging earlier slice cannot regress the percentage
        sink.slice(0, 2).emit(10, 0, 0);
        assert_eq!(rx.try_recv().unwrap().percent, 100);
        assert_eq!(sink.current(), 100);
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (tx, rx) = progress_channel();
        let sink = ProgressSink::new(tx);
        drop(rx);

        // Must not panic
        sink.emit(10, 1, 10);
    }
}
