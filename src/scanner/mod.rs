//! Scanning functionality.
//!
//! This module provides the scan engine:
//! - File system traversal and signature matching
//! - Local TCP port exposure probing
//! - Host security posture probes
//! - Progress event reporting
//! - Scan orchestration and job lifecycle

pub mod file;
pub mod orchestrator;
pub mod ports;
pub mod posture;
pub mod progress;

pub use file::FileScanner;
pub use orchestrator::ScanOrchestrator;
pub use ports::PortScanner;
pub use posture::PostureProbes;
pub use progress::{
    progress_channel, ConsoleProgressReporter, ProgressEvent, ProgressReceiver, ProgressSender,
    ProgressSink,
};
