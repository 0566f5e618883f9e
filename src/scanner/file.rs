//! File system scanner implementation.

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::{ExtensionRisk, FileScanReport, InfectedFileRecord};
use crate::detection::SignatureRegistry;
use crate::scanner::progress::ProgressSink;
use crate::utils::hash::HashCalculator;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use walkdir::WalkDir;

/// Per-file outcome reported by a worker.
#[derive(Debug)]
enum FileOutcome {
    /// Hashed, no signature match
    Clean,
    /// Hashed and matched a signature
    Infected(InfectedFileRecord),
    /// Oversized or unreadable; not hashed
    Skipped,
}

/// Signature-matching file system scanner.
pub struct FileScanner {
    config: Arc<Config>,
    registry: Arc<SignatureRegistry>,
    cancelled: Arc<AtomicBool>,
}

impl FileScanner {
    /// Create a new file scanner.
    pub fn new(config: Arc<Config>, registry: Arc<SignatureRegistry>) -> Self {
        Self {
            config,
            registry,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a scanner sharing an externally owned cancellation flag.
    pub fn with_cancel_flag(
        config: Arc<Config>,
        registry: Arc<SignatureRegistry>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            registry,
            cancelled,
        }
    }

    /// Request cancellation; observed at per-file boundaries.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if the scan has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Check if a path should be excluded from scanning.
    fn should_exclude(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.config
            .scan
            .exclude_paths
            .iter()
            .any(|excluded| path_str.starts_with(excluded.as_str()))
    }

    /// Pre-pass: enumerate every regular file under `root`.
    ///
    /// The returned queue doubles as the total for progress percentages.
    /// A root that cannot be read is fatal; errors on individual entries
    /// deeper in the tree are not.
    fn enumerate(&self, root: &Path) -> Result<Vec<(PathBuf, u64)>> {
        std::fs::read_dir(root).map_err(|e| Error::target_unreadable(root, e))?;

        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(self.config.scan.follow_symlinks)
            .into_iter()
            .filter_entry(|e| !self.should_exclude(e.path()));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let size = match entry.metadata() {
                Ok(m) => m.len(),
                Err(_) => continue,
            };

            files.push((entry.into_path(), size));
        }

        Ok(files)
    }

    /// Scan one directory tree, reporting progress to `sink`.
    pub async fn scan(&self, root: &Path, sink: &ProgressSink) -> Result<FileScanReport> {
        log::info!("Scanning directory: {:?}", root);
        let start = Instant::now();

        let files = self.enumerate(root)?;
        let total = files.len() as u64;
        log::info!("Found {} files to scan under {:?}", total, root);

        let queue = Arc::new(Mutex::new(VecDeque::from(files)));
        let (tx, mut rx) = mpsc::channel::<FileOutcome>(1000);

        let num_workers = self.config.scan.scan_threads.clamp(1, 8);
        let size_limit = self.config.scan.skip_large_files_mb * 1024 * 1024;
        let mut handles = Vec::new();

        for _ in 0..num_workers {
            let queue = Arc::clone(&queue);
            let registry = Arc::clone(&self.registry);
            let cancelled = Arc::clone(&self.cancelled);
            let tx = tx.clone();

            let handle = tokio::spawn(async move {
                loop {
                    if cancelled.load(Ordering::SeqCst) {
                        break;
                    }

                    let item = {
                        match queue.lock() {
                            Ok(mut q) => q.pop_front(),
                            Err(_) => {
                                log::error!("File queue lock poisoned in worker");
                                break;
                            }
                        }
                    };

                    let (path, size) = match item {
                        Some(item) => item,
                        None => break, // Queue drained
                    };

                    let outcome = Self::scan_file_sync(&path, size, &registry, size_limit);
                    if tx.send(outcome).await.is_err() {
                        break;
                    }
                }
            });

            handles.push(handle);
        }

        // Close the channel once all workers finish
        drop(tx);

        let mut report = FileScanReport::default();
        let mut processed = 0u64;
        let interval = self.config.scan.progress_interval.max(1);

        while let Some(outcome) = rx.recv().await {
            processed += 1;
            match outcome {
                FileOutcome::Clean => report.stats.files_scanned += 1,
                FileOutcome::Infected(record) => {
                    log::warn!(
                        "Found infected file: {:?} - {}",
                        record.path,
                        record.label
                    );
                    report.stats.files_scanned += 1;
                    report.infected.push(record);
                }
                FileOutcome::Skipped => report.stats.files_skipped += 1,
            }

            if processed % interval == 0 {
                sink.emit(percent_of(processed, total), processed, total);
            }
        }

        for handle in handles {
            let _ = handle.await;
        }

        if self.is_cancelled() {
            return Err(Error::ScanCancelled);
        }

        sink.emit(100, processed, total);
        report.stats.duration_seconds = start.elapsed().as_secs_f64();

        log::info!(
            "Scan of {:?} completed: {} scanned, {} skipped, {} infected in {:.2}s",
            root,
            report.stats.files_scanned,
            report.stats.files_skipped,
            report.infected.len(),
            report.stats.duration_seconds
        );

        Ok(report)
    }

    /// Hash one file and check it against the registry.
    ///
    /// Per-file failures are local: an unreadable or oversized file is
    /// counted skipped and never aborts the walk.
    fn scan_file_sync(
        path: &Path,
        size: u64,
        registry: &SignatureRegistry,
        size_limit: u64,
    ) -> FileOutcome {
        if size > size_limit {
            log::trace!("Skipping oversized file ({} bytes): {:?}", size, path);
            return FileOutcome::Skipped;
        }

        // Risk classification is informational only; every file takes the
        // same hashing path.
        let risk = path
            .extension()
            .map(|ext| ExtensionRisk::from_extension(&ext.to_string_lossy()))
            .unwrap_or(ExtensionRisk::Standard);

        let hash = match HashCalculator::digest_file(path) {
            Ok(hash) => hash,
            Err(e) => {
                log::trace!("Skipping unreadable file {:?}: {}", path, e);
                return FileOutcome::Skipped;
            }
        };

        match registry.lookup(&hash) {
            Some(label) => {
                log::debug!("Signature hit ({:?} risk {:?}): {}", path, risk, label);
                FileOutcome::Infected(InfectedFileRecord {
                    path: path.to_path_buf(),
                    label: label.to_string(),
                    hash,
                    size_bytes: size,
                })
            }
            None => FileOutcome::Clean,
        }
    }
}

/// Integer progress percentage; an empty scan is complete by definition.
fn percent_of(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed.saturating_mul(100)) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::registry::Signature;
    use crate::scanner::progress::{progress_channel, ProgressSink};
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    const PAYLOAD: &[u8] = b"malicious payload";

    fn test_registry() -> Arc<SignatureRegistry> {
        Arc::new(SignatureRegistry::from_signatures(vec![Signature {
            hash: HashCalculator::digest_bytes(PAYLOAD),
            label: "Test.Malware".to_string(),
        }]))
    }

    fn test_config() -> Arc<Config> {
        let mut config = Config::default();
        // Small limit so tests can exercise the skip policy cheaply
        config.scan.skip_large_files_mb = 1;
        config.scan.progress_interval = 1;
        Arc::new(config)
    }

    fn scanner_with(config: Arc<Config>) -> FileScanner {
        FileScanner::new(config, test_registry())
    }

    fn sink() -> (ProgressSink, crate::scanner::progress::ProgressReceiver) {
        let (tx, rx) = progress_channel();
        (ProgressSink::new(tx), rx)
    }

    fn build_tree(dir: &TempDir) {
        fs::write(dir.path().join("infected.bin"), PAYLOAD).unwrap();
        fs::write(dir.path().join("clean.txt"), b"nothing to see").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("also_clean.doc"), b"hello").unwrap();
        // Over the 1 MiB test limit
        fs::write(
            dir.path().join("huge.iso"),
            vec![0u8; 2 * 1024 * 1024],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_detects_infected_file_once() {
        let dir = TempDir::new().unwrap();
        build_tree(&dir);

        let scanner = scanner_with(test_config());
        let (sink, _rx) = sink();
        let report = scanner.scan(dir.path(), &sink).await.unwrap();

        assert_eq!(report.infected.len(), 1);
        let record = &report.infected[0];
        assert_eq!(record.label, "Test.Malware");
        assert_eq!(record.size_bytes, PAYLOAD.len() as u64);
        assert_eq!(record.hash, HashCalculator::digest_bytes(PAYLOAD));
        assert!(record.path.ends_with("infected.bin"));
    }

    #[tokio::test]
    async fn test_oversized_file_skipped_not_hashed() {
        let dir = TempDir::new().unwrap();
        build_tree(&dir);

        let scanner = scanner_with(test_config());
        let (sink, _rx) = sink();
        let report = scanner.scan(dir.path(), &sink).await.unwrap();

        assert!(report.stats.files_skipped >= 1);
        // The oversized file never shows up as infected even though its
        // content is irrelevant; it was never opened.
        assert!(report.infected.iter().all(|r| !r.path.ends_with("huge.iso")));
    }

    #[tokio::test]
    async fn test_scanned_plus_skipped_equals_total() {
        let dir = TempDir::new().unwrap();
        build_tree(&dir);

        let scanner = scanner_with(test_config());
        let (sink, _rx) = sink();
        let report = scanner.scan(dir.path(), &sink).await.unwrap();

        // 4 files in the tree
        assert_eq!(report.stats.files_scanned + report.stats.files_skipped, 4);
        assert!(report.stats.duration_seconds >= 0.0);
    }

    #[tokio::test]
    async fn test_idempotent_infected_set() {
        let dir = TempDir::new().unwrap();
        build_tree(&dir);

        let config = test_config();
        let (sink_a, _rx_a) = sink();
        let first = scanner_with(Arc::clone(&config))
            .scan(dir.path(), &sink_a)
            .await
            .unwrap();
        let (sink_b, _rx_b) = sink();
        let second = scanner_with(config)
            .scan(dir.path(), &sink_b)
            .await
            .unwrap();

        let set_a: BTreeSet<_> = first.infected.iter().map(|r| r.path.clone()).collect();
        let set_b: BTreeSet<_> = second.infected.iter().map(|r| r.path.clone()).collect();
        assert_eq!(set_a, set_b);
        assert_eq!(first.stats.files_scanned, second.stats.files_scanned);
    }

    #[tokio::test]
    async fn test_missing_root_is_target_unreadable() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does_not_exist");

        let scanner = scanner_with(test_config());
        let (sink, _rx) = sink();
        let err = scanner.scan(&missing, &sink).await.unwrap_err();
        assert!(matches!(err, Error::TargetUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_progress_events_monotonic_and_complete() {
        let dir = TempDir::new().unwrap();
        build_tree(&dir);

        let scanner = scanner_with(test_config());
        let (sink, mut rx) = sink();
        scanner.scan(dir.path(), &sink).await.unwrap();

        let mut last = 0u8;
        let mut final_event = None;
        while let Ok(event) = rx.try_recv() {
            assert!(event.percent >= last, "progress went backwards");
            last = event.percent;
            final_event = Some(event);
        }

        let final_event = final_event.expect("at least one progress event");
        assert_eq!(final_event.percent, 100);
        assert_eq!(final_event.total, 4);
        assert_eq!(final_event.scanned, 4);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        build_tree(&dir);

        let scanner = scanner_with(test_config());
        scanner.cancel();
        let (sink, _rx) = sink();
        let err = scanner.scan(dir.path(), &sink).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(0, 0), 100);
        assert_eq!(percent_of(0, 10), 0);
        assert_eq!(percent_of(5, 10), 50);
        assert_eq!(percent_of(10, 10), 100);
    }
}
