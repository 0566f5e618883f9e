//! Scan orchestration and job lifecycle.
//!
//! The orchestrator owns a single job slot driven through
//! `Idle -> Running -> {Completed, Failed}`. Scans run on a background tokio
//! task so the invoking context stays responsive; progress reaches the
//! caller only through the progress channel, and job state only through
//! snapshots.

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::{
    DirectoryReport, DriveScanOutcome, FullReport, JobState, QuickReport, ScanJob, ScanReport,
    ScanVariant,
};
use crate::detection::{SignatureRegistry, VulnerabilityAdvisories};
use crate::scanner::file::FileScanner;
use crate::scanner::ports::PortScanner;
use crate::scanner::posture::PostureProbes;
use crate::scanner::progress::{ProgressSender, ProgressSink};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Drives scans and owns the job state machine.
pub struct ScanOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<Config>,
    registry: Arc<SignatureRegistry>,
    advisories: Arc<VulnerabilityAdvisories>,
    /// Override for the roots a full scan walks; platform mounts otherwise
    scan_roots: Option<Vec<PathBuf>>,
    job: Mutex<ScanJob>,
    running: AtomicBool,
    cancelled: Arc<AtomicBool>,
}

impl ScanOrchestrator {
    /// Create an orchestrator with the builtin advisory table.
    pub fn new(config: Arc<Config>, registry: Arc<SignatureRegistry>) -> Self {
        Self::with_advisories(config, registry, Arc::new(VulnerabilityAdvisories::builtin()))
    }

    /// Create an orchestrator with an explicit advisory table.
    pub fn with_advisories(
        config: Arc<Config>,
        registry: Arc<SignatureRegistry>,
        advisories: Arc<VulnerabilityAdvisories>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                advisories,
                scan_roots: None,
                job: Mutex::new(ScanJob::new(ScanVariant::Quick, None)),
                running: AtomicBool::new(false),
                cancelled: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Override the roots a full scan walks (instead of platform mounts).
    pub fn with_scan_roots(mut self, roots: Vec<PathBuf>) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("with_scan_roots must be called before the orchestrator is shared");
        inner.scan_roots = Some(roots);
        self
    }

    /// Snapshot of the current job.
    pub fn job(&self) -> ScanJob {
        self.inner
            .job
            .lock()
            .map(|job| job.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Whether a scan is currently running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Request cooperative cancellation of the running scan.
    ///
    /// Observed at per-file and per-port boundaries; the worker finishes in
    /// bounded time and the job terminates as `Failed`.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// Start a scan on a background task.
    ///
    /// Rejects with [`Error::ScanAlreadyInProgress`] while a job is running;
    /// the running job is unaffected. Starting a scan after a terminal state
    /// discards the previous job.
    pub fn start(
        &self,
        variant: ScanVariant,
        target: Option<PathBuf>,
        progress: ProgressSender,
    ) -> Result<JoinHandle<()>> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::ScanAlreadyInProgress);
        }

        self.inner.cancelled.store(false, Ordering::SeqCst);

        {
            let mut job = self
                .inner
                .job
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *job = ScanJob::new(variant, target.clone());
            job.state = JobState::Running;
        }

        log::info!("Starting {} (job {})", variant, self.job().id);

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let sink = ProgressSink::new(progress);
            let outcome = Inner::dispatch(&inner, variant, target, &sink).await;

            let mut job = inner
                .job
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            job.set_progress(sink.current());
            match outcome {
                Ok(report) => {
                    log::info!("{} completed (job {})", variant, job.id);
                    job.complete(report);
                }
                Err(e) => {
                    log::warn!("{} failed (job {}): {}", variant, job.id, e);
                    job.fail(e.to_string());
                }
            }
            drop(job);

            inner.running.store(false, Ordering::SeqCst);
        });

        Ok(handle)
    }

    /// Roots a full scan will walk on this host.
    pub fn mounted_roots(&self) -> Vec<PathBuf> {
        if let Some(roots) = &self.inner.scan_roots {
            return roots.clone();
        }
        platform_roots()
    }
}

impl Inner {
    async fn dispatch(
        inner: &Arc<Inner>,
        variant: ScanVariant,
        target: Option<PathBuf>,
        sink: &ProgressSink,
    ) -> Result<ScanReport> {
        match variant {
            ScanVariant::Quick => Self::run_quick(inner, sink).await,
            ScanVariant::Directory => Self::run_directory(inner, target, sink).await,
            ScanVariant::Full => Self::run_full(inner, sink).await,
        }
    }

    /// Posture probes plus the local port sweep.
    async fn run_quick(inner: &Arc<Inner>, sink: &ProgressSink) -> Result<ScanReport> {
        let posture = Self::collect_posture(inner).await?;
        sink.emit(50, 0, 0);

        let ports = PortScanner::with_cancel_flag(
            inner.config.ports.clone(),
            Arc::clone(&inner.cancelled),
        )
        .scan()
        .await?;
        sink.emit(100, 0, 0);

        Ok(ScanReport::Quick(QuickReport {
            posture,
            open_ports: ports,
        }))
    }

    /// File scan over exactly one caller-supplied directory.
    async fn run_directory(
        inner: &Arc<Inner>,
        target: Option<PathBuf>,
        sink: &ProgressSink,
    ) -> Result<ScanReport> {
        let root = target
            .ok_or_else(|| Error::invalid_target("", "no target path supplied"))?;
        if !root.is_dir() {
            return Err(Error::invalid_target(
                root,
                "path does not exist or is not a directory",
            ));
        }

        let scanner = FileScanner::with_cancel_flag(
            Arc::clone(&inner.config),
            Arc::clone(&inner.registry),
            Arc::clone(&inner.cancelled),
        );
        let report = scanner.scan(&root, sink).await?;

        Ok(ScanReport::Directory(DirectoryReport {
            directory_scan: report,
        }))
    }

    /// Quick probes plus a file scan of every mounted root.
    ///
    /// A failure on one root is recorded as that root's outcome and never
    /// aborts the remaining roots.
    async fn run_full(inner: &Arc<Inner>, sink: &ProgressSink) -> Result<ScanReport> {
        let posture = Self::collect_posture(inner).await?;

        let ports = PortScanner::with_cancel_flag(
            inner.config.ports.clone(),
            Arc::clone(&inner.cancelled),
        )
        .scan()
        .await?;

        let roots = match &inner.scan_roots {
            Some(roots) => roots.clone(),
            None => platform_roots(),
        };
        let count = roots.len();
        let mut drive_scans = BTreeMap::new();

        for (index, root) in roots.into_iter().enumerate() {
            if inner.cancelled.load(Ordering::SeqCst) {
                return Err(Error::ScanCancelled);
            }

            log::info!("Starting scan on root {:?} ({}/{})", root, index + 1, count);
            let slice = sink.slice(index, count);
            let scanner = FileScanner::with_cancel_flag(
                Arc::clone(&inner.config),
                Arc::clone(&inner.registry),
                Arc::clone(&inner.cancelled),
            );

            let key = root.to_string_lossy().into_owned();
            match scanner.scan(&root, &slice).await {
                Ok(report) => {
                    drive_scans.insert(key, DriveScanOutcome::Scanned(report));
                }
                Err(e) if e.is_cancelled() => return Err(Error::ScanCancelled),
                Err(e) => {
                    log::warn!("Scan of root {:?} failed: {}", root, e);
                    drive_scans.insert(
                        key,
                        DriveScanOutcome::Failed {
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        sink.emit(100, 0, 0);

        Ok(ScanReport::Full(FullReport {
            posture,
            open_ports: ports,
            drive_scans,
        }))
    }

    /// Posture probes block on child processes, so they run off the async
    /// worker.
    async fn collect_posture(
        inner: &Arc<Inner>,
    ) -> Result<crate::core::types::PostureSnapshot> {
        let advisories = Arc::clone(&inner.advisories);
        tokio::task::spawn_blocking(move || PostureProbes::new(advisories).collect())
            .await
            .map_err(|e| Error::Internal(format!("posture probe task failed: {}", e)))
    }
}

/// Mounted filesystem roots for a full scan.
#[cfg(windows)]
fn platform_roots() -> Vec<PathBuf> {
    (b'A'..=b'Z')
        .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
        .filter(|p| p.exists())
        .collect()
}

/// Mounted filesystem roots for a full scan.
#[cfg(not(windows))]
fn platform_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/")]
}
