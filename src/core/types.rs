//! Core type definitions used throughout host-sentry.
//!
//! Serialized field names follow the collector's wire format, so a completed
//! report can be posted or saved to disk without a separate DTO layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The scan variant requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanVariant {
    /// Posture probes plus a local port sweep; fast feedback.
    Quick,
    /// File scan of exactly one caller-supplied directory.
    Directory,
    /// File scan of every mounted root plus the quick probes.
    Full,
}

impl ScanVariant {
    /// Wire representation used in the collector's `scan_type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanVariant::Quick => "quick",
            ScanVariant::Directory => "directory",
            ScanVariant::Full => "full",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "quick" => Some(ScanVariant::Quick),
            "directory" => Some(ScanVariant::Directory),
            "full" => Some(ScanVariant::Full),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScanVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanVariant::Quick => write!(f, "Quick Scan"),
            ScanVariant::Directory => write!(f, "Directory Scan"),
            ScanVariant::Full => write!(f, "Full System Scan"),
        }
    }
}

/// A file whose content hash matched a signature.
///
/// Created during a file scan and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfectedFileRecord {
    /// Path of the matching file
    #[serde(rename = "file")]
    pub path: PathBuf,
    /// Threat label from the signature registry
    #[serde(rename = "malware")]
    pub label: String,
    /// Matching content digest (lowercase hex)
    pub hash: String,
    /// File size in bytes
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

/// Counters accumulated over one file scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Files hashed and checked (clean or infected)
    #[serde(rename = "scanned_files")]
    pub files_scanned: u64,
    /// Files skipped (oversized or unreadable)
    #[serde(rename = "skipped_files")]
    pub files_skipped: u64,
    /// Wall-clock duration of the scan
    #[serde(rename = "scan_duration_seconds")]
    pub duration_seconds: f64,
}

/// Result of scanning one directory tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileScanReport {
    /// Files that matched a signature
    #[serde(rename = "infected_files")]
    pub infected: Vec<InfectedFileRecord>,
    /// Accumulated counters
    pub stats: ScanStats,
}

/// An open TCP port found by the port scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPortRecord {
    /// Port number (1-65535)
    pub port: u16,
    /// Service name from the static lookup table, or "Unknown"
    pub service: String,
}

/// Extension-based risk hint.
///
/// Purely informational: risky and standard files are hashed and checked
/// identically. Kept as an extension point for future prioritization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionRisk {
    /// Executable / script / archive extensions
    Risky,
    /// Everything else
    Standard,
}

impl ExtensionRisk {
    /// Classify a file extension (without the leading dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "exe" | "dll" | "bat" | "cmd" | "ps1" | "vbs" | "js" | "jar" | "zip" | "rar" => {
                ExtensionRisk::Risky
            }
            _ => ExtensionRisk::Standard,
        }
    }
}

/// Outcome of a single best-effort posture probe.
///
/// Serializes either as the probed value or as the `{"error": ...}` marker
/// the collector expects for a failed probe.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProbeOutcome<T> {
    /// The probe completed
    Ready(T),
    /// The probe failed; the rest of the snapshot is still valid
    Failed { error: String },
}

impl<T> ProbeOutcome<T> {
    /// Build from a probe result, capturing the failure reason.
    pub fn from_result<E: std::fmt::Display>(res: std::result::Result<T, E>) -> Self {
        match res {
            Ok(v) => ProbeOutcome::Ready(v),
            Err(e) => ProbeOutcome::Failed {
                error: e.to_string(),
            },
        }
    }

    /// Whether the probe produced a value.
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready(_))
    }

    /// The probed value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            ProbeOutcome::Ready(v) => Some(v),
            ProbeOutcome::Failed { .. } => None,
        }
    }
}

/// Basic facts about the host system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub os_name: String,
    pub os_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_edition: Option<String>,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_gb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Local time the snapshot was taken, `YYYY-MM-DD HH:MM:SS`
    pub scan_time: String,
}

/// Real-time protection flags, keyed by the reporting tool's field names.
pub type ProtectionFlags = BTreeMap<String, bool>;

/// State of one firewall profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FirewallProfileState {
    Enabled,
    Disabled,
    Unknown,
}

impl std::fmt::Display for FirewallProfileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FirewallProfileState::Enabled => write!(f, "Enabled"),
            FirewallProfileState::Disabled => write!(f, "Disabled"),
            FirewallProfileState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Per-profile firewall states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallStatus {
    #[serde(rename = "Domain Profile")]
    pub domain: FirewallProfileState,
    #[serde(rename = "Private Profile")]
    pub private: FirewallProfileState,
    #[serde(rename = "Public Profile")]
    pub public: FirewallProfileState,
}

impl Default for FirewallStatus {
    fn default() -> Self {
        Self {
            domain: FirewallProfileState::Unknown,
            private: FirewallProfileState::Unknown,
            public: FirewallProfileState::Unknown,
        }
    }
}

/// One installed software entry, cross-referenced against the advisory table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareEntry {
    pub name: String,
    pub version: String,
    pub vulnerable: bool,
    pub vulnerability_info: Option<String>,
}

/// Aggregate snapshot of host security posture.
///
/// Every field is an independent probe; a partial snapshot is valid.
#[derive(Debug, Clone, Serialize)]
pub struct PostureSnapshot {
    pub system_info: ProbeOutcome<SystemInfo>,
    pub defender_status: ProbeOutcome<ProtectionFlags>,
    pub firewall_status: ProbeOutcome<FirewallStatus>,
    pub installed_software: ProbeOutcome<Vec<SoftwareEntry>>,
}

/// Outcome of scanning one mounted root during a full scan.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DriveScanOutcome {
    /// The root was scanned
    Scanned(FileScanReport),
    /// Scanning this root failed; other roots are unaffected
    Failed { error: String },
}

/// Report of a quick scan: posture plus the local port sweep.
#[derive(Debug, Clone, Serialize)]
pub struct QuickReport {
    #[serde(flatten)]
    pub posture: PostureSnapshot,
    pub open_ports: Vec<OpenPortRecord>,
}

/// Report of a directory scan.
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryReport {
    pub directory_scan: FileScanReport,
}

/// Report of a full scan: the quick probes plus per-root file scans.
#[derive(Debug, Clone, Serialize)]
pub struct FullReport {
    #[serde(flatten)]
    pub posture: PostureSnapshot,
    pub open_ports: Vec<OpenPortRecord>,
    pub drive_scans: BTreeMap<String, DriveScanOutcome>,
}

/// Final aggregate of one completed scan, shaped by the variant.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ScanReport {
    Full(FullReport),
    Quick(QuickReport),
    Directory(DirectoryReport),
}

impl ScanReport {
    /// The variant this report was produced by.
    pub fn variant(&self) -> ScanVariant {
        match self {
            ScanReport::Quick(_) => ScanVariant::Quick,
            ScanReport::Directory(_) => ScanVariant::Directory,
            ScanReport::Full(_) => ScanVariant::Full,
        }
    }

    /// Total infected files across all file scans in the report.
    pub fn infected_count(&self) -> usize {
        match self {
            ScanReport::Quick(_) => 0,
            ScanReport::Directory(report) => report.directory_scan.infected.len(),
            ScanReport::Full(report) => report
                .drive_scans
                .values()
                .map(|o| match o {
                    DriveScanOutcome::Scanned(r) => r.infected.len(),
                    DriveScanOutcome::Failed { .. } => 0,
                })
                .sum(),
        }
    }
}

/// Lifecycle state of a scan job.
#[derive(Debug, Clone)]
pub enum JobState {
    /// No scan requested yet
    Idle,
    /// Scan in flight on the worker
    Running,
    /// Terminal: scan finished, report available
    Completed(ScanReport),
    /// Terminal: scan failed with a reason
    Failed(String),
}

impl JobState {
    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed(_) | JobState::Failed(_))
    }

    /// Short status name for display.
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Completed(_) => "completed",
            JobState::Failed(_) => "failed",
        }
    }
}

/// One in-flight or completed scan invocation.
///
/// Mutable fields are owned by the orchestrator; other contexts observe
/// snapshots only.
#[derive(Debug, Clone)]
pub struct ScanJob {
    /// Unique job identifier
    pub id: String,
    /// Requested variant
    pub variant: ScanVariant,
    /// Target path for directory scans
    pub target: Option<PathBuf>,
    /// Current lifecycle state
    pub state: JobState,
    /// Overall progress, 0-100, monotonically non-decreasing
    pub progress_percent: u8,
    /// When the job was created
    pub started_at: DateTime<Utc>,
}

impl ScanJob {
    /// Create a new job in the `Idle` state.
    pub fn new(variant: ScanVariant, target: Option<PathBuf>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            variant,
            target,
            state: JobState::Idle,
            progress_percent: 0,
            started_at: Utc::now(),
        }
    }

    /// Record progress; regressions are clamped so the percentage never
    /// moves backwards within one job.
    pub fn set_progress(&mut self, percent: u8) {
        self.progress_percent = self.progress_percent.max(percent.min(100));
    }

    /// Transition to `Completed` with the final report.
    pub fn complete(&mut self, report: ScanReport) {
        self.set_progress(100);
        self.state = JobState::Completed(report);
    }

    /// Transition to `Failed` with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = JobState::Failed(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_wire_names() {
        assert_eq!(ScanVariant::Quick.as_str(), "quick");
        assert_eq!(ScanVariant::Directory.as_str(), "directory");
        assert_eq!(ScanVariant::Full.as_str(), "full");
        assert_eq!(ScanVariant::parse("FULL"), Some(ScanVariant::Full));
        assert_eq!(ScanVariant::parse("memory"), None);
    }

    #[test]
    fn test_infected_record_wire_format() {
        let record = InfectedFileRecord {
            path: PathBuf::from("/tmp/evil.exe"),
            label: "Trojan.Generic".to_string(),
            hash: "e99a18c428cb38d5f260853678922e03".to_string(),
            size_bytes: 10,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["file"], "/tmp/evil.exe");
        assert_eq!(json["malware"], "Trojan.Generic");
        assert_eq!(json["size"], 10);
    }

    #[test]
    fn test_stats_wire_format() {
        let stats = ScanStats {
            files_scanned: 5,
            files_skipped: 2,
            duration_seconds: 1.5,
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["scanned_files"], 5);
        assert_eq!(json["skipped_files"], 2);
    }

    #[test]
    fn test_probe_outcome_serialization() {
        let ok: ProbeOutcome<u32> = ProbeOutcome::Ready(7);
        assert_eq!(serde_json::to_value(&ok).unwrap(), serde_json::json!(7));

        let failed: ProbeOutcome<u32> = ProbeOutcome::Failed {
            error: "no access".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"error": "no access"})
        );
        assert!(!failed.is_ready());
    }

    #[test]
    fn test_extension_risk() {
        assert_eq!(ExtensionRisk::from_extension("EXE"), ExtensionRisk::Risky);
        assert_eq!(ExtensionRisk::from_extension("txt"), ExtensionRisk::Standard);
    }

    #[test]
    fn test_job_progress_monotonic() {
        let mut job = ScanJob::new(ScanVariant::Quick, None);
        job.set_progress(40);
        job.set_progress(20);
        assert_eq!(job.progress_percent, 40);
        job.set_progress(150);
        assert_eq!(job.progress_percent, 100);
    }

    #[test]
    fn test_job_transitions() {
        let mut job = ScanJob::new(ScanVariant::Directory, Some(PathBuf::from("/tmp")));
        assert!(!job.state.is_terminal());

        job.state = JobState::Running;
        assert!(job.state.is_running());

        job.fail("target missing");
        assert!(job.state.is_terminal());
        assert_eq!(job.state.name(), "failed");
    }

    #[test]
    fn test_report_infected_count() {
        let report = ScanReport::Directory(DirectoryReport {
            directory_scan: FileScanReport {
                infected: vec![InfectedFileRecord {
                    path: PathBuf::from("/a"),
                    label: "X".to_string(),
                    hash: "00".to_string(),
                    size_bytes: 1,
                }],
                stats: ScanStats::default(),
            },
        });
        assert_eq!(report.infected_count(), 1);
        assert_eq!(report.variant(), ScanVariant::Directory);
    }

    #[test]
    fn test_quick_report_flattens_posture() {
        let report = ScanReport::Quick(QuickReport {
            posture: PostureSnapshot {
                system_info: ProbeOutcome::Failed {
                    error: "unavailable".to_string(),
                },
                defender_status: ProbeOutcome::Failed {
                    error: "unavailable".to_string(),
                },
                firewall_status: ProbeOutcome::Ready(FirewallStatus::default()),
                installed_software: ProbeOutcome::Ready(vec![]),
            },
            open_ports: vec![OpenPortRecord {
                port: 80,
                service: "HTTP".to_string(),
            }],
        });

        let json = serde_json::to_value(&report).unwrap();
        // Posture fields sit at the report's top level
        assert_eq!(json["system_info"]["error"], "unavailable");
        assert_eq!(json["firewall_status"]["Domain Profile"], "Unknown");
        assert_eq!(json["open_ports"][0]["port"], 80);
    }
}
