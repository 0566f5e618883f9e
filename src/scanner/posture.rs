//! Host security posture probes.
//!
//! Each probe is an independent best-effort query: it either produces a
//! structured snapshot section or an explicit error marker, and never
//! propagates a failure past its own boundary. Probes shell out to platform
//! tools, so every parser is a pure function over captured output.

use crate::core::types::{
    FirewallProfileState, FirewallStatus, PostureSnapshot, ProbeOutcome, ProtectionFlags,
    SoftwareEntry, SystemInfo,
};
use crate::detection::VulnerabilityAdvisories;
use std::process::Command;
use std::sync::Arc;

/// Runs the posture probe set.
pub struct PostureProbes {
    advisories: Arc<VulnerabilityAdvisories>,
}

impl PostureProbes {
    /// Create a probe set using the given advisory table.
    pub fn new(advisories: Arc<VulnerabilityAdvisories>) -> Self {
        Self { advisories }
    }

    /// Run all probes. Probes fail independently; the snapshot is valid
    /// even when every section carries an error marker.
    pub fn collect(&self) -> PostureSnapshot {
        log::info!("Collecting host posture snapshot");
        let snapshot = PostureSnapshot {
            system_info: ProbeOutcome::from_result(probe_system_info()),
            defender_status: ProbeOutcome::from_result(probe_protection_status()),
            firewall_status: ProbeOutcome::from_result(probe_firewall_status()),
            installed_software: ProbeOutcome::from_result(self.probe_installed_software()),
        };

        log::debug!(
            "Posture probes: system_info={} defender={} firewall={} software={}",
            snapshot.system_info.is_ready(),
            snapshot.defender_status.is_ready(),
            snapshot.firewall_status.is_ready(),
            snapshot.installed_software.is_ready(),
        );
        snapshot
    }

    /// Inventory installed software and flag known-vulnerable entries.
    fn probe_installed_software(&self) -> Result<Vec<SoftwareEntry>, String> {
        let inventory = raw_software_inventory()?;
        Ok(classify_software(inventory, &self.advisories))
    }
}

impl Default for PostureProbes {
    fn default() -> Self {
        Self::new(Arc::new(VulnerabilityAdvisories::builtin()))
    }
}

/// Run a command and capture stdout as text.
fn command_output(program: &str, args: &[&str]) -> Result<String, String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| format!("failed to run {}: {}", program, e))?;

    if !output.status.success() {
        return Err(format!("{} exited with {}", program, output.status));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ===== System info =====

fn probe_system_info() -> Result<SystemInfo, String> {
    let hostname = hostname();
    let scan_time = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

    #[cfg(windows)]
    {
        let os_edition = command_output("wmic", &["os", "get", "Caption"])
            .ok()
            .and_then(|out| parse_wmic_value(&out));
        let os_version = command_output("wmic", &["os", "get", "Version"])
            .ok()
            .and_then(|out| parse_wmic_value(&out))
            .unwrap_or_else(|| "Unknown".to_string());
        let processor = command_output("wmic", &["cpu", "get", "Name"])
            .ok()
            .and_then(|out| parse_wmic_value(&out));
        let ram_gb = command_output("wmic", &["ComputerSystem", "get", "TotalPhysicalMemory"])
            .ok()
            .and_then(|out| parse_wmic_value(&out))
            .and_then(|bytes| bytes.parse::<u64>().ok())
            .map(|bytes| round2(bytes as f64 / f64::from(1u32 << 30)));

        Ok(SystemInfo {
            hostname,
            os_name: "Windows".to_string(),
            platform: format!("Windows {}", os_version),
            os_version,
            os_edition,
            processor,
            ram_gb,
            username: std::env::var("USERNAME").ok(),
            scan_time,
        })
    }

    #[cfg(not(windows))]
    {
        let os_name = command_output("uname", &["-s"])
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| std::env::consts::OS.to_string());
        let os_version = command_output("uname", &["-r"])
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "Unknown".to_string());
        let machine = command_output("uname", &["-m"])
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| std::env::consts::ARCH.to_string());

        let processor = std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|text| parse_cpu_model(&text));
        let ram_gb = std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|text| parse_meminfo_total_gb(&text));

        Ok(SystemInfo {
            hostname,
            platform: format!("{} {} {}", os_name, os_version, machine),
            os_name,
            os_version,
            os_edition: None,
            processor,
            ram_gb,
            username: std::env::var("USER").ok(),
            scan_time,
        })
    }
}

fn hostname() -> String {
    if let Ok(out) = command_output("hostname", &[]) {
        let trimmed = out.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Extract the value line from `wmic <class> get <property>` output:
/// a header line followed by the value.
fn parse_wmic_value(output: &str) -> Option<String> {
    output
        .lines()
        .skip(1)
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Pull the first `model name` entry out of /proc/cpuinfo.
fn parse_cpu_model(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .find(|line| line.starts_with("model name"))
        .and_then(|line| line.split(':').nth(1))
        .map(|v| v.trim().to_string())
}

/// Convert /proc/meminfo's MemTotal (kB) to GiB, rounded to two decimals.
fn parse_meminfo_total_gb(meminfo: &str) -> Option<f64> {
    meminfo
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| round2(kb as f64 / (1024.0 * 1024.0)))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ===== Real-time protection =====

#[cfg(windows)]
fn probe_protection_status() -> Result<ProtectionFlags, String> {
    let output = command_output(
        "powershell",
        &[
            "-NoProfile",
            "-Command",
            "Get-MpComputerStatus | Select-Object AntivirusEnabled,RealTimeProtectionEnabled,IoavProtectionEnabled,AntispywareEnabled | Format-List",
        ],
    )?;
    let flags = parse_protection_flags(&output);
    if flags.is_empty() {
        return Err("could not retrieve real-time protection status".to_string());
    }
    Ok(flags)
}

#[cfg(not(windows))]
fn probe_protection_status() -> Result<ProtectionFlags, String> {
    Err("real-time protection status is not available on this platform".to_string())
}

/// Parse `Key : True` lines into coarse boolean flags.
fn parse_protection_flags(output: &str) -> ProtectionFlags {
    let mut flags = ProtectionFlags::new();
    for line in output.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                continue;
            }
            flags.insert(key.to_string(), value.eq_ignore_ascii_case("true"));
        }
    }
    flags
}

// ===== Firewall profiles =====

#[cfg(windows)]
fn probe_firewall_status() -> Result<FirewallStatus, String> {
    let output = command_output("netsh", &["advfirewall", "show", "allprofiles", "state"])?;
    Ok(parse_firewall_profiles(&output))
}

#[cfg(not(windows))]
fn probe_firewall_status() -> Result<FirewallStatus, String> {
    Err("firewall status probe is not available on this platform".to_string())
}

/// Parse `netsh advfirewall show allprofiles state` output.
///
/// Sections look like:
/// ```text
/// Domain Profile Settings:
/// ----------------------------------------------------------------------
/// State                                 ON
/// ```
/// Profiles that never report a state stay `Unknown`.
fn parse_firewall_profiles(output: &str) -> FirewallStatus {
    #[derive(Clone, Copy)]
    enum Profile {
        Domain,
        Private,
        Public,
    }

    let mut status = FirewallStatus::default();
    let mut current: Option<Profile> = None;

    for line in output.lines() {
        let line = line.trim();

        if line.starts_with("Domain Profile") {
            current = Some(Profile::Domain);
        } else if line.starts_with("Private Profile") {
            current = Some(Profile::Private);
        } else if line.starts_with("Public Profile") {
            current = Some(Profile::Public);
        } else if line.starts_with("State") {
            let state = if line.contains("ON") {
                FirewallProfileState::Enabled
            } else if line.contains("OFF") {
                FirewallProfileState::Disabled
            } else {
                FirewallProfileState::Unknown
            };
            match current.take() {
                Some(Profile::Domain) => status.domain = state,
                Some(Profile::Private) => status.private = state,
                Some(Profile::Public) => status.public = state,
                None => {}
            }
        }
    }

    status
}

// ===== Installed software =====

#[cfg(windows)]
fn raw_software_inventory() -> Result<Vec<(String, String)>, String> {
    let output = command_output("wmic", &["product", "get", "name,version"])?;
    Ok(parse_software_table(&output))
}

#[cfg(target_os = "linux")]
fn raw_software_inventory() -> Result<Vec<(String, String)>, String> {
    let output = command_output(
        "dpkg-query",
        &["-W", "-f", "${Package}\\t${Version}\\n"],
    )?;
    Ok(parse_dpkg_table(&output))
}

#[cfg(not(any(windows, target_os = "linux")))]
fn raw_software_inventory() -> Result<Vec<(String, String)>, String> {
    Err("software inventory is not available on this platform".to_string())
}

/// Parse `wmic product get name,version` output: a header row, then rows of
/// whitespace-separated columns where the version is the last token.
fn parse_software_table(output: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for line in output.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        let (name, version) = if parts.len() > 1 {
            (parts[..parts.len() - 1].join(" "), parts[parts.len() - 1])
        } else {
            (parts[0].to_string(), "Unknown")
        };
        if name.is_empty() {
            continue;
        }
        entries.push((name, version.to_string()));
    }
    entries
}

/// Parse tab-separated `dpkg-query -W` output.
fn parse_dpkg_table(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let (name, version) = line.split_once('\t')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let version = version.trim();
            let version = if version.is_empty() { "Unknown" } else { version };
            Some((name.to_string(), version.to_string()))
        })
        .collect()
}

/// Cross-reference an inventory against the advisory table.
fn classify_software(
    inventory: Vec<(String, String)>,
    advisories: &VulnerabilityAdvisories,
) -> Vec<SoftwareEntry> {
    inventory
        .into_iter()
        .map(|(name, version)| {
            let advisory = advisories.lookup(&name);
            if let Some(info) = advisory {
                log::warn!(
                    "Potentially vulnerable software: {} {} ({})",
                    name,
                    version,
                    info
                );
            }
            SoftwareEntry {
                vulnerable: advisory.is_some(),
                vulnerability_info: advisory.map(str::to_string),
                name,
                version,
            }
        })
        .collect()
}
