//! Local TCP port exposure probing.

use crate::core::config::PortScanConfig;
use crate::core::error::{Error, Result};
use crate::core::types::OpenPortRecord;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;

/// Static port to service-name table.
const SERVICE_NAMES: &[(u16, &str)] = &[
    (20, "FTP-Data"),
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (135, "RPC"),
    (139, "NetBIOS"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (1433, "MSSQL"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (5900, "VNC"),
    (8080, "HTTP-Alt"),
    (8443, "HTTPS-Alt"),
];

/// TCP connect prober for the local host.
///
/// A port is "open" iff a connect attempt succeeds within the configured
/// timeout; refusal or timeout just means "closed". Probes run under a fixed
/// concurrency bound and the result list is sorted ascending for
/// determinism.
pub struct PortScanner {
    config: PortScanConfig,
    host: IpAddr,
    cancelled: Arc<AtomicBool>,
}

impl PortScanner {
    /// Create a scanner probing the loopback interface.
    pub fn new(config: PortScanConfig) -> Self {
        Self {
            config,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a scanner sharing an externally owned cancellation flag.
    pub fn with_cancel_flag(config: PortScanConfig, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            config,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            cancelled,
        }
    }

    /// Request cancellation; observed before each probe is dispatched.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Look up the service name for a port.
    pub fn service_name(port: u16) -> &'static str {
        SERVICE_NAMES
            .iter()
            .find(|(p, _)| *p == port)
            .map(|(_, name)| *name)
            .unwrap_or("Unknown")
    }

    /// The deduplicated, ascending list of ports this scanner will probe:
    /// the contiguous range plus the supplementary set.
    pub fn build_port_list(&self) -> Vec<u16> {
        let mut ports: BTreeSet<u16> = (1..=self.config.range_end).collect();
        ports.extend(self.config.extra_ports.iter().copied().filter(|p| *p > 0));
        ports.into_iter().collect()
    }

    /// Probe all configured ports and return the open ones, sorted ascending.
    pub async fn scan(&self) -> Result<Vec<OpenPortRecord>> {
        let ports = self.build_port_list();
        log::info!(
            "Probing {} ports on {} ({}ms timeout, {} concurrent)",
            ports.len(),
            self.host,
            self.config.connect_timeout_ms,
            self.config.concurrency
        );

        let sem = Arc::new(Semaphore::new(self.config.concurrency.clamp(1, 1024)));
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let mut set = JoinSet::new();

        for port in ports {
            if self.cancelled.load(Ordering::SeqCst) {
                break;
            }

            let permit = sem
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| Error::Internal("probe semaphore closed".to_string()))?;
            let host = self.host;

            set.spawn(async move {
                let _permit = permit; // held until the probe completes

                let addr = SocketAddr::new(host, port);
                match time::timeout(timeout, TcpStream::connect(addr)).await {
                    Ok(Ok(_stream)) => Some(port),
                    // Refused, filtered or timed out: closed, not an error
                    _ => None,
                }
            });
        }

        let mut open = Vec::new();
        while let Some(res) = set.join_next().await {
            if let Ok(Some(port)) = res {
                log::debug!("Found open port: {} ({})", port, Self::service_name(port));
                open.push(port);
            }
        }

        if self.cancelled.load(Ordering::SeqCst) {
            return Err(Error::ScanCancelled);
        }

        open.sort_unstable();
        open.dedup();

        Ok(open
            .into_iter()
            .map(|port| OpenPortRecord {
                port,
                service: Self::service_name(port).to_string(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn small_config(extra_ports: Vec<u16>) -> PortScanConfig {
        PortScanConfig {
            range_end: 1,
            extra_ports,
            connect_timeout_ms: 500,
            concurrency: 16,
        }
    }

    #[test]
    fn test_service_names() {
        assert_eq!(PortScanner::service_name(80), "HTTP");
        assert_eq!(PortScanner::service_name(22), "SSH");
        assert_eq!(PortScanner::service_name(3306), "MySQL");
        assert_eq!(PortScanner::service_name(49152), "Unknown");
    }

    #[test]
    fn test_port_list_deduplicated_and_sorted() {
        let scanner = PortScanner::new(PortScanConfig::default());
        let ports = scanner.build_port_list();

        // 1..=1024 plus seven supplementary ports, all above the range
        assert_eq!(ports.len(), 1024 + 7);
        assert_eq!(ports.first(), Some(&1));
        assert_eq!(ports.last(), Some(&8443));

        let mut sorted = ports.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(ports, sorted);
    }

    #[test]
    fn test_port_list_extras_overlapping_range() {
        let scanner = PortScanner::new(PortScanConfig {
            range_end: 1024,
            extra_ports: vec![80, 443, 8080],
            connect_timeout_ms: 500,
            concurrency: 16,
        });
        let ports = scanner.build_port_list();
        // 80 and 443 fall inside the range and must not be duplicated
        assert_eq!(ports.len(), 1024 + 1);
        assert_eq!(ports.iter().filter(|p| **p == 80).count(), 1);
    }

    #[tokio::test]
    async fn test_detects_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let scanner = PortScanner::new(small_config(vec![port]));
        let open = scanner.scan().await.unwrap();

        assert!(open.iter().any(|r| r.port == port));
        // Ephemeral ports are outside the static table
        let record = open.iter().find(|r| r.port == port).unwrap();
        assert_eq!(record.service, "Unknown");
    }

    #[tokio::test]
    async fn test_closed_port_not_reported() {
        // Bind then drop to get a port that is almost certainly closed
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let scanner = PortScanner::new(small_config(vec![port]));
        let open = scanner.scan().await.unwrap();

        assert!(open.iter().all(|r| r.port != port));
    }

    #[tokio::test]
    async fn test_results_sorted_ascending() {
        let a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let b = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port_a = a.local_addr().unwrap().port();
        let port_b = b.local_addr().unwrap().port();

        let scanner = PortScanner::new(small_config(vec![port_a.max(port_b), port_a.min(port_b)]));
        let open = scanner.scan().await.unwrap();

        let ports: Vec<u16> = open.iter().map(|r| r.port).collect();
        let mut sorted = ports.clone();
        sorted.sort_unstable();
        assert_eq!(ports, sorted);
        assert!(ports.contains(&port_a) && ports.contains(&port_b));
    }

    #[tokio::test]
    async fn test_cancelled_scan() {
        let scanner = PortScanner::new(small_config(vec![]));
        scanner.cancel();
        let err = scanner.scan().await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
