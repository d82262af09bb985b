//! Per-check protocol implementation (spec.md §4.3 "Per-check protocol").

use charon_types::{HeartbeatStatus, MonitorType, UptimeMonitor};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

pub struct CheckOutcome {
    pub status: HeartbeatStatus,
    pub latency_ms: Option<u32>,
    pub message: Option<String>,
}

fn up(elapsed: Duration, message: Option<String>) -> CheckOutcome {
    CheckOutcome {
        status: HeartbeatStatus::Up,
        latency_ms: Some(u32::try_from(elapsed.as_millis()).unwrap_or(u32::MAX)),
        message,
    }
}

fn down(message: String) -> CheckOutcome {
    CheckOutcome { status: HeartbeatStatus::Down, latency_ms: None, message: Some(message) }
}

/// `http`/`https`: GET within the deadline; 2xx/3xx is up.
async fn check_http(url: &str, deadline: Duration) -> CheckOutcome {
    let client = match reqwest::Client::builder().timeout(deadline).build() {
        Ok(c) => c,
        Err(err) => return down(format!("client build failed: {err}")),
    };

    let started = Instant::now();
    match client.get(url).send().await {
        Ok(resp) if resp.status().is_success() || resp.status().is_redirection() => {
            up(started.elapsed(), None)
        },
        Ok(resp) => down(format!("unexpected status {}", resp.status())),
        Err(err) if err.is_timeout() => down("timed out".to_string()),
        Err(err) => down(err.to_string()),
    }
}

/// `tcp`: a bare connect within the deadline; latency is connect time.
async fn check_tcp(host: &str, port: u16, deadline: Duration) -> CheckOutcome {
    let started = Instant::now();
    match tokio::time::timeout(deadline, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => up(started.elapsed(), None),
        Ok(Err(err)) => down(err.to_string()),
        Err(_) => down("timed out".to_string()),
    }
}

/// `ping`: ICMP echo requires a raw socket, unavailable to an unprivileged
/// process; falls back to a TCP connect to a well-known port and records
/// the fallback in the heartbeat message (spec.md §4.3).
async fn check_ping(host: &str, deadline: Duration) -> CheckOutcome {
    const FALLBACK_PORT: u16 = 80;
    let mut outcome = check_tcp(host, FALLBACK_PORT, deadline).await;
    let note = format!("icmp unavailable, fell back to tcp:{FALLBACK_PORT}");
    outcome.message = Some(match outcome.message {
        Some(existing) => format!("{note}: {existing}"),
        None => note,
    });
    outcome
}

fn parse_host_port(url: &str, default_port: u16) -> (String, u16) {
    let without_scheme = url.rsplit("://").next().unwrap_or(url);
    let authority = without_scheme.split('/').next().unwrap_or(without_scheme);
    match authority.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(default_port)),
        None => (authority.to_string(), default_port),
    }
}

/// Runs one check for the monitor's configured type against its stored URL.
pub async fn run_check(monitor: &UptimeMonitor) -> CheckOutcome {
    let deadline = monitor.check_deadline();
    match monitor.kind {
        MonitorType::Http | MonitorType::Https => check_http(&monitor.url, deadline).await,
        MonitorType::Tcp => {
            let (host, port) = parse_host_port(&monitor.url, 80);
            check_tcp(&host, port, deadline).await
        },
        MonitorType::Ping => {
            let (host, _) = parse_host_port(&monitor.url, 80);
            check_ping(&host, deadline).await
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_port_handles_scheme_and_path() {
        assert_eq!(parse_host_port("https://example.com/health", 443), ("example.com".to_string(), 443));
        assert_eq!(parse_host_port("example.com:8080", 80), ("example.com".to_string(), 8080));
        assert_eq!(parse_host_port("10.0.0.1", 53), ("10.0.0.1".to_string(), 53));
    }
}
