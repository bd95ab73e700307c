//! Remote transport seam.
//!
//! `Transport::dial` -> `RemoteHandle` (one authenticated session per host).
//! `client` holds the libssh2-backed implementation; tests swap in `fake`.
//! Helpers: split_host_port / parse_port / parse_timeout / DialTarget::parse.
//!
use anyhow::{Context, Result, bail};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

pub mod client;
#[cfg(test)]
pub mod fake;

pub use client::SshTransport;

pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Everything needed to open one session: a single password credential plus
/// the address and the dial timeout.
#[derive(Clone)]
pub struct DialTarget {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl DialTarget {
    /// Build a target from the raw textual `connect` arguments.
    ///
    /// - `host` may carry its own port (`host:2222`, `[::1]:2222`).
    /// - A non-empty `port` argument overrides the embedded one.
    /// - Empty `port` / `timeout` fall back to the supplied defaults.
    pub fn parse(
        user: &str,
        password: &str,
        host: &str,
        port: &str,
        timeout: &str,
        default_port: u16,
        default_timeout_secs: u64,
    ) -> Result<Self> {
        let (name, embedded) = split_host_port(host)?;
        let port = if port.trim().is_empty() {
            embedded.unwrap_or(default_port)
        } else {
            parse_port(port)?
        };
        Ok(DialTarget {
            user: user.to_string(),
            password: password.to_string(),
            host: name,
            port,
            timeout: parse_timeout(timeout, default_timeout_secs)?,
        })
    }

    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

// Password stays out of Debug output.
impl fmt::Debug for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialTarget")
            .field("user", &self.user)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl fmt::Display for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.addr())
    }
}

/// Split `host[:port]`. Bracketed IPv6 (`[::1]:22`) is supported; a bare IPv6
/// literal with several colons is taken as a host without port.
pub fn split_host_port(raw: &str) -> Result<(String, Option<u16>)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("host is empty");
    }
    if let Some(rest) = trimmed.strip_prefix('[') {
        let Some((host, tail)) = rest.split_once(']') else {
            bail!("unterminated '[' in host '{trimmed}'");
        };
        let port = match tail.strip_prefix(':') {
            Some(p) => Some(parse_port(p)?),
            None if tail.is_empty() => None,
            None => bail!("unexpected trailing text in host '{trimmed}'"),
        };
        return Ok((host.to_string(), port));
    }
    match trimmed.matches(':').count() {
        0 => Ok((trimmed.to_string(), None)),
        1 => {
            let (host, port) = trimmed.split_once(':').unwrap_or((trimmed, ""));
            if host.is_empty() {
                bail!("host is empty in '{trimmed}'");
            }
            Ok((host.to_string(), Some(parse_port(port)?)))
        }
        _ => Ok((trimmed.to_string(), None)),
    }
}

pub fn parse_port(raw: &str) -> Result<u16> {
    let port: u16 = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid port '{raw}'"))?;
    if port == 0 {
        bail!("invalid port '{raw}'");
    }
    Ok(port)
}

/// Seconds as text; empty means `default_secs`.
pub fn parse_timeout(raw: &str, default_secs: u64) -> Result<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Duration::from_secs(default_secs));
    }
    let secs: u64 = raw
        .parse()
        .with_context(|| format!("invalid timeout '{raw}'"))?;
    Ok(Duration::from_secs(secs))
}

/// Opens sessions. Implementations must be shareable across fan-out units.
pub trait Transport: Send + Sync {
    fn dial(&self, target: &DialTarget) -> Result<Box<dyn RemoteHandle>>;
}

/// One authenticated session to a host. Every call opens its own channel, so
/// a handle can serve a command and a transfer one after the other.
pub trait RemoteHandle: Send + Sync {
    /// Run `command` and capture its stdout. Non-zero exit is an error.
    fn output(&self, command: &str) -> Result<String>;

    /// Run `command`, copying its stdout into `sink` as it arrives.
    fn stream(&self, command: &str, sink: &mut dyn Write) -> Result<()>;

    /// Copy the local file to `remote` (full destination path). Returns bytes sent.
    fn upload(&self, local: &Path, remote: &str) -> Result<u64>;

    /// Copy `remote` into the local file `local`. Returns bytes received.
    fn download(&self, remote: &str, local: &Path) -> Result<u64>;

    fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_plain_host() {
        let (h, p) = split_host_port("10.0.0.1").unwrap();
        assert_eq!(h, "10.0.0.1");
        assert_eq!(p, None);
    }

    #[test]
    fn split_host_with_port() {
        let (h, p) = split_host_port("web1:2222").unwrap();
        assert_eq!(h, "web1");
        assert_eq!(p, Some(2222));
    }

    #[test]
    fn split_bracketed_ipv6() {
        let (h, p) = split_host_port("[::1]:2200").unwrap();
        assert_eq!(h, "::1");
        assert_eq!(p, Some(2200));
        let (h, p) = split_host_port("fe80::1").unwrap();
        assert_eq!(h, "fe80::1");
        assert_eq!(p, None);
    }

    #[test]
    fn split_rejects_bad_port() {
        assert!(split_host_port("web1:ssh").is_err());
        assert!(split_host_port(":22").is_err());
        assert!(split_host_port("  ").is_err());
    }

    #[test]
    fn dial_target_defaults() {
        let t = DialTarget::parse("root", "pw", "h1", "", "", 22, 5).unwrap();
        assert_eq!(t.port, 22);
        assert_eq!(t.timeout, Duration::from_secs(5));
        assert_eq!(t.addr(), "h1:22");
        assert_eq!(t.to_string(), "root@h1:22");
    }

    #[test]
    fn explicit_port_wins_over_embedded() {
        let t = DialTarget::parse("root", "pw", "h1:2022", "2200", "9", 22, 5).unwrap();
        assert_eq!(t.port, 2200);
        assert_eq!(t.timeout, Duration::from_secs(9));
        let t = DialTarget::parse("root", "pw", "h1:2022", "", "", 22, 5).unwrap();
        assert_eq!(t.port, 2022);
    }

    #[test]
    fn malformed_numbers_rejected() {
        assert!(DialTarget::parse("u", "p", "h", "abc", "", 22, 5).is_err());
        assert!(DialTarget::parse("u", "p", "h", "", "soon", 22, 5).is_err());
        assert!(DialTarget::parse("u", "p", "h", "0", "", 22, 5).is_err());
    }

    #[test]
    fn debug_hides_password() {
        let t = DialTarget::parse("root", "hunter2", "h1", "", "", 22, 5).unwrap();
        assert!(!format!("{t:?}").contains("hunter2"));
    }
}
