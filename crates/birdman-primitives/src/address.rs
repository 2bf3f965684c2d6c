//! Peer network addresses
//!
//! A peer is identified by the canonical string `host:port`, where `host` is
//! wrapped in brackets for IPv6 literals. Two addresses name the same peer iff
//! their canonical strings are equal; no semantic IP comparison is done.

use std::fmt;
use std::net::{Ipv6Addr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of a DNS hostname
const MAX_HOSTNAME_LEN: usize = 253;

/// Maximum length of a single DNS label
const MAX_LABEL_LEN: usize = 63;

/// Address parsing error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// No `:port` suffix
    #[error("missing port in address: {0}")]
    MissingPort(String),
    /// Port is not a canonical decimal number in `0..=65535`
    #[error("invalid port: {0}")]
    InvalidPort(String),
    /// Empty host
    #[error("empty host in address: {0}")]
    EmptyHost(String),
    /// IPv6 literal is not bracketed
    #[error("IPv6 host must be bracketed: {0}")]
    MissingBrackets(String),
}

/// Address family of a peer host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// Dotted-quad IPv4 literal
    Ipv4,
    /// IPv6 literal (stored without brackets)
    Ipv6,
    /// DNS hostname
    Dns,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => write!(f, "IPv4"),
            Self::Ipv6 => write!(f, "IPv6"),
            Self::Dns => write!(f, "DNS"),
        }
    }
}

/// Network address of a peer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    host: String,
    family: AddressFamily,
    port: u16,
}

impl PeerAddress {
    /// Create from parts
    pub fn new(host: impl Into<String>, family: AddressFamily, port: u16) -> Self {
        Self {
            host: host.into(),
            family,
            port,
        }
    }

    /// Parse a canonical address string.
    ///
    /// More than one `:` means an IPv6 literal: everything before the last `:`
    /// must be `[...]`. Otherwise the string is split once on `:` and the host
    /// is classified as IPv4 if it is a strict dotted quad, else DNS.
    ///
    /// Parsing is structural only; use [`PeerAddress::is_valid`] to check the
    /// host against its family.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let colons = s.matches(':').count();
        if colons > 1 {
            let idx = s.rfind(':').ok_or_else(|| AddressError::MissingPort(s.into()))?;
            let (host_part, port_part) = (&s[..idx], &s[idx + 1..]);
            let host = host_part
                .strip_prefix('[')
                .and_then(|h| h.strip_suffix(']'))
                .ok_or_else(|| AddressError::MissingBrackets(s.into()))?;
            if host.is_empty() {
                return Err(AddressError::EmptyHost(s.into()));
            }
            let port = parse_port(port_part)?;
            return Ok(Self::new(host, AddressFamily::Ipv6, port));
        }

        let (host, port_part) = s
            .split_once(':')
            .ok_or_else(|| AddressError::MissingPort(s.into()))?;
        if host.is_empty() {
            return Err(AddressError::EmptyHost(s.into()));
        }
        let port = parse_port(port_part)?;
        let family = if is_ipv4_literal(host) {
            AddressFamily::Ipv4
        } else {
            AddressFamily::Dns
        };
        Ok(Self::new(host, family, port))
    }

    /// Build from a transport endpoint
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::new(v4.ip().to_string(), AddressFamily::Ipv4, v4.port()),
            SocketAddr::V6(v6) => Self::new(v6.ip().to_string(), AddressFamily::Ipv6, v6.port()),
        }
    }

    /// Host part (IPv6 without brackets)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Address family
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Check that the host matches the grammar of its declared family.
    pub fn is_valid(&self) -> bool {
        match self.family {
            AddressFamily::Ipv4 => is_ipv4_literal(&self.host),
            AddressFamily::Ipv6 => is_ipv6_literal(&self.host),
            AddressFamily::Dns => is_dns_hostname(&self.host),
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family {
            AddressFamily::Ipv6 => write!(f, "[{}]:{}", self.host, self.port),
            _ => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

impl fmt::Debug for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerAddress({}, {})", self, self.family)
    }
}

impl FromStr for PeerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::from_socket_addr(addr)
    }
}

/// Canonical decimal port: digits only, no leading zeros, fits in `u16`.
fn parse_port(s: &str) -> Result<u16, AddressError> {
    let canonical = !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit())
        && (s == "0" || !s.starts_with('0'));
    if !canonical {
        return Err(AddressError::InvalidPort(s.into()));
    }
    s.parse::<u16>().map_err(|_| AddressError::InvalidPort(s.into()))
}

/// Strict dotted quad: four octets `0..=255`, no leading zeros.
fn is_ipv4_literal(host: &str) -> bool {
    let octets: Vec<&str> = host.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|o| {
            !o.is_empty()
                && o.len() <= 3
                && o.bytes().all(|b| b.is_ascii_digit())
                && (o.len() == 1 || !o.starts_with('0'))
                && o.parse::<u16>().map(|v| v <= 255).unwrap_or(false)
        })
}

fn is_ipv6_literal(host: &str) -> bool {
    Ipv6Addr::from_str(host).is_ok()
}

/// RFC 1123 hostname: dot-separated labels of alphanumerics and inner hyphens.
fn is_dns_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOSTNAME_LEN {
        return false;
    }
    host.split('.').all(|label| {
        let bytes = label.as_bytes();
        match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                bytes.len() <= MAX_LABEL_LEN
                    && first.is_ascii_alphanumeric()
                    && last.is_ascii_alphanumeric()
                    && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
            }
            _ => false,
        }
    })
}
