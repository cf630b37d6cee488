// src/proxy/backend.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A backend server as configured: literal host plus port.
///
/// Equality and hashing use the host string exactly as written, so two
/// addresses never compare differently depending on when DNS was consulted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackendAddress {
    host: String,
    port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("backend address `{0}` is missing a `:port` suffix")]
    MissingPort(String),

    #[error("backend address `{0}` has an empty host")]
    EmptyHost(String),

    #[error("backend address `{0}` has an invalid port")]
    InvalidPort(String),

    #[error("backend address `{0}` has an unterminated IPv6 literal")]
    UnterminatedIpv6(String),
}

impl BackendAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for BackendAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();

        let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
            // [v6-literal]:port
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| AddressParseError::UnterminatedIpv6(s.to_string()))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?;
            (host, port)
        } else {
            raw.rsplit_once(':')
                .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?
        };

        if host.is_empty() {
            return Err(AddressParseError::EmptyHost(s.to_string()));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| AddressParseError::InvalidPort(s.to_string()))?;
        if port == 0 {
            return Err(AddressParseError::InvalidPort(s.to_string()));
        }

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for BackendAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackendAddress> for String {
    fn from(addr: BackendAddress) -> Self {
        addr.to_string()
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
