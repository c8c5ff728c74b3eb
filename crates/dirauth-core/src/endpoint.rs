//! Directory server endpoints
//!
//! Endpoints are configured as a comma separated list of `ldap://` or
//! `ldaps://` URLs with an optional port, e.g.
//! `ldaps://dc1.example.com, ldap://dc2.example.com:3389`.
//! The list is parsed once and never changes afterwards.

use crate::error::{Error, Result};
use std::fmt;
use tracing::debug;
use url::Url;

/// Default port for plain LDAP
pub const LDAP_PORT: u16 = 389;

/// Default port for LDAP over TLS
pub const LDAPS_PORT: u16 = 636;

/// A single directory server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: Option<u16>,
    secure: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: Option<u16>, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
        }
    }

    /// Parse a single `ldap://host[:port]` or `ldaps://host[:port]` entry
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| {
            Error::MalformedConfiguration(format!("server ({}) is not a valid URL: {}", raw, e))
        })?;

        let secure = match url.scheme() {
            "ldap" => false,
            "ldaps" => true,
            _ => {
                return Err(Error::MalformedConfiguration(format!(
                    "server ({}) must start with either ldap:// or ldaps://",
                    raw
                )))
            }
        };

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => {
                return Err(Error::MalformedConfiguration(format!(
                    "failed to parse a hostname from {}",
                    raw
                )))
            }
        };

        if !url.username().is_empty() || url.password().is_some() {
            return Err(Error::MalformedConfiguration(format!(
                "server ({}) must not carry credentials",
                raw
            )));
        }

        if !(url.path().is_empty() || url.path() == "/")
            || url.query().is_some()
            || url.fragment().is_some()
        {
            return Err(Error::MalformedConfiguration(format!(
                "server ({}) must be a bare host with an optional port",
                raw
            )));
        }

        Ok(Self::new(host, url.port(), secure))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Configured port, or the transport default when unset
    pub fn port(&self) -> u16 {
        self.port
            .unwrap_or(if self.secure { LDAPS_PORT } else { LDAP_PORT })
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// URL suitable for handing to the directory client
    pub fn url(&self) -> String {
        let scheme = if self.secure { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Ordered, non-empty list of endpoints tried in declared order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    /// Parse a comma separated endpoint list.
    ///
    /// Fails with [`Error::MalformedConfiguration`] on an empty list or on
    /// any entry that does not parse; nothing is contacted here.
    pub fn parse(servers: &str) -> Result<Self> {
        let mut endpoints = Vec::new();

        for raw in servers.split(',').map(str::trim) {
            if raw.is_empty() {
                if servers.trim().is_empty() {
                    break;
                }
                return Err(Error::MalformedConfiguration(format!(
                    "empty entry in server list \"{}\"",
                    servers
                )));
            }
            let endpoint = Endpoint::parse(raw)?;
            debug!(endpoint = %endpoint, "Found a server in directory configuration");
            endpoints.push(endpoint);
        }

        Self::new(endpoints)
    }

    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::MalformedConfiguration(
                "at least one server prefixed with ldap:// or ldaps:// is required".to_string(),
            ));
        }
        Ok(Self { endpoints })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Endpoint> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl<'a> IntoIterator for &'a EndpointSet {
    type Item = &'a Endpoint;
    type IntoIter = std::slice::Iter<'a, Endpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
