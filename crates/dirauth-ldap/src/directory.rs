//! Directory client abstraction
//!
//! The wire protocol lives behind [`DirectoryClient`] and [`DirectorySession`].
//! Every bind and search reports a tagged outcome so callers branch on the
//! tag instead of inspecting result codes.

use async_trait::async_trait;
use dirauth_core::Endpoint;
use std::fmt;
use std::time::Duration;

/// Transport settings applied to every connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectSettings {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Skip certificate validation on secure endpoints
    pub trust_any_secured_host: bool,
    /// Upgrade plain endpoints with STARTTLS
    pub start_tls: bool,
}

/// Why a directory operation could not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryFault {
    /// Unreachable host, timeout, TLS negotiation failure
    Transport(String),
    /// The server answered with an unexpected result code
    Protocol { code: u32, message: String },
}

impl fmt::Display for DirectoryFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryFault::Transport(detail) => write!(f, "transport error: {}", detail),
            DirectoryFault::Protocol { code, message } if message.is_empty() => {
                write!(f, "result code {}", code)
            }
            DirectoryFault::Protocol { code, message } => {
                write!(f, "result code {}: {}", code, message)
            }
        }
    }
}

/// Result of a simple bind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    Success,
    /// The directory refused the identity/secret pair
    Rejected,
    Failed(DirectoryFault),
}

/// Search filter understood by every client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `(attribute=value)`, value matched literally
    Equality { attribute: String, value: String },
}

impl Filter {
    pub fn equality(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equality {
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Equality { attribute, value } => write!(f, "({}={})", attribute, value),
        }
    }
}

/// One search result. Searches request no attributes, only the DN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
}

/// Opens sessions against a single endpoint
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    type Session: DirectorySession;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        settings: &ConnectSettings,
    ) -> Result<Self::Session, DirectoryFault>;
}

/// An open connection to one directory server
#[async_trait]
pub trait DirectorySession: Send {
    async fn bind(&mut self, dn: &str, secret: &str) -> BindOutcome;

    /// Subtree search below `base`, results in server order
    async fn search(
        &mut self,
        base: &str,
        filter: &Filter,
    ) -> Result<Vec<DirectoryEntry>, DirectoryFault>;

    /// Release the connection. Must be safe to call on a failed session.
    async fn close(&mut self);
}
