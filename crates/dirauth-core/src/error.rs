//! Error types for dirauth

use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// A single failed attempt against one configured endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailure {
    /// Endpoint as configured, e.g. `ldaps://dc1.example.com:636`
    pub endpoint: String,
    /// Why the attempt was abandoned
    pub reason: String,
}

impl fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.endpoint, self.reason)
    }
}

fn format_failures(failures: &[EndpointFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum Error {
    // Configuration Errors
    #[error("Malformed configuration: {0}")]
    MalformedConfiguration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Directory Errors
    #[error("Unable to connect to any directory server: {}", format_failures(.0))]
    ConnectivityFailure(Vec<EndpointFailure>),

    #[error("Directory error during {operation}: {detail}")]
    DirectoryProtocol { operation: String, detail: String },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{matches} directory entries match username {username}")]
    AmbiguousIdentity { username: String, matches: usize },

    #[error("Operation exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::MalformedConfiguration(_) => "MalformedConfiguration",
            Error::Config(_) => "MalformedConfiguration",
            Error::ConnectivityFailure(_) => "ConnectivityFailure",
            Error::DirectoryProtocol { .. } => "DirectoryProtocolError",
            Error::InvalidCredentials => "InvalidCredentials",
            Error::AmbiguousIdentity { .. } => "AmbiguousIdentity",
            Error::DeadlineExceeded(_) => "DeadlineExceeded",
        }
    }

    /// Whether this error means the directory could not be trusted to answer,
    /// as opposed to an answer that rejected the caller.
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, Error::InvalidCredentials)
    }
}

/// Step of the authentication flow that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    ResolveDn,
    Verify,
    ResolveMemberships,
}

impl fmt::Display for AuthStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthStep::ResolveDn => "DN resolution",
            AuthStep::Verify => "credential verification",
            AuthStep::ResolveMemberships => "membership resolution",
        };
        f.write_str(name)
    }
}

/// The directory could not produce a trustworthy answer.
///
/// Distinct from a rejected login: callers should surface this as
/// "service unavailable", never as "access denied".
#[derive(Error, Debug)]
#[error("Authentication unavailable during {step}: {source}")]
pub struct AuthenticationUnavailable {
    pub step: AuthStep,
    #[source]
    pub source: Error,
}

impl AuthenticationUnavailable {
    pub fn new(step: AuthStep, source: Error) -> Self {
        Self { step, source }
    }
}
