//! dirauth core library
//!
//! Configuration, error types, endpoint parsing and identity values shared by
//! the directory authentication crates. Nothing here touches the network.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod identity;

pub use config::{AppConfig, DirectoryConfig, LoggingConfig, ServiceAccount};
pub use endpoint::{Endpoint, EndpointSet};
pub use error::{AuthStep, AuthenticationUnavailable, EndpointFailure, Error, Result};
pub use identity::{sanitize_username, Credentials, Identity};

/// dirauth version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
