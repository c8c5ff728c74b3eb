//! Directory authentication for dirauth
//!
//! Verifies a username/password against an LDAP directory and resolves the
//! user's transitive group memberships:
//! - ordered multi-server failover
//! - LDAPS and STARTTLS, with an opt-in trust-all mode for test setups
//! - nested groups, cycle safe
//!
//! The wire protocol sits behind [`DirectoryClient`]; [`LdapDirectory`] is the
//! `ldap3` implementation.

mod authenticator;
mod client;
mod connection;
mod deadline;
mod directory;
mod membership;

#[cfg(test)]
mod mock;

pub use authenticator::{Authenticator, ServiceStatus};
pub use client::{render_filter, LdapDirectory, LdapSession};
pub use connection::{ConnectOutcome, Connection, ConnectionFactory};
pub use deadline::Deadline;
pub use directory::{
    BindOutcome, ConnectSettings, DirectoryClient, DirectoryEntry, DirectoryFault,
    DirectorySession, Filter,
};
pub use membership::MembershipResolver;

/// Authenticator backed by a live LDAP directory
pub type LdapAuthenticator = Authenticator<LdapDirectory>;
