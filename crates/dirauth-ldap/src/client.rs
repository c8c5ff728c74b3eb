//! LDAP client implementation
//!
//! Adapts `ldap3` to [`DirectoryClient`]. Supports LDAP, LDAPS and STARTTLS
//! connections.

use crate::directory::*;
use async_trait::async_trait;
use dirauth_core::Endpoint;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};
use std::time::Duration;
use tracing::debug;

/// LDAP result code for a failed simple bind
const RC_INVALID_CREDENTIALS: u32 = 49;

/// `ldap3`-backed directory client
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapDirectory;

impl LdapDirectory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DirectoryClient for LdapDirectory {
    type Session = LdapSession;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        settings: &ConnectSettings,
    ) -> Result<LdapSession, DirectoryFault> {
        let mut conn_settings = LdapConnSettings::new().set_conn_timeout(settings.connect_timeout);

        if endpoint.is_secure() {
            conn_settings = conn_settings.set_no_tls_verify(settings.trust_any_secured_host);
        } else if settings.start_tls {
            conn_settings = conn_settings
                .set_starttls(true)
                .set_no_tls_verify(settings.trust_any_secured_host);
        }

        debug!(endpoint = %endpoint, "Connecting to LDAP server");

        let (conn, ldap) = LdapConnAsync::with_settings(conn_settings, &endpoint.url())
            .await
            .map_err(|e| DirectoryFault::Transport(e.to_string()))?;

        ldap3::drive!(conn);

        Ok(LdapSession {
            ldap,
            read_timeout: settings.read_timeout,
        })
    }
}

/// An open `ldap3` connection
pub struct LdapSession {
    ldap: Ldap,
    read_timeout: Duration,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn bind(&mut self, dn: &str, secret: &str) -> BindOutcome {
        let result = self
            .ldap
            .with_timeout(self.read_timeout)
            .simple_bind(dn, secret)
            .await;

        match result {
            Ok(res) if res.rc == 0 => BindOutcome::Success,
            Ok(res) if res.rc == RC_INVALID_CREDENTIALS => BindOutcome::Rejected,
            Ok(res) => BindOutcome::Failed(DirectoryFault::Protocol {
                code: res.rc,
                message: res.text,
            }),
            Err(e) => BindOutcome::Failed(classify(e)),
        }
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &Filter,
    ) -> Result<Vec<DirectoryEntry>, DirectoryFault> {
        let rendered = render_filter(filter);
        debug!(base = %base, filter = %rendered, "Searching directory");

        let (rs, _res) = self
            .ldap
            .with_timeout(self.read_timeout)
            .search(base, Scope::Subtree, &rendered, vec!["1.1"])
            .await
            .map_err(classify)?
            .success()
            .map_err(classify)?;

        Ok(rs
            .into_iter()
            .map(|result| DirectoryEntry {
                dn: SearchEntry::construct(result).dn,
            })
            .collect())
    }

    async fn close(&mut self) {
        if let Err(e) = self.ldap.unbind().await {
            debug!(error = %e, "Unbind failed");
        }
    }
}

/// Render a filter with the value escaped, so DNs containing `(`, `)`, `*`
/// or `\` cannot change the filter structure.
pub fn render_filter(filter: &Filter) -> String {
    match filter {
        Filter::Equality { attribute, value } => {
            format!("({}={})", attribute, ldap3::ldap_escape(value))
        }
    }
}

fn classify(err: LdapError) -> DirectoryFault {
    match err {
        LdapError::LdapResult { result } => DirectoryFault::Protocol {
            code: result.rc,
            message: result.text,
        },
        other => DirectoryFault::Transport(other.to_string()),
    }
}
