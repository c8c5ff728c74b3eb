//! Connection factory with ordered failover
//!
//! Endpoints are tried in declared order. A transport failure moves on to the
//! next endpoint; a credential rejection ends the attempt immediately, since
//! every endpoint fronts the same directory.

use crate::deadline::{within, Deadline};
use crate::directory::*;
use dirauth_core::{Credentials, DirectoryConfig, Endpoint, EndpointFailure, EndpointSet, Error};
use tracing::{debug, error, info, warn};

/// A bound session together with the endpoint that accepted it
pub struct Connection<S> {
    session: S,
    endpoint: Endpoint,
    failed_attempts: Vec<EndpointFailure>,
}

impl<S: DirectorySession> Connection<S> {
    pub fn session(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Endpoints skipped before this one accepted the bind
    pub fn failed_attempts(&self) -> &[EndpointFailure] {
        &self.failed_attempts
    }

    pub async fn close(mut self) {
        self.session.close().await;
    }
}

/// Result of trying every endpoint
pub enum ConnectOutcome<S> {
    Connected(Connection<S>),
    /// The directory refused the credentials
    Rejected,
    /// Every endpoint failed before a bind answer was obtained
    Exhausted(Vec<EndpointFailure>),
    /// The deadline passed before a bind answer was obtained
    Expired(Deadline),
}

impl<S> ConnectOutcome<S> {
    pub fn into_result(self) -> dirauth_core::Result<Connection<S>> {
        match self {
            ConnectOutcome::Connected(conn) => Ok(conn),
            ConnectOutcome::Rejected => Err(Error::InvalidCredentials),
            ConnectOutcome::Exhausted(failures) => Err(Error::ConnectivityFailure(failures)),
            ConnectOutcome::Expired(deadline) => Err(Error::DeadlineExceeded(deadline.budget())),
        }
    }
}

/// Opens bound sessions against the configured endpoints
pub struct ConnectionFactory<C> {
    client: C,
    endpoints: EndpointSet,
    settings: ConnectSettings,
    service_account: Credentials,
}

impl<C: DirectoryClient> ConnectionFactory<C> {
    /// Create a factory. Fails with `MalformedConfiguration` when the server
    /// list does not parse; no connection is attempted.
    pub fn new(config: &DirectoryConfig, client: C) -> dirauth_core::Result<Self> {
        let endpoints = config.endpoints()?;
        let settings = ConnectSettings {
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            trust_any_secured_host: config.trust_any_secured_host,
            start_tls: config.start_tls,
        };

        if settings.trust_any_secured_host {
            warn!("Certificate validation is disabled for secured directory servers");
        }

        Ok(Self {
            client,
            endpoints,
            settings,
            service_account: config.service_account.credentials(),
        })
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    /// Connect and bind as the configured service account
    pub async fn connect_service(&self, deadline: Option<Deadline>) -> ConnectOutcome<C::Session> {
        self.connect(&self.service_account, deadline).await
    }

    /// Connect and bind with the given identity.
    ///
    /// When `deadline` passes mid-bind the half-open session is closed before
    /// returning [`ConnectOutcome::Expired`].
    pub async fn connect(
        &self,
        credentials: &Credentials,
        deadline: Option<Deadline>,
    ) -> ConnectOutcome<C::Session> {
        let mut failures = Vec::new();

        for endpoint in &self.endpoints {
            let connected = within(deadline, self.client.connect(endpoint, &self.settings)).await;
            let mut session = match connected {
                Err(_) => return expired(endpoint, deadline),
                Ok(Ok(session)) => session,
                Ok(Err(fault)) => {
                    record_failure(endpoint, fault, &mut failures);
                    continue;
                }
            };

            let bound = within(
                deadline,
                session.bind(&credentials.identity, &credentials.secret),
            )
            .await;
            let bound = match bound {
                Ok(bound) => bound,
                Err(_) => {
                    session.close().await;
                    return expired(endpoint, deadline);
                }
            };

            match bound {
                BindOutcome::Success => {
                    debug!(endpoint = %endpoint, dn = %credentials.identity, "Bound to directory");
                    return ConnectOutcome::Connected(Connection {
                        session,
                        endpoint: endpoint.clone(),
                        failed_attempts: failures,
                    });
                }
                BindOutcome::Rejected => {
                    session.close().await;
                    info!(endpoint = %endpoint, dn = %credentials.identity, "Bind rejected: invalid credentials");
                    return ConnectOutcome::Rejected;
                }
                BindOutcome::Failed(fault) => {
                    session.close().await;
                    record_failure(endpoint, fault, &mut failures);
                }
            }
        }

        error!(
            attempted = failures.len(),
            dn = %credentials.identity,
            "Unable to connect to any directory server"
        );
        ConnectOutcome::Exhausted(failures)
    }
}

fn expired<S>(endpoint: &Endpoint, deadline: Option<Deadline>) -> ConnectOutcome<S> {
    warn!(endpoint = %endpoint, "Deadline passed while connecting to directory server");
    match deadline {
        Some(deadline) => ConnectOutcome::Expired(deadline),
        // within() only fails when a deadline is set
        None => ConnectOutcome::Exhausted(Vec::new()),
    }
}

fn record_failure(endpoint: &Endpoint, fault: DirectoryFault, failures: &mut Vec<EndpointFailure>) {
    warn!(
        endpoint = %endpoint,
        secure = endpoint.is_secure(),
        error = %fault,
        "Couldn't connect to directory server"
    );
    failures.push(EndpointFailure {
        endpoint: endpoint.to_string(),
        reason: fault.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDirectory;
    use std::time::Duration;

    const ADMIN_DN: &str = "cn=reader,dc=example,dc=com";

    fn config(servers: &str) -> DirectoryConfig {
        let mut config = DirectoryConfig::default();
        config.servers = servers.to_string();
        config.service_account.bind_dn = ADMIN_DN.to_string();
        config.service_account.password = "reader-pw".to_string();
        config
    }

    fn directory() -> MockDirectory {
        MockDirectory::new().with_account(ADMIN_DN, "reader-pw")
    }

    #[test]
    fn test_empty_server_list_fails_before_io() {
        let dir = directory();
        let result = ConnectionFactory::new(&config(""), dir.clone());

        assert!(matches!(result, Err(Error::MalformedConfiguration(_))));
        assert!(dir.connect_attempts().is_empty());
    }

    #[tokio::test]
    async fn test_fails_over_to_reachable_endpoint() {
        let dir = directory().unreachable("e1.example.com");
        let factory =
            ConnectionFactory::new(&config("ldap://e1.example.com,ldap://e2.example.com"), dir.clone())
                .unwrap();

        let conn = factory.connect_service(None).await.into_result().unwrap();
        assert_eq!(conn.endpoint().host(), "e2.example.com");
        assert_eq!(conn.failed_attempts().len(), 1);
        assert_eq!(conn.failed_attempts()[0].endpoint, "ldap://e1.example.com:389");
        conn.close().await;

        assert_eq!(dir.connect_attempts(), vec!["e1.example.com", "e2.example.com"]);
        assert_eq!(dir.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_rejection_short_circuits() {
        let dir = directory();
        let factory =
            ConnectionFactory::new(&config("ldap://e1.example.com,ldap://e2.example.com"), dir.clone())
                .unwrap();

        let outcome = factory
            .connect(&Credentials::new(ADMIN_DN, "wrong"), None)
            .await;

        assert!(matches!(outcome, ConnectOutcome::Rejected));
        assert_eq!(dir.connect_attempts(), vec!["e1.example.com"]);
        assert_eq!(dir.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_bind_server_error_advances() {
        let dir = directory().failing_bind("e1.example.com");
        let factory =
            ConnectionFactory::new(&config("ldap://e1.example.com,ldaps://e2.example.com"), dir.clone())
                .unwrap();

        let conn = factory.connect_service(None).await.into_result().unwrap();
        assert_eq!(conn.endpoint().url(), "ldaps://e2.example.com:636");
        conn.close().await;
        assert_eq!(dir.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_names_all_endpoints() {
        let dir = directory()
            .unreachable("e1.example.com")
            .unreachable("e2.example.com");
        let factory =
            ConnectionFactory::new(&config("ldap://e1.example.com,ldap://e2.example.com:10389"), dir)
                .unwrap();

        let err = match factory.connect_service(None).await.into_result() {
            Err(err) => err,
            Ok(_) => panic!("expected connectivity failure"),
        };
        match &err {
            Error::ConnectivityFailure(failures) => {
                let names: Vec<_> = failures.iter().map(|f| f.endpoint.as_str()).collect();
                assert_eq!(
                    names,
                    vec!["ldap://e1.example.com:389", "ldap://e2.example.com:10389"]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("e2.example.com"));
    }

    #[tokio::test]
    async fn test_deadline_during_bind_closes_session() {
        let dir = directory().bind_delay(Duration::from_millis(500));
        let factory =
            ConnectionFactory::new(&config("ldap://e1.example.com,ldap://e2.example.com"), dir.clone())
                .unwrap();

        let deadline = Deadline::after(Duration::from_millis(50));
        let outcome = factory.connect_service(Some(deadline)).await;

        assert!(matches!(outcome, ConnectOutcome::Expired(d) if d == deadline));
        assert_eq!(dir.connect_attempts(), vec!["e1.example.com"]);
        assert_eq!(dir.opened_sessions(), 1);
        assert_eq!(dir.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_expired_maps_to_deadline_exceeded() {
        let outcome: ConnectOutcome<()> =
            ConnectOutcome::Expired(Deadline::after(Duration::from_millis(75)));
        assert!(matches!(
            outcome.into_result(),
            Err(Error::DeadlineExceeded(d)) if d == Duration::from_millis(75)
        ));
    }
}
