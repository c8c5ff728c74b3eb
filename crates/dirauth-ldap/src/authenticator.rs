//! Username/password authentication against the directory
//!
//! The flow for one call:
//! 1. sanitize the username
//! 2. find the user's DN with the service account
//! 3. bind as that DN with the presented password on a fresh connection
//! 4. resolve transitive group memberships with the service account
//!
//! Unknown users and wrong passwords both yield `Ok(None)`. Anything that
//! prevents a trustworthy answer yields [`AuthenticationUnavailable`].
//! Every connection is closed before the step that opened it returns, also
//! when the operation deadline passes mid-step.

use crate::connection::{ConnectOutcome, Connection, ConnectionFactory};
use crate::deadline::{within, Deadline};
use crate::directory::{DirectoryClient, DirectorySession, Filter};
use crate::membership::MembershipResolver;
use dirauth_core::{
    sanitize_username, AuthStep, AuthenticationUnavailable, Credentials, DirectoryConfig,
    EndpointFailure, Error, Identity, Result,
};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Service account connectivity report
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    /// Endpoint that accepted the service bind
    pub endpoint: String,
    /// Endpoints tried and skipped first
    pub failed_attempts: Vec<EndpointFailure>,
}

/// Directory-backed authenticator
///
/// Holds no per-call state; share it behind an `Arc` across tasks.
pub struct Authenticator<C> {
    factory: ConnectionFactory<C>,
    user_base_dn: String,
    user_identifier_attribute: String,
    resolver: MembershipResolver,
    operation_timeout: Option<Duration>,
}

impl<C: DirectoryClient> Authenticator<C> {
    /// Validate `config` and build an authenticator on top of `client`
    pub fn from_config(config: &DirectoryConfig, client: C) -> Result<Self> {
        config.validate()?;
        let factory = ConnectionFactory::new(config, client)?;
        Ok(Self::new(factory, config))
    }

    pub fn new(factory: ConnectionFactory<C>, config: &DirectoryConfig) -> Self {
        if config.cache_policy.is_some() {
            debug!("cache_policy is configured; caching is left to the caller");
        }

        Self {
            factory,
            user_base_dn: config.user_base_dn.clone(),
            user_identifier_attribute: config.user_identifier_attribute.clone(),
            resolver: MembershipResolver::new(
                config.group_base_dn.clone(),
                config.membership_attribute.clone(),
            ),
            operation_timeout: config.operation_timeout(),
        }
    }

    /// Authenticate a user with username and password.
    ///
    /// Returns the identity with its transitive memberships, or `None` when
    /// the user is unknown or the password is wrong. The result depends only
    /// on the username and password, so callers may cache it.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> std::result::Result<Option<Identity>, AuthenticationUnavailable> {
        // one budget shared by every step of this call
        let deadline = self.deadline();
        let username = sanitize_username(username);
        if username.is_empty() {
            debug!("Username is empty after sanitizing");
            return Ok(None);
        }

        let user_dn = match self
            .find_dn(&username, deadline)
            .await
            .map_err(|e| unavailable(AuthStep::ResolveDn, e))?
        {
            Some(dn) => dn,
            None => {
                info!(username = %username, "No directory entry for user");
                return Ok(None);
            }
        };

        if !self
            .bind_as(&user_dn, password, deadline)
            .await
            .map_err(|e| unavailable(AuthStep::Verify, e))?
        {
            return Ok(None);
        }

        let memberships = self
            .resolve_memberships(&user_dn, deadline)
            .await
            .map_err(|e| unavailable(AuthStep::ResolveMemberships, e))?;

        info!(
            username = %username,
            dn = %user_dn,
            groups = memberships.len(),
            "Authenticated user"
        );
        Ok(Some(Identity::new(username, memberships)))
    }

    /// Find the DN of the entry whose identifier attribute equals `username`.
    ///
    /// The username is sanitized first. More than one match is refused with
    /// [`Error::AmbiguousIdentity`] rather than picking one.
    pub async fn lookup_dn(&self, username: &str) -> Result<Option<String>> {
        self.find_dn(&sanitize_username(username), self.deadline()).await
    }

    async fn find_dn(&self, username: &str, deadline: Option<Deadline>) -> Result<Option<String>> {
        let mut conn = self.service_connection(deadline).await?;
        let result = within(deadline, self.search_user(conn.session(), username)).await;
        conn.close().await;
        settle(result)
    }

    async fn search_user(
        &self,
        session: &mut C::Session,
        username: &str,
    ) -> Result<Option<String>> {
        let filter = Filter::equality(&self.user_identifier_attribute, username);
        let entries = session
            .search(&self.user_base_dn, &filter)
            .await
            .map_err(|fault| {
                error!(
                    base = %self.user_base_dn,
                    filter = %filter,
                    error = %fault,
                    "Failed to get the DN for user"
                );
                Error::DirectoryProtocol {
                    operation: format!("user search {} under {}", filter, self.user_base_dn),
                    detail: fault.to_string(),
                }
            })?;

        if entries.len() > 1 {
            error!(
                username = %username,
                matches = entries.len(),
                "Username matches more than one directory entry"
            );
            return Err(Error::AmbiguousIdentity {
                username: username.to_string(),
                matches: entries.len(),
            });
        }

        let dn = entries.into_iter().next().map(|entry| entry.dn);
        if let Some(dn) = &dn {
            debug!(username = %username, dn = %dn, "Resolved user DN");
        }
        Ok(dn)
    }

    /// Bind as `user_dn` with `password` on a new connection.
    ///
    /// `Ok(false)` means the directory rejected the password. An empty
    /// password is rejected locally because servers treat it as an
    /// unauthenticated bind that always succeeds.
    pub async fn verify(&self, user_dn: &str, password: &str) -> Result<bool> {
        self.bind_as(user_dn, password, self.deadline()).await
    }

    async fn bind_as(
        &self,
        user_dn: &str,
        password: &str,
        deadline: Option<Deadline>,
    ) -> Result<bool> {
        if password.is_empty() {
            info!(dn = %user_dn, "Rejecting empty password");
            return Ok(false);
        }

        match self
            .factory
            .connect(&Credentials::new(user_dn, password), deadline)
            .await
        {
            ConnectOutcome::Connected(conn) => {
                conn.close().await;
                Ok(true)
            }
            ConnectOutcome::Rejected => Ok(false),
            ConnectOutcome::Exhausted(failures) => {
                error!(dn = %user_dn, "Could not reach the directory to verify credentials");
                Err(Error::ConnectivityFailure(failures))
            }
            ConnectOutcome::Expired(deadline) => Err(Error::DeadlineExceeded(deadline.budget())),
        }
    }

    /// Transitive group memberships of `dn`, searched with the service account
    pub async fn memberships_of(&self, dn: &str) -> Result<Vec<String>> {
        self.resolve_memberships(dn, self.deadline()).await
    }

    async fn resolve_memberships(
        &self,
        dn: &str,
        deadline: Option<Deadline>,
    ) -> Result<Vec<String>> {
        debug!(base = %self.resolver.group_base_dn(), dn = %dn, "Searching for memberships");
        let mut conn = self.service_connection(deadline).await?;
        let result = within(deadline, self.resolver.resolve(conn.session(), dn)).await;
        conn.close().await;
        settle(result)
    }

    /// Bind with the service account and report which endpoint answered
    pub async fn check_service(&self) -> Result<ServiceStatus> {
        let conn = self.service_connection(self.deadline()).await?;
        let status = ServiceStatus {
            endpoint: conn.endpoint().to_string(),
            failed_attempts: conn.failed_attempts().to_vec(),
        };
        conn.close().await;
        Ok(status)
    }

    fn deadline(&self) -> Option<Deadline> {
        self.operation_timeout.map(Deadline::after)
    }

    async fn service_connection(
        &self,
        deadline: Option<Deadline>,
    ) -> Result<Connection<C::Session>> {
        match self.factory.connect_service(deadline).await.into_result() {
            Err(Error::InvalidCredentials) => {
                error!("Service account credentials were rejected by the directory");
                Err(Error::MalformedConfiguration(
                    "service account credentials were rejected".to_string(),
                ))
            }
            other => other,
        }
    }
}

/// Flatten a step result run under a deadline
fn settle<T>(result: Result<Result<T>>) -> Result<T> {
    match result {
        Ok(inner) => inner,
        Err(e) => {
            warn!(error = %e, "Directory step cancelled");
            Err(e)
        }
    }
}

fn unavailable(step: AuthStep, source: Error) -> AuthenticationUnavailable {
    error!(step = %step, error = %source, "Directory unavailable");
    AuthenticationUnavailable::new(step, source)
}
