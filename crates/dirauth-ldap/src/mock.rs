//! In-memory directory for tests

use crate::directory::*;
use async_trait::async_trait;
use dirauth_core::Endpoint;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn test_settings() -> ConnectSettings {
    ConnectSettings {
        connect_timeout: Duration::from_millis(100),
        read_timeout: Duration::from_millis(100),
        trust_any_secured_host: false,
        start_tls: false,
    }
}

struct MockEntry {
    dn: String,
    password: Option<String>,
    attributes: HashMap<String, Vec<String>>,
}

#[derive(Default)]
struct State {
    entries: Vec<MockEntry>,
    unreachable: HashSet<String>,
    failing_binds: HashSet<String>,
    search_fault: Option<DirectoryFault>,
    search_delay: Option<Duration>,
    bind_delay: Option<Duration>,
    connect_attempts: Vec<String>,
    searches: usize,
    opened: usize,
    closed: usize,
}

/// Directory whose entries, outages and faults are set up by the test
#[derive(Clone, Default)]
pub(crate) struct MockDirectory {
    state: Arc<Mutex<State>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, dn: &str, password: Option<&str>, attribute: Option<(&str, Vec<String>)>) -> Self {
        let attributes = attribute
            .into_iter()
            .map(|(name, values)| (name.to_string(), values))
            .collect();
        self.state.lock().entries.push(MockEntry {
            dn: dn.to_string(),
            password: password.map(str::to_string),
            attributes,
        });
        self
    }

    /// An entry that can only bind, e.g. a service account
    pub fn with_account(self, dn: &str, password: &str) -> Self {
        self.push(dn, Some(password), None)
    }

    /// A person entry found through `attribute=username`
    pub fn with_user(self, dn: &str, attribute: &str, username: &str, password: &str) -> Self {
        self.push(dn, Some(password), Some((attribute, vec![username.to_string()])))
    }

    /// A group listing member DNs under `member`
    pub fn with_group<M: AsRef<str>>(self, dn: &str, members: &[M]) -> Self {
        let members = members.iter().map(|m| m.as_ref().to_string()).collect();
        self.push(dn, None, Some(("member", members)))
    }

    pub fn unreachable(self, host: &str) -> Self {
        self.state.lock().unreachable.insert(host.to_string());
        self
    }

    /// Binds against `host` fail with a server error
    pub fn failing_bind(self, host: &str) -> Self {
        self.state.lock().failing_binds.insert(host.to_string());
        self
    }

    pub fn failing_searches(self, fault: DirectoryFault) -> Self {
        self.state.lock().search_fault = Some(fault);
        self
    }

    pub fn search_delay(self, delay: Duration) -> Self {
        self.state.lock().search_delay = Some(delay);
        self
    }

    pub fn bind_delay(self, delay: Duration) -> Self {
        self.state.lock().bind_delay = Some(delay);
        self
    }

    /// Hosts in the order connections were attempted
    pub fn connect_attempts(&self) -> Vec<String> {
        self.state.lock().connect_attempts.clone()
    }

    pub fn searches(&self) -> usize {
        self.state.lock().searches
    }

    /// Sessions opened and not yet closed
    pub fn open_sessions(&self) -> usize {
        let state = self.state.lock();
        state.opened - state.closed
    }

    pub fn opened_sessions(&self) -> usize {
        self.state.lock().opened
    }
}

#[async_trait]
impl DirectoryClient for MockDirectory {
    type Session = MockSession;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        _settings: &ConnectSettings,
    ) -> Result<MockSession, DirectoryFault> {
        let mut state = self.state.lock();
        state.connect_attempts.push(endpoint.host().to_string());

        if state.unreachable.contains(endpoint.host()) {
            return Err(DirectoryFault::Transport(format!(
                "connection refused: {}",
                endpoint
            )));
        }

        state.opened += 1;
        Ok(MockSession {
            state: self.state.clone(),
            host: endpoint.host().to_string(),
            closed: false,
        })
    }
}

pub(crate) struct MockSession {
    state: Arc<Mutex<State>>,
    host: String,
    closed: bool,
}

#[async_trait]
impl DirectorySession for MockSession {
    async fn bind(&mut self, dn: &str, secret: &str) -> BindOutcome {
        let delay = self.state.lock().bind_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();

        if state.failing_binds.contains(&self.host) {
            return BindOutcome::Failed(DirectoryFault::Protocol {
                code: 52,
                message: "unavailable".to_string(),
            });
        }

        let accepted = state
            .entries
            .iter()
            .any(|e| e.dn == dn && e.password.as_deref() == Some(secret));

        if accepted {
            BindOutcome::Success
        } else {
            BindOutcome::Rejected
        }
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &Filter,
    ) -> Result<Vec<DirectoryEntry>, DirectoryFault> {
        let delay = self.state.lock().search_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.searches += 1;

        if let Some(fault) = &state.search_fault {
            return Err(fault.clone());
        }

        let Filter::Equality { attribute, value } = filter;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.dn.ends_with(base))
            .filter(|e| {
                e.attributes
                    .get(attribute)
                    .is_some_and(|values| values.iter().any(|v| v == value))
            })
            .map(|e| DirectoryEntry { dn: e.dn.clone() })
            .collect())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().closed += 1;
        }
    }
}
