//! Configuration for dirauth

use crate::endpoint::EndpointSet;
use crate::identity::Credentials;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `DIRAUTH_*` environment variables
    pub fn apply_env(&mut self) {
        let dir = &mut self.directory;

        if let Ok(servers) = std::env::var("DIRAUTH_SERVERS") {
            dir.servers = servers;
        }
        if let Ok(v) = std::env::var("DIRAUTH_TRUST_ANY_SECURED_HOST") {
            dir.trust_any_secured_host = v == "true";
        }
        if let Ok(v) = std::env::var("DIRAUTH_START_TLS") {
            dir.start_tls = v == "true";
        }
        if let Ok(base) = std::env::var("DIRAUTH_USER_BASE_DN") {
            dir.user_base_dn = base;
        }
        if let Ok(base) = std::env::var("DIRAUTH_GROUP_BASE_DN") {
            dir.group_base_dn = base;
        }
        if let Ok(attr) = std::env::var("DIRAUTH_USER_IDENTIFIER_ATTRIBUTE") {
            dir.user_identifier_attribute = attr;
        }
        if let Ok(attr) = std::env::var("DIRAUTH_MEMBERSHIP_ATTRIBUTE") {
            dir.membership_attribute = attr;
        }
        if let Ok(dn) = std::env::var("DIRAUTH_BIND_DN") {
            dir.service_account.bind_dn = dn;
        }
        if let Ok(password) = std::env::var("DIRAUTH_BIND_PASSWORD") {
            dir.service_account.password = password;
        }
        if let Ok(ms) = std::env::var("DIRAUTH_CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                dir.connect_timeout_ms = ms;
            }
        }
        if let Ok(ms) = std::env::var("DIRAUTH_READ_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                dir.read_timeout_ms = ms;
            }
        }
        if let Ok(ms) = std::env::var("DIRAUTH_OPERATION_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                dir.operation_timeout_ms = Some(ms);
            }
        }
        if let Ok(level) = std::env::var("DIRAUTH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("DIRAUTH_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Directory connection and search settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Comma separated server list
    /// Example: "ldaps://dc1.example.com, ldap://dc2.example.com:3389"
    pub servers: String,

    /// Accept any certificate from `ldaps://` servers (not for production)
    pub trust_any_secured_host: bool,

    /// Upgrade plain `ldap://` connections with STARTTLS
    pub start_tls: bool,

    /// Base DN for user searches
    pub user_base_dn: String,

    /// Base DN for membership searches
    pub group_base_dn: String,

    /// Attribute holding the login name, e.g. `uid` or `sAMAccountName`
    pub user_identifier_attribute: String,

    /// Attribute on a group listing member DNs
    pub membership_attribute: String,

    /// Account used for searches
    pub service_account: ServiceAccount,

    pub connect_timeout_ms: u64,

    pub read_timeout_ms: u64,

    /// Upper bound for one whole authentication, unset means unbounded
    pub operation_timeout_ms: Option<u64>,

    /// Cache specification for an external caching layer. Not enforced here.
    pub cache_policy: Option<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            servers: "ldap://localhost:389".to_string(),
            trust_any_secured_host: false,
            start_tls: false,
            user_base_dn: "ou=people,dc=example,dc=com".to_string(),
            group_base_dn: "ou=groups,dc=example,dc=com".to_string(),
            user_identifier_attribute: "sAMAccountName".to_string(),
            membership_attribute: "member".to_string(),
            service_account: ServiceAccount::default(),
            connect_timeout_ms: 500,
            read_timeout_ms: 500,
            operation_timeout_ms: None,
            cache_policy: None,
        }
    }
}

impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("servers", &self.servers)
            .field("trust_any_secured_host", &self.trust_any_secured_host)
            .field("start_tls", &self.start_tls)
            .field("user_base_dn", &self.user_base_dn)
            .field("group_base_dn", &self.group_base_dn)
            .field("user_identifier_attribute", &self.user_identifier_attribute)
            .field("membership_attribute", &self.membership_attribute)
            .field("service_account", &self.service_account)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("operation_timeout_ms", &self.operation_timeout_ms)
            .field("cache_policy", &self.cache_policy)
            .finish()
    }
}

impl DirectoryConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    pub fn endpoints(&self) -> crate::Result<EndpointSet> {
        EndpointSet::parse(&self.servers)
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        self.endpoints()?;

        let required = [
            ("user_base_dn", &self.user_base_dn),
            ("group_base_dn", &self.group_base_dn),
            ("user_identifier_attribute", &self.user_identifier_attribute),
            ("membership_attribute", &self.membership_attribute),
            ("service_account.bind_dn", &self.service_account.bind_dn),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(crate::Error::MalformedConfiguration(format!(
                    "{} is required",
                    name
                )));
            }
        }

        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(crate::Error::MalformedConfiguration(
                "connect and read timeouts must be greater than zero".to_string(),
            ));
        }
        if self.operation_timeout_ms == Some(0) {
            return Err(crate::Error::MalformedConfiguration(
                "operation_timeout_ms must be greater than zero when set".to_string(),
            ));
        }

        Ok(())
    }
}

/// Service account used for searches
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceAccount {
    pub bind_dn: String,
    pub password: String,
}

impl Default for ServiceAccount {
    fn default() -> Self {
        Self {
            bind_dn: "cn=ldapreader,dc=example,dc=com".to_string(),
            password: "changeme".to_string(),
        }
    }
}

impl ServiceAccount {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.bind_dn.clone(), self.password.clone())
    }
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("bind_dn", &self.bind_dn)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DirectoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connect_timeout(), Duration::from_millis(500));
        assert_eq!(config.operation_timeout(), None);
    }

    #[test]
    fn test_parse_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [directory]
            servers = "ldaps://dc1.example.com, ldap://dc2.example.com:3389"
            trust_any_secured_host = true
            user_base_dn = "ou=users,dc=corp,dc=example"
            group_base_dn = "ou=groups,dc=corp,dc=example"
            user_identifier_attribute = "uid"
            operation_timeout_ms = 2000

            [directory.service_account]
            bind_dn = "cn=reader,dc=corp,dc=example"
            password = "s3cret"

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        let dir = &config.directory;
        assert!(dir.trust_any_secured_host);
        assert_eq!(dir.user_identifier_attribute, "uid");
        // unspecified fields fall back to defaults
        assert_eq!(dir.membership_attribute, "member");
        assert_eq!(dir.read_timeout_ms, 500);
        assert_eq!(dir.operation_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(dir.endpoints().unwrap().len(), 2);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_validation_rejects_missing_fields() {
        let mut config = DirectoryConfig::default();
        config.group_base_dn = String::new();
        assert!(matches!(
            config.validate(),
            Err(crate::Error::MalformedConfiguration(_))
        ));

        let mut config = DirectoryConfig::default();
        config.servers = String::new();
        assert!(matches!(
            config.validate(),
            Err(crate::Error::MalformedConfiguration(_))
        ));

        let mut config = DirectoryConfig::default();
        config.read_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_service_password() {
        let mut config = DirectoryConfig::default();
        config.service_account.password = "topsecret".to_string();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("topsecret"));
        assert!(rendered.contains("<redacted>"));
    }
}
