//! dirauth - directory authentication tool
//!
//! Checks credentials and group memberships against the configured LDAP
//! servers, the same way the embedding service does.

use clap::{Parser, Subcommand};
use dirauth_core::config::AppConfig;
use dirauth_core::{EndpointFailure, Error};
use dirauth_ldap::{LdapAuthenticator, LdapDirectory};
use serde::Serialize;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dirauth")]
#[command(version = dirauth_core::VERSION)]
#[command(about = "Directory authentication and group membership lookup", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DIRAUTH_CONFIG")]
    config: Option<String>,

    /// Comma separated server list, overrides the configuration
    #[arg(long, global = true, env = "DIRAUTH_SERVERS")]
    servers: Option<String>,

    /// Accept any certificate from ldaps:// servers
    #[arg(long, global = true)]
    trust_any_secured_host: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "DIRAUTH_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the configured endpoints without connecting
    Endpoints,

    /// Bind with the service account and report which server answered
    Ping,

    /// Authenticate a user and print the resulting identity
    Authenticate {
        #[arg(short, long)]
        username: String,

        #[arg(short, long, env = "DIRAUTH_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Print the transitive group memberships of a directory entry
    Memberships {
        #[arg(long)]
        dn: String,
    },
}

#[derive(Serialize)]
struct EndpointView {
    url: String,
    host: String,
    port: u16,
    secure: bool,
}

#[derive(Serialize)]
struct PingView {
    endpoint: String,
    skipped: Vec<String>,
}

const EXIT_REJECTED: u8 = 1;
const EXIT_UNAVAILABLE: u8 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = AppConfig::from_file(path)?;
            config.apply_env();
            config
        }
        None => AppConfig::from_env(),
    };

    // Override with CLI args
    if let Some(servers) = cli.servers {
        config.directory.servers = servers;
    }
    if cli.trust_any_secured_host {
        config.directory.trust_any_secured_host = true;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_logging(&config.logging.level, &config.logging.format);

    match cli.command {
        Commands::Endpoints => {
            let endpoints = match config.directory.endpoints() {
                Ok(endpoints) => endpoints,
                Err(e) => return Ok(report(&e)),
            };
            let endpoints: Vec<EndpointView> = endpoints
                .iter()
                .map(|e| EndpointView {
                    url: e.url(),
                    host: e.host().to_string(),
                    port: e.port(),
                    secure: e.is_secure(),
                })
                .collect();
            print_json(&endpoints)?;
        }
        Commands::Ping => {
            let authenticator = match connect(&config) {
                Ok(authenticator) => authenticator,
                Err(e) => return Ok(report(&e)),
            };
            match authenticator.check_service().await {
                Ok(status) => print_json(&PingView {
                    endpoint: status.endpoint,
                    skipped: status.failed_attempts.iter().map(EndpointFailure::to_string).collect(),
                })?,
                Err(e) => return Ok(report(&e)),
            }
        }
        Commands::Authenticate { username, password } => {
            let authenticator = match connect(&config) {
                Ok(authenticator) => authenticator,
                Err(e) => return Ok(report(&e)),
            };
            match authenticator.authenticate(&username, &password).await {
                Ok(Some(identity)) => print_json(&identity)?,
                Ok(None) => {
                    eprintln!("Authentication failed");
                    return Ok(ExitCode::from(EXIT_REJECTED));
                }
                Err(e) => {
                    eprintln!("[{}] {}", e.source.code(), e);
                    return Ok(exit_code(&e.source));
                }
            }
        }
        Commands::Memberships { dn } => {
            let authenticator = match connect(&config) {
                Ok(authenticator) => authenticator,
                Err(e) => return Ok(report(&e)),
            };
            match authenticator.memberships_of(&dn).await {
                Ok(groups) => {
                    info!(dn = %dn, count = groups.len(), "Resolved memberships");
                    print_json(&groups)?;
                }
                Err(e) => return Ok(report(&e)),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn connect(config: &AppConfig) -> dirauth_core::Result<LdapAuthenticator> {
    LdapAuthenticator::from_config(&config.directory, LdapDirectory::new())
}

/// Exit status for a failed command: a rejection is not an outage
fn exit_status(error: &Error) -> u8 {
    if error.is_unavailable() {
        EXIT_UNAVAILABLE
    } else {
        EXIT_REJECTED
    }
}

fn exit_code(error: &Error) -> ExitCode {
    ExitCode::from(exit_status(error))
}

fn report(error: &Error) -> ExitCode {
    eprintln!("[{}] {}", error.code(), error);
    exit_code(error)
}

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // logs go to stderr so stdout stays machine readable
    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_exit_status_separates_rejection_from_outage() {
        assert_eq!(exit_status(&Error::InvalidCredentials), EXIT_REJECTED);
        assert_eq!(exit_status(&Error::ConnectivityFailure(vec![])), EXIT_UNAVAILABLE);
        assert_eq!(
            exit_status(&Error::DeadlineExceeded(Duration::from_millis(50))),
            EXIT_UNAVAILABLE
        );
        assert_eq!(
            exit_status(&Error::MalformedConfiguration("no servers".into())),
            EXIT_UNAVAILABLE
        );
    }
}
