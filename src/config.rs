//! Configuration loading and validation.
//!
//! ```toml
//! [server]
//! domain = "roost.example"
//! metrics_port = 9090
//!
//! [listen]
//! address = "0.0.0.0:5222"
//!
//! [tls]
//! cert_path = "/etc/roostd/cert.pem"
//! key_path = "/etc/roostd/key.pem"
//!
//! [archive]
//! enabled = true
//!
//! [[user]]
//! name = "alice"
//! password_hash = "$argon2id$..."
//! ```

use roost_proto::Entity;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity.
    pub server: ServerConfig,
    /// Network listener.
    pub listen: ListenConfig,
    /// Optional TLS material for STARTTLS.
    pub tls: Option<TlsConfig>,
    /// Message archiving.
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Local accounts.
    #[serde(default, rename = "user")]
    pub users: Vec<UserBlock>,
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Domain this server is authoritative for (e.g. "roost.example").
    pub domain: String,
    /// Prometheus metrics HTTP port. 0 or absent disables the endpoint.
    pub metrics_port: Option<u16>,
}

/// Client listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to accept client streams on.
    pub address: SocketAddr,
}

/// TLS certificate material for the STARTTLS upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// PEM certificate chain path.
    pub cert_path: String,
    /// PKCS#8 private key path.
    pub key_path: String,
}

/// Message archiving configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Whether qualifying messages are archived per account.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// One local account.
#[derive(Debug, Clone, Deserialize)]
pub struct UserBlock {
    /// Account-local part of the JID.
    pub name: String,
    /// Argon2 PHC credential string.
    pub password_hash: String,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// The configured domain as an entity.
    pub fn domain_entity(&self) -> Entity {
        Entity::parse_unchecked(&self.server.domain)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let domain = Entity::parse(&self.server.domain)
            .map_err(|err| ConfigError::Invalid(format!("server.domain: {err}")))?;
        if domain.local().is_some() || domain.resource().is_some() {
            return Err(ConfigError::Invalid(
                "server.domain must be a plain domain, not a full JID".to_string(),
            ));
        }

        for user in &self.users {
            Entity::parse(&format!("{}@{}", user.name, self.server.domain))
                .map_err(|err| ConfigError::Invalid(format!("user '{}': {err}", user.name)))?;
            if !user.password_hash.starts_with("$argon2") {
                return Err(ConfigError::Invalid(format!(
                    "user '{}': password_hash is not an Argon2 PHC string",
                    user.name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHQ$placeholderplaceholder00";

    fn load(content: &str) -> Result<Config, ConfigError> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        Config::load(file.path())
    }

    #[test]
    fn loads_minimal_config() {
        let config = load(
            r#"
[server]
domain = "roost.example"

[listen]
address = "127.0.0.1:5222"
"#,
        )
        .unwrap();
        assert_eq!(config.server.domain, "roost.example");
        assert!(config.archive.enabled);
        assert!(config.users.is_empty());
        assert!(config.tls.is_none());
    }

    #[test]
    fn loads_users_and_archive_flag() {
        let config = load(&format!(
            r#"
[server]
domain = "roost.example"

[listen]
address = "127.0.0.1:5222"

[archive]
enabled = false

[[user]]
name = "alice"
password_hash = "{HASH}"
"#
        ))
        .unwrap();
        assert!(!config.archive.enabled);
        assert_eq!(config.users.len(), 1);
        assert_eq!(config.users[0].name, "alice");
    }

    #[test]
    fn rejects_full_jid_domain() {
        let err = load(
            r#"
[server]
domain = "admin@roost.example"

[listen]
address = "127.0.0.1:5222"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_non_argon2_credentials() {
        let err = load(
            r#"
[server]
domain = "roost.example"

[listen]
address = "127.0.0.1:5222"

[[user]]
name = "alice"
password_hash = "hunter2"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_invalid_user_name() {
        let err = load(&format!(
            r#"
[server]
domain = "roost.example"

[listen]
address = "127.0.0.1:5222"

[[user]]
name = "al ice"
password_hash = "{HASH}"
"#
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
