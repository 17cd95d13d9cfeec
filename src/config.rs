//! Process configuration.
//!
//! Everything is read once at boot from environment variables into an
//! explicit [`Config`] that is passed down to the workers; nothing re-reads
//! the environment per request.  Credential validation happens here so a
//! misconfigured process fails fast instead of failing on the first request.

use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use crate::transfer::{Credential, TransferTarget};

// Environment variable names.
pub const ENV_VM_IP: &str = "VM_IP";
pub const ENV_VM_USER: &str = "VM_USER";
pub const ENV_VM_PASSWORD: &str = "VM_PASSWORD";
pub const ENV_VM_KEY_PATH: &str = "VM_KEY_PATH";
pub const ENV_VM_DESTINATION: &str = "VM_DESTINATION";
pub const ENV_LISTEN: &str = "GHCOURIER_LISTEN";

const DEFAULT_VM_USER: &str = "root";
const DEFAULT_VM_DESTINATION: &str = "/tmp";
const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("no VM credential configured: set VM_PASSWORD or VM_KEY_PATH")]
    MissingCredential,
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address for the HTTP listener.
    pub http_listen: String,
    pub vm: VmConfig,
}

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub host: String,
    pub user: String,
    pub destination_dir: String,
    pub credential: Credential,
}

impl VmConfig {
    /// Build the per-request transfer target from the boot-time config.
    pub fn to_target(&self) -> TransferTarget {
        TransferTarget {
            host: self.host.clone(),
            user: self.user.clone(),
            destination_dir: self.destination_dir.clone(),
            auth: self.credential.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    /// Load through an injectable lookup so tests never touch the real
    /// environment.  Empty values are treated as unset.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let host = get(ENV_VM_IP).ok_or(ConfigError::MissingVar(ENV_VM_IP))?;
        let user = get(ENV_VM_USER).unwrap_or_else(|| DEFAULT_VM_USER.to_string());
        let destination_dir =
            get(ENV_VM_DESTINATION).unwrap_or_else(|| DEFAULT_VM_DESTINATION.to_string());

        let credential = match (get(ENV_VM_KEY_PATH), get(ENV_VM_PASSWORD)) {
            (Some(key_path), password) => {
                if password.is_some() {
                    warn!("both VM_KEY_PATH and VM_PASSWORD are set; using the key path");
                }
                Credential::KeyFile(PathBuf::from(key_path))
            }
            (None, Some(password)) => Credential::Password(password),
            (None, None) => return Err(ConfigError::MissingCredential),
        };

        let http_listen = get(ENV_LISTEN).unwrap_or_else(|| DEFAULT_LISTEN.to_string());

        Ok(Self {
            http_listen,
            vm: VmConfig {
                host,
                user,
                destination_dir,
                credential,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(&|name| map.get(name).cloned())
    }

    #[test]
    fn password_config_with_defaults() {
        let config = load(&[(ENV_VM_IP, "10.0.0.1"), (ENV_VM_PASSWORD, "hunter2")]).unwrap();
        assert_eq!(config.vm.host, "10.0.0.1");
        assert_eq!(config.vm.user, "root");
        assert_eq!(config.vm.destination_dir, "/tmp");
        assert_eq!(config.http_listen, "0.0.0.0:8080");
        assert!(matches!(config.vm.credential, Credential::Password(ref p) if p == "hunter2"));
    }

    #[test]
    fn key_path_config() {
        let config = load(&[(ENV_VM_IP, "vm.example"), (ENV_VM_KEY_PATH, "/etc/keys/id")]).unwrap();
        assert!(matches!(
            config.vm.credential,
            Credential::KeyFile(ref p) if p == &PathBuf::from("/etc/keys/id")
        ));
    }

    #[test]
    fn key_path_wins_over_password() {
        let config = load(&[
            (ENV_VM_IP, "vm.example"),
            (ENV_VM_PASSWORD, "pw"),
            (ENV_VM_KEY_PATH, "/etc/keys/id"),
        ])
        .unwrap();
        assert!(matches!(config.vm.credential, Credential::KeyFile(_)));
    }

    #[test]
    fn overrides_are_honoured() {
        let config = load(&[
            (ENV_VM_IP, "10.0.0.1"),
            (ENV_VM_PASSWORD, "pw"),
            (ENV_VM_USER, "deploy"),
            (ENV_VM_DESTINATION, "/srv/drop"),
            (ENV_LISTEN, "127.0.0.1:9999"),
        ])
        .unwrap();
        assert_eq!(config.vm.user, "deploy");
        assert_eq!(config.vm.destination_dir, "/srv/drop");
        assert_eq!(config.http_listen, "127.0.0.1:9999");
    }

    #[test]
    fn missing_host_is_fatal() {
        let err = load(&[(ENV_VM_PASSWORD, "pw")]).unwrap_err();
        assert_eq!(err, ConfigError::MissingVar(ENV_VM_IP));
    }

    #[test]
    fn missing_credential_is_fatal() {
        let err = load(&[(ENV_VM_IP, "10.0.0.1")]).unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential);
    }

    #[test]
    fn empty_values_count_as_unset() {
        let err = load(&[(ENV_VM_IP, "10.0.0.1"), (ENV_VM_PASSWORD, "")]).unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential);
    }

    #[test]
    fn to_target_copies_all_fields() {
        let config = load(&[(ENV_VM_IP, "10.0.0.1"), (ENV_VM_PASSWORD, "pw")]).unwrap();
        let target = config.vm.to_target();
        assert_eq!(target.host, "10.0.0.1");
        assert_eq!(target.user, "root");
        assert_eq!(target.destination_dir, "/tmp");
    }
}
