//! Remote delivery: the narrow capability a delivery needs from the
//! transport layer.
//!
//! [`RemoteWriter`] opens an authenticated session against a
//! [`TransferTarget`]; the resulting [`RemoteSession`] writes one file and is
//! closed explicitly.  The production implementation ([`sftp::SftpWriter`])
//! speaks SSH/SFTP; tests substitute an in-memory fake.

pub mod sftp;

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Target and credential
// ---------------------------------------------------------------------------

/// Authentication mode for the remote host.  Exactly one mode exists per
/// target by construction.
#[derive(Clone)]
pub enum Credential {
    Password(String),
    KeyFile(PathBuf),
}

// Keep secrets out of log output.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Credential::Password(<redacted>)"),
            Self::KeyFile(path) => write!(f, "Credential::KeyFile({})", path.display()),
        }
    }
}

/// Where a delivery lands: host, SSH user, destination directory, and the
/// credential used to authenticate.  Built fresh per request from the
/// process-wide configuration.
#[derive(Debug, Clone)]
pub struct TransferTarget {
    pub host: String,
    pub user: String,
    pub destination_dir: String,
    pub auth: Credential,
}

impl TransferTarget {
    /// Full remote path for a file named `name` under the destination
    /// directory.  Repeated deliveries of the same input always produce the
    /// same path (last write wins).
    pub fn remote_path(&self, name: &str) -> String {
        format!("{}/{}", self.destination_dir.trim_end_matches('/'), name)
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TransferError {
    /// The remote host rejected the supplied credentials.
    #[error("VM authentication failed for user {user:?}: {detail}")]
    AuthFailed { user: String, detail: String },

    /// The remote host is unreachable, or connect/handshake timed out.
    #[error("could not connect to VM at {host}: {detail}")]
    ConnectionFailed { host: String, detail: String },

    /// Remote I/O error while writing the file (permissions, disk full, ...).
    #[error("remote write failed: {detail}")]
    WriteFailed { detail: String },
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Opens remote-copy sessions.  One implementation per transport.
#[async_trait::async_trait]
pub trait RemoteWriter: Send + Sync {
    async fn open(&self, target: &TransferTarget)
        -> Result<Box<dyn RemoteSession>, TransferError>;
}

/// A single authenticated session against one target.
///
/// Callers must invoke [`close`](RemoteSession::close) on every exit path;
/// implementations release the underlying connection there.
#[async_trait::async_trait]
pub trait RemoteSession: Send {
    /// Write `contents` to `{destination_dir}/{name}` on the remote host,
    /// replacing any existing file.
    async fn write_file(&mut self, name: &str, contents: &[u8]) -> Result<(), TransferError>;

    /// Release the session.  Idempotent.
    async fn close(&mut self) -> Result<(), TransferError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
