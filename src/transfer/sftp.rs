//! SSH/SFTP implementation of [`RemoteWriter`].
//!
//! One russh client session per delivery: connect, authenticate (password or
//! private key), open the `sftp` subsystem, write the file, disconnect.
//! Sessions are never pooled or reused.

use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle};
use russh::Disconnect;
use russh_keys::key;
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{Credential, RemoteSession, RemoteWriter, TransferError, TransferTarget};

const SSH_PORT: u16 = 22;

// ---------------------------------------------------------------------------
// Host key handling
// ---------------------------------------------------------------------------

/// Accepts whatever host key the VM presents.
///
/// The target host comes from operator configuration, not from the request;
/// validating the VM beyond the operator-supplied credentials is out of scope.
struct HostKeyAcceptor;

#[async_trait::async_trait]
impl client::Handler for HostKeyAcceptor {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Production [`RemoteWriter`] speaking SSH/SFTP via russh.
pub struct SftpWriter {
    connect_timeout: Duration,
}

impl SftpWriter {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait::async_trait]
impl RemoteWriter for SftpWriter {
    async fn open(
        &self,
        target: &TransferTarget,
    ) -> Result<Box<dyn RemoteSession>, TransferError> {
        let config = Arc::new(client::Config::default());

        debug!(host = %target.host, user = %target.user, "opening SSH session");

        let mut handle = timeout(
            self.connect_timeout,
            client::connect(config, (target.host.as_str(), SSH_PORT), HostKeyAcceptor),
        )
        .await
        .map_err(|_| TransferError::ConnectionFailed {
            host: target.host.clone(),
            detail: format!("connect timed out after {:?}", self.connect_timeout),
        })?
        .map_err(|e| TransferError::ConnectionFailed {
            host: target.host.clone(),
            detail: e.to_string(),
        })?;

        authenticate(&mut handle, target).await?;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| TransferError::ConnectionFailed {
                host: target.host.clone(),
                detail: format!("failed to open SSH channel: {e}"),
            })?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| TransferError::ConnectionFailed {
                host: target.host.clone(),
                detail: format!("SFTP subsystem unavailable: {e}"),
            })?;

        let sftp = SftpSession::new(channel.into_stream()).await.map_err(|e| {
            TransferError::ConnectionFailed {
                host: target.host.clone(),
                detail: format!("SFTP handshake failed: {e}"),
            }
        })?;

        info!(host = %target.host, user = %target.user, "SSH/SFTP session established");

        Ok(Box::new(SftpRemoteSession {
            handle: Some(handle),
            sftp: Some(sftp),
            target: target.clone(),
        }))
    }
}

/// Authenticate with the target's single credential mode.
async fn authenticate(
    handle: &mut Handle<HostKeyAcceptor>,
    target: &TransferTarget,
) -> Result<(), TransferError> {
    let accepted = match &target.auth {
        Credential::Password(password) => handle
            .authenticate_password(target.user.as_str(), password.as_str())
            .await
            .map_err(|e| TransferError::AuthFailed {
                user: target.user.clone(),
                detail: e.to_string(),
            })?,
        Credential::KeyFile(path) => {
            let key_pair = russh_keys::load_secret_key(path, None).map_err(|e| {
                TransferError::AuthFailed {
                    user: target.user.clone(),
                    detail: format!("cannot load key {}: {e}", path.display()),
                }
            })?;
            handle
                .authenticate_publickey(target.user.as_str(), Arc::new(key_pair))
                .await
                .map_err(|e| TransferError::AuthFailed {
                    user: target.user.clone(),
                    detail: e.to_string(),
                })?
        }
    };

    if !accepted {
        return Err(TransferError::AuthFailed {
            user: target.user.clone(),
            detail: "credentials rejected by the VM".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct SftpRemoteSession {
    handle: Option<Handle<HostKeyAcceptor>>,
    sftp: Option<SftpSession>,
    target: TransferTarget,
}

#[async_trait::async_trait]
impl RemoteSession for SftpRemoteSession {
    async fn write_file(&mut self, name: &str, contents: &[u8]) -> Result<(), TransferError> {
        let sftp = self.sftp.as_ref().ok_or_else(|| TransferError::WriteFailed {
            detail: "session already closed".into(),
        })?;

        // Best-effort: the destination directory may already exist.
        if let Err(e) = sftp.create_dir(&self.target.destination_dir).await {
            debug!(
                dir = %self.target.destination_dir,
                error = %e,
                "create_dir on destination failed (probably already exists)"
            );
        }

        let remote_path = self.target.remote_path(name);
        debug!(%remote_path, bytes = contents.len(), "writing remote file");

        let mut file = sftp
            .create(&remote_path)
            .await
            .map_err(|e| TransferError::WriteFailed {
                detail: format!("cannot create {remote_path}: {e}"),
            })?;

        file.write_all(contents)
            .await
            .map_err(|e| TransferError::WriteFailed {
                detail: format!("write to {remote_path} failed: {e}"),
            })?;

        file.shutdown()
            .await
            .map_err(|e| TransferError::WriteFailed {
                detail: format!("closing {remote_path} failed: {e}"),
            })?;

        info!(%remote_path, bytes = contents.len(), "remote file written");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransferError> {
        if let Some(sftp) = self.sftp.take() {
            if let Err(e) = sftp.close().await {
                warn!(error = %e, "SFTP session close failed");
            }
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "delivery complete", "en")
                .await
            {
                warn!(error = %e, "SSH disconnect failed");
            }
        }
        Ok(())
    }
}
