//! Fetch-and-transfer: the single-shot delivery workflow.
//!
//! A delivery downloads the referenced GitHub file and writes it to the
//! transfer target over one remote session.  Every failure short-circuits the
//! remaining steps; the session is closed on every exit path.  There is no
//! retry and no partial-success state: either the file lands at the
//! destination or no transfer is reported.

use thiserror::Error;
use tracing::{info, instrument};

use crate::fetch::{self, FetchError};
use crate::github::GitHubReference;
use crate::transfer::{RemoteWriter, TransferError, TransferTarget};

// ---------------------------------------------------------------------------
// Result and error types
// ---------------------------------------------------------------------------

/// What a successful delivery reports back to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub file_name: String,
    pub vm_host: String,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// Fetch the referenced file and write it to the target.
#[instrument(skip(client, writer, target), fields(owner = %reference.owner, repo = %reference.repo))]
pub async fn deliver(
    client: &reqwest::Client,
    writer: &dyn RemoteWriter,
    reference: &GitHubReference,
    target: &TransferTarget,
) -> Result<DeliveryReport, DeliveryError> {
    deliver_from_url(
        client,
        writer,
        &reference.raw_url(),
        reference.file_name(),
        target,
    )
    .await
}

/// The transport-level half of [`deliver`], taking the already-translated
/// raw-content URL.  Split out so tests can point it at a local fixture.
async fn deliver_from_url(
    client: &reqwest::Client,
    writer: &dyn RemoteWriter,
    raw_url: &str,
    file_name: &str,
    target: &TransferTarget,
) -> Result<DeliveryReport, DeliveryError> {
    let bytes = fetch::fetch_raw(client, raw_url).await?;

    let mut session = writer.open(target).await?;

    // Close on both exit paths; a close failure after a successful write
    // still fails the delivery so no half-finished transfer is reported.
    let write_result = session.write_file(file_name, &bytes).await;
    let close_result = session.close().await;
    write_result?;
    close_result?;

    info!(
        file_name = %file_name,
        vm_host = %target.host,
        bytes = bytes.len(),
        "delivery complete"
    );

    Ok(DeliveryReport {
        file_name: file_name.to_string(),
        vm_host: target.host.clone(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{Credential, RemoteSession};
    use std::sync::{Arc, Mutex};

    // ── Fakes ───────────────────────────────────────────────────────────

    /// Records every write; shared with the test through an Arc.
    #[derive(Default)]
    struct MemoryWriter {
        files: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
        closed: Arc<Mutex<u32>>,
    }

    struct MemorySession {
        files: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
        closed: Arc<Mutex<u32>>,
        fail_write: bool,
    }

    #[async_trait::async_trait]
    impl RemoteWriter for MemoryWriter {
        async fn open(
            &self,
            _target: &TransferTarget,
        ) -> Result<Box<dyn RemoteSession>, TransferError> {
            Ok(Box::new(MemorySession {
                files: Arc::clone(&self.files),
                closed: Arc::clone(&self.closed),
                fail_write: false,
            }))
        }
    }

    #[async_trait::async_trait]
    impl RemoteSession for MemorySession {
        async fn write_file(&mut self, name: &str, contents: &[u8]) -> Result<(), TransferError> {
            if self.fail_write {
                return Err(TransferError::WriteFailed {
                    detail: "disk full".into(),
                });
            }
            self.files
                .lock()
                .unwrap()
                .push((name.to_string(), contents.to_vec()));
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransferError> {
            *self.closed.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// A writer whose target is unreachable.
    struct UnreachableWriter;

    #[async_trait::async_trait]
    impl RemoteWriter for UnreachableWriter {
        async fn open(
            &self,
            target: &TransferTarget,
        ) -> Result<Box<dyn RemoteSession>, TransferError> {
            Err(TransferError::ConnectionFailed {
                host: target.host.clone(),
                detail: "connect timed out".into(),
            })
        }
    }

    /// A writer whose session always fails the write.
    struct FailingWriter {
        closed: Arc<Mutex<u32>>,
    }

    #[async_trait::async_trait]
    impl RemoteWriter for FailingWriter {
        async fn open(
            &self,
            _target: &TransferTarget,
        ) -> Result<Box<dyn RemoteSession>, TransferError> {
            Ok(Box::new(MemorySession {
                files: Arc::default(),
                closed: Arc::clone(&self.closed),
                fail_write: true,
            }))
        }
    }

    // ── Fixture server ──────────────────────────────────────────────────

    async fn fixture(body: &'static [u8]) -> String {
        use axum::routing::get;
        let app = axum::Router::new().route("/raw/README.md", get(move || async move { body }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/raw/README.md")
    }

    fn target() -> TransferTarget {
        TransferTarget {
            host: "10.0.0.1".into(),
            user: "root".into(),
            destination_dir: "/tmp".into(),
            auth: Credential::Password("pw".into()),
        }
    }

    // ── Tests ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn delivers_exactly_one_file_with_fetched_bytes() {
        let url = fixture(b"# Hello World").await;
        let writer = MemoryWriter::default();
        let files = Arc::clone(&writer.files);
        let closed = Arc::clone(&writer.closed);

        let report =
            deliver_from_url(&reqwest::Client::new(), &writer, &url, "README.md", &target())
                .await
                .unwrap();

        assert_eq!(report.file_name, "README.md");
        assert_eq!(report.vm_host, "10.0.0.1");

        let files = files.lock().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "README.md");
        assert_eq!(files[0].1, b"# Hello World");
        assert_eq!(*closed.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn repeated_deliveries_target_the_same_name() {
        let url = fixture(b"v2").await;
        let writer = MemoryWriter::default();
        let files = Arc::clone(&writer.files);

        for _ in 0..2 {
            deliver_from_url(&reqwest::Client::new(), &writer, &url, "README.md", &target())
                .await
                .unwrap();
        }

        let files = files.lock().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].0, files[1].0);
    }

    #[tokio::test]
    async fn unreachable_vm_fails_with_connection_failed_and_no_write() {
        let url = fixture(b"content").await;
        let err = deliver_from_url(
            &reqwest::Client::new(),
            &UnreachableWriter,
            &url,
            "README.md",
            &target(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            DeliveryError::Transfer(TransferError::ConnectionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn write_failure_still_closes_the_session() {
        let url = fixture(b"content").await;
        let closed = Arc::new(Mutex::new(0));
        let writer = FailingWriter {
            closed: Arc::clone(&closed),
        };

        let err = deliver_from_url(&reqwest::Client::new(), &writer, &url, "f.txt", &target())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeliveryError::Transfer(TransferError::WriteFailed { .. })
        ));
        assert_eq!(*closed.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_never_opens_a_session() {
        // Writer that panics if opened.
        struct PanickingWriter;

        #[async_trait::async_trait]
        impl RemoteWriter for PanickingWriter {
            async fn open(
                &self,
                _target: &TransferTarget,
            ) -> Result<Box<dyn RemoteSession>, TransferError> {
                panic!("session must not be opened when the fetch fails");
            }
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(500))
            .build()
            .unwrap();

        let err = deliver_from_url(
            &client,
            &PanickingWriter,
            "http://192.0.2.1:9/raw/x",
            "x",
            &target(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DeliveryError::Fetch(_)));
    }
}
