//! Network listener: bind, serve on a background task, close-once stop.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::runtime::ListenerControl;

pub mod routes;

/// Bound on joining the serve task after cancellation.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("serve: {0}")]
    Serve(std::io::Error),
    #[error("listener did not stop within {0:?}")]
    StopTimeout(Duration),
}

/// A bound listener whose accept loop runs on its own task.
///
/// Genuine accept-loop failures arrive on the fatal channel returned by
/// [`Listener::bind`]. An error observed after our own cancellation token
/// fired is the expected-closure case and is never forwarded there.
pub struct Listener {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    serve_task: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    /// Bind `addr` and start serving immediately. Never blocks the caller on
    /// accept.
    pub async fn bind(
        addr: &str,
        router: Router,
    ) -> Result<(Self, mpsc::Receiver<ListenerError>), ListenerError> {
        let tcp = TcpListener::bind(addr)
            .await
            .map_err(|e| ListenerError::Bind {
                addr: addr.to_string(),
                source: e,
            })?;
        let local_addr = tcp.local_addr().map_err(ListenerError::Serve)?;
        let cancel = CancellationToken::new();
        let (fatal_tx, fatal_rx) = mpsc::channel(1);

        let token = cancel.clone();
        let serve_task = tokio::spawn(async move {
            let result = axum::serve(tcp, router)
                .with_graceful_shutdown(token.clone().cancelled_owned())
                .await;
            if let Err(e) = result {
                if token.is_cancelled() {
                    info!(error = %e, "listener closed");
                } else {
                    error!(error = %e, "listener failed");
                    let _ = fatal_tx.try_send(ListenerError::Serve(e));
                }
            }
        });

        Ok((
            Self {
                local_addr,
                cancel,
                serve_task: Mutex::new(Some(serve_task)),
            },
            fatal_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl ListenerControl for Listener {
    /// Graceful close: stop accepting, let in-flight connections drain, then
    /// join the serve task under a timeout. A second call is a no-op.
    async fn stop(&self) -> Result<(), ListenerError> {
        self.cancel.cancel();
        let task = {
            let mut guard = self
                .serve_task
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.take()
        };
        let Some(task) = task else {
            return Ok(());
        };
        match timeout(STOP_TIMEOUT, task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_err)) => Err(ListenerError::Serve(std::io::Error::other(join_err))),
            Err(_) => Err(ListenerError::StopTimeout(STOP_TIMEOUT)),
        }
    }
}
