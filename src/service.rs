//! Top-level orchestration: wire the hub, listener, coordinator, and signal
//! triggers together, then wait for the single completion channel.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::oneshot;
use tracing::info;

use crate::config::ServiceConfig;
use crate::hub::BroadcastHub;
use crate::notify::Notifier;
use crate::runtime::{ShutdownCoordinator, Termination};
use crate::server::{routes, Listener, ListenerError};

pub struct Service {
    hub: Arc<BroadcastHub>,
    coordinator: ShutdownCoordinator,
    done: oneshot::Receiver<Termination>,
    local_addr: SocketAddr,
}

impl Service {
    /// Bind the listener and start every background task. Returns once the
    /// service is accepting connections; the startup notification is
    /// dispatched fire-and-forget and does not gate readiness.
    pub async fn start(config: &ServiceConfig, notifier: Notifier) -> Result<Self, ListenerError> {
        let hub = Arc::new(BroadcastHub::new());
        let router = routes::create_router(Arc::clone(&hub), &config.access, "hivegate");

        let (listener, mut fatal_rx) = Listener::bind(&config.bind_addr(), router).await?;
        let local_addr = listener.local_addr();
        // Configured host, actual port (the configured port may be 0).
        let service_addr = format!("{}:{}", config.host, local_addr.port());

        let (coordinator, done) = ShutdownCoordinator::spawn(
            Arc::new(listener),
            notifier.clone(),
            service_addr.clone(),
        );

        // A fatal listener error is just another shutdown trigger.
        let trigger = coordinator.clone();
        tokio::spawn(async move {
            if let Some(e) = fatal_rx.recv().await {
                trigger.trigger(Termination::ListenerFailure(e));
            }
        });

        info!("listening on {service_addr}");
        notifier.notify(format!("listening on {service_addr}"));

        Ok(Self {
            hub,
            coordinator,
            done,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn hub(&self) -> Arc<BroadcastHub> {
        Arc::clone(&self.hub)
    }

    /// Handle for submitting termination triggers (signals, tests).
    pub fn shutdown(&self) -> ShutdownCoordinator {
        self.coordinator.clone()
    }

    /// Block until the shutdown sequence has completed, returning its cause.
    pub async fn wait(self) -> anyhow::Result<Termination> {
        self.done.await.context("shutdown coordinator dropped")
    }
}
