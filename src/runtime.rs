//! Shutdown coordination and signal handling.
//!
//! One coordinator task owns the whole stopping sequence. Both triggers
//! (operator interrupt, listener fatal error) funnel through a single inbound
//! channel, so "exactly once" is structural: the task consumes the first
//! event, runs stop → notify → release, and drains everything after it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::notify::Notifier;
use crate::server::ListenerError;

/// Why execution is ending. Produced exactly once per process lifetime.
#[derive(Debug)]
pub enum Termination {
    /// Operator interrupt, carrying the signal name.
    Interrupt(&'static str),
    /// The listener failed for a reason other than our own `stop()`.
    ListenerFailure(ListenerError),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Interrupt(signal) => write!(f, "interrupt: {signal}"),
            Termination::ListenerFailure(e) => write!(f, "listener failure: {e}"),
        }
    }
}

/// The one thing the coordinator is allowed to do to the listener.
#[async_trait]
pub trait ListenerControl: Send + Sync {
    /// Graceful close: stop accepting, release existing connections.
    async fn stop(&self) -> Result<(), ListenerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Stopping,
    Stopped,
}

/// Handle for feeding termination triggers to the coordinator task.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    trigger_tx: mpsc::Sender<Termination>,
    state_rx: watch::Receiver<ShutdownState>,
}

impl ShutdownCoordinator {
    /// Spawn the coordinator. The returned receiver fires once, after the
    /// listener has been closed and the operator notified.
    pub fn spawn(
        listener: Arc<dyn ListenerControl>,
        notifier: Notifier,
        service_addr: String,
    ) -> (Self, oneshot::Receiver<Termination>) {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<Termination>(4);
        let (state_tx, state_rx) = watch::channel(ShutdownState::Running);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            let Some(event) = trigger_rx.recv().await else {
                return;
            };
            let _ = state_tx.send(ShutdownState::Stopping);
            info!(cause = %event, "stopping listener");

            let close_result = listener.stop().await;

            let mut message = format!("{service_addr} service closed ({event})");
            if let Err(e) = &close_result {
                message.push_str(&format!("; close error: {e}"));
            }
            // Detached inside the notifier; a slow operator channel cannot
            // delay process exit.
            notifier.notify(message);

            let _ = state_tx.send(ShutdownState::Stopped);
            let _ = done_tx.send(event);

            // Observe and discard any trigger that lost the race.
            while let Some(late) = trigger_rx.recv().await {
                debug!(cause = %late, "ignoring trigger after shutdown");
            }
        });

        (
            Self {
                trigger_tx,
                state_rx,
            },
            done_rx,
        )
    }

    /// Submit a termination trigger. Safe to call from any task, any number
    /// of times; only the first ever submitted takes effect.
    pub fn trigger(&self, event: Termination) {
        let _ = self.trigger_tx.try_send(event);
    }

    pub fn state(&self) -> ShutdownState {
        *self.state_rx.borrow()
    }
}

/// Install SIGINT/SIGTERM handlers that feed the coordinator.
pub fn install_signal_handlers(coordinator: ShutdownCoordinator) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");
            let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler");

            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            info!("Received {name}");
            coordinator.trigger(Termination::Interrupt(name));
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.expect("Ctrl+C handler");
            info!("Received Ctrl+C");
            coordinator.trigger(Termination::Interrupt("ctrl-c"));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::OperatorChannel;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    struct CountingListener {
        stops: AtomicUsize,
        fail_close: bool,
    }

    impl CountingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                stops: AtomicUsize::new(0),
                fail_close: false,
            })
        }
    }

    #[async_trait]
    impl ListenerControl for CountingListener {
        async fn stop(&self) -> Result<(), ListenerError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(ListenerError::Serve(io::Error::other("close exploded")));
            }
            Ok(())
        }
    }

    struct RecordingChannel {
        messages: Mutex<Vec<String>>,
    }

    impl RecordingChannel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                messages: Mutex::new(Vec::new()),
            })
        }

        fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OperatorChannel for RecordingChannel {
        async fn send(&self, _recipient: i64, text: &str) -> Result<(), crate::notify::NotifyError> {
            self.messages.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn concurrent_triggers_collapse_to_one_sequence() {
        let listener = CountingListener::new();
        let channel = RecordingChannel::new();
        let notifier = Notifier::new(channel.clone(), 1);
        let (coordinator, done) =
            ShutdownCoordinator::spawn(listener.clone(), notifier, "127.0.0.1:0".into());

        let mut tasks = Vec::new();
        for i in 0..8 {
            let c = coordinator.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    c.trigger(Termination::Interrupt("SIGINT"));
                } else {
                    c.trigger(Termination::ListenerFailure(ListenerError::Serve(
                        io::Error::other("accept blew up"),
                    )));
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        timeout(Duration::from_secs(1), done).await.unwrap().unwrap();
        settle().await;

        assert_eq!(listener.stops.load(Ordering::SeqCst), 1);
        assert_eq!(channel.messages().len(), 1);
        assert_eq!(coordinator.state(), ShutdownState::Stopped);
    }

    #[tokio::test]
    async fn interrupt_notification_contains_address() {
        let listener = CountingListener::new();
        let channel = RecordingChannel::new();
        let notifier = Notifier::new(channel.clone(), 1);
        let (coordinator, done) =
            ShutdownCoordinator::spawn(listener, notifier, "10.0.0.5:8080".into());

        coordinator.trigger(Termination::Interrupt("SIGTERM"));
        timeout(Duration::from_secs(1), done).await.unwrap().unwrap();
        settle().await;

        let messages = channel.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("10.0.0.5:8080"));
        assert!(messages[0].contains("SIGTERM"));
    }

    #[tokio::test]
    async fn listener_failure_detail_reaches_operator() {
        let listener = CountingListener::new();
        let channel = RecordingChannel::new();
        let notifier = Notifier::new(channel.clone(), 1);
        let (coordinator, done) =
            ShutdownCoordinator::spawn(listener.clone(), notifier, "127.0.0.1:9000".into());

        coordinator.trigger(Termination::ListenerFailure(ListenerError::Serve(
            io::Error::other("address vanished"),
        )));
        let event = timeout(Duration::from_secs(1), done).await.unwrap().unwrap();
        settle().await;

        assert!(matches!(event, Termination::ListenerFailure(_)));
        assert_eq!(listener.stops.load(Ordering::SeqCst), 1);
        let messages = channel.messages();
        assert!(messages[0].contains("address vanished"));
    }

    #[tokio::test]
    async fn close_error_is_reported_but_shutdown_completes() {
        let listener = Arc::new(CountingListener {
            stops: AtomicUsize::new(0),
            fail_close: true,
        });
        let channel = RecordingChannel::new();
        let notifier = Notifier::new(channel.clone(), 1);
        let (coordinator, done) =
            ShutdownCoordinator::spawn(listener, notifier, "127.0.0.1:1234".into());

        coordinator.trigger(Termination::Interrupt("SIGINT"));
        timeout(Duration::from_secs(1), done).await.unwrap().unwrap();
        settle().await;

        assert_eq!(coordinator.state(), ShutdownState::Stopped);
        let messages = channel.messages();
        assert!(messages[0].contains("close error"));
        assert!(messages[0].contains("close exploded"));
    }

    #[tokio::test]
    async fn state_starts_running() {
        let listener = CountingListener::new();
        let channel = RecordingChannel::new();
        let notifier = Notifier::new(channel, 1);
        let (coordinator, _done) =
            ShutdownCoordinator::spawn(listener, notifier, "127.0.0.1:0".into());
        assert_eq!(coordinator.state(), ShutdownState::Running);
    }

    #[tokio::test]
    async fn late_trigger_is_ignored_not_rerun() {
        let listener = CountingListener::new();
        let channel = RecordingChannel::new();
        let notifier = Notifier::new(channel.clone(), 1);
        let (coordinator, done) =
            ShutdownCoordinator::spawn(listener.clone(), notifier, "127.0.0.1:0".into());

        coordinator.trigger(Termination::Interrupt("SIGINT"));
        timeout(Duration::from_secs(1), done).await.unwrap().unwrap();

        coordinator.trigger(Termination::Interrupt("SIGTERM"));
        settle().await;

        assert_eq!(listener.stops.load(Ordering::SeqCst), 1);
        assert_eq!(channel.messages().len(), 1);
    }
}
