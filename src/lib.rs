//! Hivegate: a small service front-end. HTTP endpoints, a realtime broadcast
//! channel over WebSocket, and a coordinated single-shot shutdown that keeps
//! an external operator informed.
//!
//! # Architecture
//!
//! ```text
//! Service (entry point)
//!   │
//!   ├── Listener (axum serve task, close-once graceful stop)
//!   │     └── Router: /ping /health /ws /broadcast  (CORS from config)
//!   │
//!   ├── BroadcastHub (client registry, bounded per-client fan-out)
//!   │
//!   ├── ShutdownCoordinator (single actor: first trigger wins,
//!   │     stop listener → notify operator → release completion channel)
//!   │
//!   └── Notifier (fire-and-forget operator messages, Telegram transport)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use hivegate::{Notifier, Service, ServiceConfig};
//! use hivegate::runtime::install_signal_handlers;
//!
//! let config = ServiceConfig::from_env()?;
//! let notifier = Notifier::telegram(&config.operator.bot_token, config.operator.chat_id);
//! let service = Service::start(&config, notifier).await?;
//! install_signal_handlers(service.shutdown());
//! let termination = service.wait().await?;
//! ```

pub mod config;
pub mod hub;
pub mod logging;
pub mod notify;
pub mod runtime;
pub mod server;
pub mod service;

pub use config::{AccessConfig, AccessList, ConfigError, OperatorConfig, ServiceConfig};
pub use hub::{BroadcastHub, Subscription};
pub use notify::{Notifier, NotifyError, OperatorChannel, TelegramChannel};
pub use runtime::{
    install_signal_handlers, ListenerControl, ShutdownCoordinator, ShutdownState, Termination,
};
pub use server::{Listener, ListenerError};
pub use service::Service;
