//! Structured logging to stderr. `RUST_LOG` controls the filter;
//! `HIVEGATE_LOG_JSON=1` switches to JSON output for log shippers.

use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let json = matches!(std::env::var("HIVEGATE_LOG_JSON").as_deref(), Ok("1"));
    // try_init so tests and embedders that already installed a subscriber
    // are left alone.
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.pretty().try_init();
    }
}
