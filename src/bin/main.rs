//! Hivegate server binary.
//!
//! Configuration comes from `HIVEGATE_*` environment variables, optionally
//! seeded from a `.env` file (`-e <file>` to pick a different one).

use hivegate::config::{load_env_file, ServiceConfig};
use hivegate::logging::init_logging;
use hivegate::notify::Notifier;
use hivegate::runtime::{install_signal_handlers, Termination};
use hivegate::service::Service;
use std::env;
use tracing::{error, info};

fn main() {
    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }
    if opts.version {
        println!("hivegate 0.1.0");
        return;
    }

    if let Err(e) = load_env_file(opts.env_file.as_deref()) {
        eprintln!("config error: {e}");
        std::process::exit(1);
    }
    if let Some(port) = opts.port {
        env::set_var("HIVEGATE_PORT", port.to_string());
    }

    init_logging();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match rt.block_on(run(config)) {
        Ok(Termination::Interrupt(_)) => {}
        Ok(Termination::ListenerFailure(_)) => std::process::exit(1),
        Err(e) => {
            error!(error = %e, "service failed");
            std::process::exit(1);
        }
    }
}

async fn run(config: ServiceConfig) -> anyhow::Result<Termination> {
    let notifier = Notifier::telegram(&config.operator.bot_token, config.operator.chat_id);
    let service = Service::start(&config, notifier).await?;
    install_signal_handlers(service.shutdown());

    info!("Endpoints:");
    info!("  GET  /ping       - liveness check");
    info!("  GET  /health     - health check");
    info!("  GET  /ws         - realtime upgrade");
    info!("  POST /broadcast  - admin broadcast");
    info!("press Ctrl+C to stop");

    let termination = service.wait().await?;
    info!(cause = %termination, "service stopped");
    Ok(termination)
}

#[derive(Default)]
struct ParsedArgs {
    env_file: Option<String>,
    port: Option<u16>,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        let mut opts = ParsedArgs::default();
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--env-file" | "-e" => {
                    if i + 1 < args.len() {
                        opts.env_file = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        opts.port = args[i + 1].parse().ok();
                        i += 1;
                    }
                }
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }
        opts
    }
}

fn print_usage() {
    println!(
        r#"hivegate - HTTP + realtime broadcast front-end

USAGE:
    hivegate [options]

OPTIONS:
    --env-file, -e <file>   Env file to load (default: .env)
    --port, -p <port>       Override HIVEGATE_PORT
    --help, -h              Print this help
    --version, -V           Print version

ENVIRONMENT:
    HIVEGATE_HOST               Bind host (default: 0.0.0.0)
    HIVEGATE_PORT               Bind port (required)
    HIVEGATE_BOT_TOKEN          Operator bot token (required)
    HIVEGATE_CHAT_ID            Operator chat id (required)
    HIVEGATE_ACCESS_ORIGIN      CORS allowed origins (default: *)
    HIVEGATE_ACCESS_METHOD      CORS allowed methods (default: *)
    HIVEGATE_ACCESS_HEADER      CORS allowed headers (default: *)
    HIVEGATE_ACCESS_CREDENTIAL  CORS allow credentials (default: false)
    HIVEGATE_LOG_JSON           Set to 1 for JSON log output
"#
    );
}
