use std::fmt::Display;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use clap::Parser;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use verdict_core::config::Config;
use verdict_core::db::postgres::PostgresConnectionInfo;
use verdict_core::endpoints;
use verdict_core::gateway_util::AppStateData;
use verdict_core::observability::{self, LogFormat};

const DEFAULT_PORT: u16 = 5000;
const FRONTEND_ORIGIN: &str = "http://localhost:3000";

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Sets the log format used for all gateway logs.
    #[arg(long)]
    #[arg(value_enum)]
    #[clap(default_value_t = LogFormat::default())]
    log_format: LogFormat,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    // Set up logs immediately, so that we can use `tracing`.
    observability::setup_observability(args.log_format).expect_pretty("Failed to set up logs");

    let config = Arc::new(Config::from_env());

    let app_state = AppStateData::new(config)
        .await
        .expect_pretty("Failed to initialize AppState");

    let postgres_enabled_pretty = match &app_state.postgres {
        PostgresConnectionInfo::Enabled { .. } => "enabled",
        PostgresConnectionInfo::Disabled => "disabled",
    };

    let cors = CorsLayer::new()
        .allow_origin(
            FRONTEND_ORIGIN
                .parse::<HeaderValue>()
                .expect_pretty("Failed to parse frontend origin"),
        )
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let router = Router::new()
        .route("/health", get(endpoints::status::health_handler))
        .route(
            "/experiment/runOnePrompt",
            post(endpoints::experiment::run_one_prompt_handler),
        )
        .route(
            "/llm/aggregateScores",
            get(endpoints::aggregate::aggregate_scores_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let bind_address = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = match tokio::net::TcpListener::bind(bind_address).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            tracing::error!(
                "Failed to bind to socket address {bind_address}: {e}. Tip: Ensure no other process is using port {} or try a different port.",
                bind_address.port()
            );
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Failed to bind to socket address {bind_address}: {e}");
            std::process::exit(1);
        }
    };

    let actual_bind_address = listener
        .local_addr()
        .expect_pretty("Failed to get bind address from listener");

    tracing::info!("Verdict Gateway is listening on {actual_bind_address}");
    tracing::info!("└ Postgres: {postgres_enabled_pretty}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect_pretty("Failed to start server");
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect_pretty("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect_pretty("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        }
    };
}

/// We don't allow panic, unwrap, or similar methods in the codebase, except
/// for the private `expect_pretty` method, which is to be used only in main.rs
/// during initialization. After initialization, we expect all code to handle
/// errors gracefully.
///
/// `expect_pretty` will print an error message and exit with a status code of 1.
trait ExpectPretty<T> {
    fn expect_pretty(self, msg: &str) -> T;
}

impl<T, E: Display> ExpectPretty<T> for Result<T, E> {
    fn expect_pretty(self, msg: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::error!("{msg}: {err}");
                std::process::exit(1);
            }
        }
    }
}
