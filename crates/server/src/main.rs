//! Voice agent server entry point.

use tracing_subscriber::EnvFilter;

use voice_agent_config::{load_settings, Settings};
use voice_agent_server::{create_router, metrics::init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("VOICE_AGENT_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => {
            eprintln!("Loaded configuration (env: {})", env.as_deref().unwrap_or("default"));
            settings
        }
        Err(e) => {
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&settings);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting voice agent server");

    let metrics = init_metrics();
    tracing::info!("initialized prometheus metrics at /metrics");

    let host = settings.server.host.clone();
    let port = settings.server.port;

    let state = AppState::bootstrap(settings, metrics).await?;
    tracing::info!("application state bootstrapped");

    let _job_runner_shutdown = state.job_runner.clone().spawn();
    let _session_cleanup_shutdown = state.sessions.clone().start_cleanup_task();

    let app = create_router(state);

    let addr = format!("{host}:{port}");
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, initiating graceful shutdown"),
        _ = terminate => tracing::info!("received sigterm, initiating graceful shutdown"),
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("voice_agent={},tower_http=info", settings.observability.log_level)));

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    if settings.observability.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}
