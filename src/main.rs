use std::net::SocketAddr;
use transcript_relay::app::{RuntimeConfig, build_app, load_state};
use transcript_relay::error::{AppError, AppResult};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,transcript_relay=debug")
            }),
        )
        .json()
        .init();

    if let Err(err) = run().await {
        tracing::error!(code = %err.code, error = %err.message, "relay stopped");
        eprintln!("transcript-relay: {} ({})", err.message, err.code);
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    let state = load_state().await?;
    let addr = listen_addr(&state.runtime)?;
    let proxy_path = state.runtime.proxy_path.clone();
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::internal("listen_failed", format!("bind {addr}: {err}")))?;
    tracing::info!(%addr, %proxy_path, "relay listening");
    axum::serve(listener, app)
        .await
        .map_err(|err| AppError::internal("serve_failed", err.to_string()))
}

fn listen_addr(runtime: &RuntimeConfig) -> AppResult<SocketAddr> {
    runtime.listen.parse().map_err(|err| {
        AppError::internal(
            "listen_invalid",
            format!("RELAY_LISTEN {:?}: {err}", runtime.listen),
        )
    })
}
