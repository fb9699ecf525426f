use crate::config::CandidateList;
use crate::corpus::Corpus;
use crate::error::{AppError, AppResult};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::routing::{any, get};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::{Arc, Once, OnceLock};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub http: reqwest::Client,
    pub metrics: PrometheusHandle,
    pub corpus: Arc<Corpus>,
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_ERROR: OnceLock<AppError> = OnceLock::new();
static METRICS_INIT: Once = Once::new();

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: String,
    pub proxy_path: String,
    pub metrics_path: String,
    pub candidates: CandidateList,
    pub request_timeout_ms: u64,
    pub corpus_path: Option<PathBuf>,
    pub max_body_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            proxy_path: "/api/chat".to_string(),
            metrics_path: "/metrics".to_string(),
            candidates: CandidateList::default(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            corpus_path: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();
        let candidates = match env_non_blank("RELAY_UPSTREAM_CANDIDATES") {
            Some(raw) => CandidateList::from_json(&raw).map_err(|err| {
                AppError::new(StatusCode::BAD_REQUEST, "candidates_invalid", err)
            })?,
            None => defaults.candidates,
        };
        Ok(Self {
            listen: env_non_blank("RELAY_LISTEN").unwrap_or(defaults.listen),
            proxy_path: env_non_blank("RELAY_PROXY_PATH").unwrap_or(defaults.proxy_path),
            metrics_path: env_non_blank("RELAY_METRICS_PATH").unwrap_or(defaults.metrics_path),
            candidates,
            request_timeout_ms: env_parsed("RELAY_REQUEST_TIMEOUT_MS")?
                .unwrap_or(defaults.request_timeout_ms),
            corpus_path: env_non_blank("RELAY_CORPUS_PATH").map(PathBuf::from),
            max_body_bytes: env_parsed("RELAY_MAX_BODY_BYTES")?.unwrap_or(defaults.max_body_bytes),
        })
    }
}

fn env_non_blank(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T>(name: &str) -> AppResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_non_blank(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|err| {
                AppError::new(
                    StatusCode::BAD_REQUEST,
                    "config_invalid",
                    format!("{name}: {err}"),
                )
            })
        })
        .transpose()
}

pub async fn load_state() -> AppResult<AppState> {
    load_state_with_runtime(RuntimeConfig::from_env()?).await
}

pub async fn load_state_with_runtime(runtime: RuntimeConfig) -> AppResult<AppState> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("transcript-relay/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| AppError::internal("http_client_init_failed", err.to_string()))?;

    let corpus = match runtime.corpus_path.as_deref() {
        Some(path) => {
            let corpus = Corpus::load(path)
                .await
                .map_err(|err| AppError::internal("corpus_load_failed", err.to_string()))?;
            tracing::info!(path = %path.display(), videos = corpus.videos().len(), "corpus loaded");
            corpus
        }
        None => Corpus::default(),
    };

    let metrics = init_metrics()?;

    tracing::info!(
        candidates = runtime.candidates.len(),
        proxy_path = %runtime.proxy_path,
        "relay configured"
    );

    Ok(AppState {
        runtime: Arc::new(runtime),
        http,
        metrics,
        corpus: Arc::new(corpus),
    })
}

fn init_metrics() -> AppResult<PrometheusHandle> {
    METRICS_INIT.call_once(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(err) => {
                let err = AppError::internal("metrics_init_failed", err.to_string());
                let _ = METRICS_ERROR.set(err);
            }
        }
    });

    if let Some(err) = METRICS_ERROR.get() {
        return Err(err.clone());
    }
    METRICS_HANDLE
        .get()
        .cloned()
        .ok_or_else(|| AppError::internal("metrics_init_failed", "metrics recorder not available"))
}

pub fn build_app(state: AppState) -> Router {
    let runtime = state.runtime.clone();
    Router::<AppState>::new()
        .merge(build_proxy_router(&runtime.proxy_path))
        .merge(build_corpus_router())
        .route(&runtime.metrics_path, get(crate::handlers::metrics))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(runtime.max_body_bytes))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .layer(TraceLayer::new_for_http())
}

fn build_proxy_router(proxy_path: &str) -> Router<AppState> {
    Router::new()
        .route(proxy_path, any(crate::handlers::proxy_chat))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
}

fn build_corpus_router() -> Router<AppState> {
    Router::new()
        .route("/api/videos", get(crate::handlers::search_videos))
        .route("/api/presenters", get(crate::handlers::list_presenters))
        .route("/api/stats", get(crate::handlers::corpus_stats))
}
