use crate::app::AppState;
use crate::chat::ChatRequest;
use crate::corpus::{CorpusStats, PresenterEntry, VideoListing};
use crate::error::{AppError, AppResult};
use crate::relay::{self, ProxyOutcome, UpstreamStream};
use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, ALLOW, CACHE_CONTROL, CONTENT_TYPE,
};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream;
use serde::Deserialize;
use std::convert::Infallible;

const ALLOWED_METHODS: &str = "POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Accept, Authorization";
const PREFLIGHT_MAX_AGE_SECS: &str = "86400";

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

/// Inbound chat endpoint. OPTIONS is answered locally, POST is relayed, any
/// other method is refused without contacting the upstream.
pub async fn proxy_chat(
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> AppResult<Response> {
    if method == Method::OPTIONS {
        return Ok(preflight_response());
    }
    if method != Method::POST {
        let mut resp = AppError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            format!("method {method} is not allowed; use POST"),
        )
        .into_response();
        resp.headers_mut()
            .insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        return Ok(resp);
    }

    let req = parse_chat_request(&body)?;
    let outcome = relay::relay(
        &state.http,
        &state.runtime.candidates,
        &req,
        state.runtime.request_timeout_ms,
    )
    .await;
    match outcome {
        ProxyOutcome::Streaming(upstream) => {
            metrics::counter!("relay_requests_total", "result" => "streamed").increment(1);
            stream_response(upstream)
        }
        ProxyOutcome::Failed(failure) => {
            metrics::counter!("relay_requests_total", "result" => "failed").increment(1);
            Err(failure.into_app_error())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

pub async fn search_videos(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let listings: Vec<VideoListing<'_>> = state
        .corpus
        .search(&params.q)
        .into_iter()
        .map(VideoListing::from)
        .collect();
    Json(listings).into_response()
}

/// Presenter directory, optionally narrowed by `q` on name or affiliation.
pub async fn list_presenters(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<PresenterEntry>> {
    Json(state.corpus.presenters(&params.q))
}

pub async fn corpus_stats(State(state): State<AppState>) -> Json<CorpusStats> {
    Json(state.corpus.stats())
}

fn parse_chat_request(body: &[u8]) -> AppResult<ChatRequest> {
    let req: ChatRequest = serde_json::from_slice(body)
        .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, "invalid_json", err.to_string()))?;
    if req.messages.is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "messages must not be empty",
        ));
    }
    Ok(req)
}

fn preflight_response() -> Response {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS)
        .header(ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS)
        .header(ACCESS_CONTROL_MAX_AGE, PREFLIGHT_MAX_AGE_SECS)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::NO_CONTENT.into_response())
}

// The body is relayed chunk by chunk as it arrives. No Connection header is
// set; the server owns hop-by-hop headers.
fn stream_response(upstream: UpstreamStream) -> AppResult<Response> {
    let UpstreamStream {
        status,
        content_type,
        candidate_url,
        response,
        ..
    } = upstream;
    let body = stream::unfold(response, move |mut response| {
        let candidate_url = candidate_url.clone();
        async move {
            match response.chunk().await {
                Ok(Some(chunk)) => Some((Ok::<Bytes, Infallible>(chunk), response)),
                Ok(None) => None,
                Err(err) => {
                    tracing::warn!(
                        candidate = %candidate_url,
                        error = %err,
                        "upstream stream interrupted"
                    );
                    None
                }
            }
        }
    });
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .header(CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body))
        .map_err(|err| AppError::internal("response_build_failed", err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_is_a_client_error() {
        let err = parse_chat_request(b"{\"model\":").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "invalid_json");
    }

    #[test]
    fn empty_messages_are_rejected() {
        let err = parse_chat_request(br#"{"model":"m","messages":[]}"#).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "invalid_request");
    }

    #[test]
    fn preflight_is_empty_204_allowing_post() {
        let resp = preflight_response();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let methods = resp.headers()[ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        assert!(methods.contains("POST"));
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(resp.headers().contains_key(ACCESS_CONTROL_MAX_AGE));
    }
}
