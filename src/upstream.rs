use crate::chat::ChatRequest;
use crate::config::{CandidateMethod, UpstreamCandidate};
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::time::Duration;

pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");
pub const COURSE_NAME_HEADER: HeaderName = HeaderName::from_static("x-course-name");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// The request could not be built (bad header value, unserializable body).
    Request,
    Network,
    Timeout,
}

#[derive(Debug, Clone)]
pub struct UpstreamCallError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamCallError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for UpstreamCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Sends `req` to one candidate and returns the response whatever its status.
/// The body is left unread. `timeout_ms` bounds the wait for response headers
/// only, so long streams are not cut off.
pub async fn send_to_candidate(
    client: &reqwest::Client,
    candidate: &UpstreamCandidate,
    req: &ChatRequest,
    timeout_ms: u64,
) -> Result<reqwest::Response, UpstreamCallError> {
    let headers = build_headers(req)?;
    let builder = match candidate.method {
        CandidateMethod::Post => client.post(&candidate.url).json(req),
        CandidateMethod::Get => client.get(&candidate.url).query(&query_params(req)?),
    };
    let send = builder.headers(headers).send();
    match tokio::time::timeout(Duration::from_millis(timeout_ms), send).await {
        Ok(Ok(resp)) => Ok(resp),
        Ok(Err(err)) => Err(UpstreamCallError::new(
            UpstreamErrorKind::Network,
            err.to_string(),
        )),
        Err(_) => Err(UpstreamCallError::new(
            UpstreamErrorKind::Timeout,
            format!("no response from {} within {timeout_ms}ms", candidate.url),
        )),
    }
}

/// Headers sent on every attempt. The upstream's auth header is not pinned
/// down, so the key goes out as both a bearer token and `x-api-key`.
pub fn build_headers(req: &ChatRequest) -> Result<HeaderMap, UpstreamCallError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    if let Some(key) = req.api_key() {
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {key}"))?);
        headers.insert(API_KEY_HEADER, header_value(key)?);
    }
    if let Some(course) = req.course_name() {
        headers.insert(COURSE_NAME_HEADER, header_value(course)?);
    }
    Ok(headers)
}

/// Query form of the request for GET-style candidates. Message history does
/// not fit in flat parameters, so it travels as one JSON string.
pub fn query_params(req: &ChatRequest) -> Result<Vec<(&'static str, String)>, UpstreamCallError> {
    let messages = serde_json::to_string(&req.messages)
        .map_err(|err| UpstreamCallError::new(UpstreamErrorKind::Request, err.to_string()))?;
    let mut params = vec![
        ("model", req.model.clone()),
        ("messages", messages),
        ("stream", req.stream.to_string()),
        ("temperature", req.temperature.to_string()),
        ("retrieval_only", req.retrieval_only.to_string()),
    ];
    if let Some(key) = req.api_key() {
        params.push(("api_key", key.to_string()));
    }
    if let Some(course) = req.course_name() {
        params.push(("course_name", course.to_string()));
    }
    Ok(params)
}

pub fn is_method_not_allowed(status: StatusCode) -> bool {
    status == StatusCode::METHOD_NOT_ALLOWED
}

fn header_value(raw: &str) -> Result<HeaderValue, UpstreamCallError> {
    HeaderValue::from_str(raw).map_err(|err| {
        UpstreamCallError::new(
            UpstreamErrorKind::Request,
            format!("invalid header value: {err}"),
        )
    })
}
