//! Walks the candidate list for one inbound request.
//!
//! Candidates are tried one at a time, in list order. A 2xx ends the walk and
//! the unread response is handed back for streaming. A 405 means the route or
//! method guess was wrong, so the next candidate is tried. Any other status
//! ends the walk immediately. So does a transport failure, including a failed
//! read of a rejection body, which is reported as a 500.

use crate::chat::ChatRequest;
use crate::config::CandidateList;
use crate::error::AppError;
use crate::upstream::{self, UpstreamCallError, UpstreamErrorKind};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;

#[derive(Debug)]
pub struct UpstreamStream {
    pub status: StatusCode,
    pub content_type: String,
    pub candidate_url: String,
    pub attempts: usize,
    pub response: reqwest::Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Every candidate answered 405.
    AllCandidatesRejected,
    /// A candidate answered with a status other than 2xx or 405.
    UpstreamRejected,
    Transport,
}

#[derive(Debug, Clone)]
pub struct RelayFailure {
    pub reason: FailureReason,
    pub status: StatusCode,
    pub upstream_text: String,
    pub attempts: usize,
}

impl RelayFailure {
    pub fn into_app_error(self) -> AppError {
        match self.reason {
            FailureReason::AllCandidatesRejected => AppError::new(
                self.status,
                "all_candidates_rejected",
                format!(
                    "all upstream candidates rejected the request (last status {}): {}",
                    self.status.as_u16(),
                    self.upstream_text
                ),
            )
            .with_type("upstream_error"),
            FailureReason::UpstreamRejected => AppError::new(
                self.status,
                "upstream_rejected",
                format!(
                    "upstream returned status {}: {}",
                    self.status.as_u16(),
                    self.upstream_text
                ),
            )
            .with_type("upstream_error"),
            FailureReason::Transport => {
                AppError::internal("upstream_transport_error", self.upstream_text)
            }
        }
    }
}

#[derive(Debug)]
pub enum ProxyOutcome {
    Streaming(UpstreamStream),
    Failed(RelayFailure),
}

pub async fn relay(
    client: &reqwest::Client,
    candidates: &CandidateList,
    req: &ChatRequest,
    timeout_ms: u64,
) -> ProxyOutcome {
    let mut last_failure: Option<RelayFailure> = None;
    let mut attempts = 0usize;

    for candidate in candidates.iter() {
        attempts += 1;
        let method = candidate.method.as_str();
        tracing::debug!(
            candidate = %candidate.url,
            method,
            attempt = attempts,
            "trying upstream candidate"
        );

        let resp = match upstream::send_to_candidate(client, candidate, req, timeout_ms).await {
            Ok(resp) => resp,
            Err(err) => {
                let failure = transport_failure(&candidate.url, method, err, attempts);
                return ProxyOutcome::Failed(failure);
            }
        };

        let status = resp.status();
        if status.is_success() {
            record_attempt(method, "success");
            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(mime::TEXT_EVENT_STREAM.as_ref())
                .to_string();
            tracing::info!(
                candidate = %candidate.url,
                method,
                %status,
                attempts,
                "upstream accepted request"
            );
            return ProxyOutcome::Streaming(UpstreamStream {
                status,
                content_type,
                candidate_url: candidate.url.clone(),
                attempts,
                response: resp,
            });
        }

        let text = match resp.text().await {
            Ok(text) => text,
            Err(err) => {
                let err = UpstreamCallError::new(
                    UpstreamErrorKind::Network,
                    format!("failed to read {status} response body: {err}"),
                );
                let failure = transport_failure(&candidate.url, method, err, attempts);
                return ProxyOutcome::Failed(failure);
            }
        };
        if upstream::is_method_not_allowed(status) {
            record_attempt(method, "method_not_allowed");
            tracing::info!(
                candidate = %candidate.url,
                method,
                "candidate answered 405, trying next"
            );
            last_failure = Some(RelayFailure {
                reason: FailureReason::AllCandidatesRejected,
                status,
                upstream_text: text,
                attempts,
            });
            continue;
        }

        record_attempt(method, "rejected");
        tracing::warn!(candidate = %candidate.url, method, %status, "upstream rejected request");
        return ProxyOutcome::Failed(RelayFailure {
            reason: FailureReason::UpstreamRejected,
            status,
            upstream_text: text,
            attempts,
        });
    }

    match last_failure {
        Some(failure) => {
            tracing::warn!(attempts, "all upstream candidates answered 405");
            ProxyOutcome::Failed(failure)
        }
        None => ProxyOutcome::Failed(RelayFailure {
            reason: FailureReason::Transport,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            upstream_text: "no upstream candidates configured".to_string(),
            attempts,
        }),
    }
}

fn transport_failure(
    candidate_url: &str,
    method: &'static str,
    err: UpstreamCallError,
    attempts: usize,
) -> RelayFailure {
    let outcome = match err.kind {
        UpstreamErrorKind::Timeout => "timeout",
        UpstreamErrorKind::Request | UpstreamErrorKind::Network => "transport_error",
    };
    record_attempt(method, outcome);
    tracing::warn!(
        candidate = %candidate_url,
        method,
        kind = ?err.kind,
        error = %err,
        "upstream transport failure"
    );
    RelayFailure {
        reason: FailureReason::Transport,
        status: StatusCode::INTERNAL_SERVER_ERROR,
        upstream_text: err.message,
        attempts,
    }
}

fn record_attempt(method: &'static str, outcome: &'static str) {
    metrics::counter!("relay_upstream_attempts_total", "method" => method, "outcome" => outcome)
        .increment(1);
}
