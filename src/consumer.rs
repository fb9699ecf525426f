//! Client side of a chat turn: builds the request, sends it to the proxy and
//! exposes the reply as a stream of decoded text fragments.

use crate::chat::{ChatMessage, ChatRequest, DEFAULT_TEMPERATURE};
use crate::context::{ContextError, Subject};
use crate::conversation::Conversation;
use crate::decode::Utf8ChunkDecoder;
use axum::http::StatusCode;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Reply text fragments in arrival order.
pub type FragmentStream = BoxStream<'static, String>;

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("no API key configured")]
    MissingApiKey,
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("the assistant could not respond because the proxy returned status {status}: {body}")]
    Upstream { status: StatusCode, body: String },
    #[error("the assistant could not respond because the request failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub proxy_url: String,
    pub api_key: Option<String>,
    pub course_name: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub retrieval_only: bool,
}

impl ChatSettings {
    pub fn new(proxy_url: impl Into<String>) -> Self {
        Self {
            proxy_url: proxy_url.into(),
            api_key: None,
            course_name: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            retrieval_only: false,
        }
    }

    pub fn from_env() -> Self {
        let proxy_url = env_non_blank("RELAY_CLIENT_PROXY_URL")
            .unwrap_or_else(|| "http://127.0.0.1:8080/api/chat".to_string());
        let mut settings = Self::new(proxy_url);
        settings.api_key = env_non_blank("RELAY_API_KEY");
        settings.course_name = env_non_blank("RELAY_COURSE_NAME");
        if let Some(model) = env_non_blank("RELAY_MODEL") {
            settings.model = model;
        }
        settings
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_course_name(mut self, course_name: impl Into<String>) -> Self {
        self.course_name = Some(course_name.into());
        self
    }
}

fn env_non_blank(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    settings: ChatSettings,
}

impl ChatClient {
    pub fn new(settings: ChatSettings) -> Result<Self, ConsumerError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("transcript-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ConsumerError::Transport(err.to_string()))?;
        Ok(Self::with_client(http, settings))
    }

    pub fn with_client(http: reqwest::Client, settings: ChatSettings) -> Self {
        Self { http, settings }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Assembles the request for one turn: system context, prior history,
    /// then the new user message. Fails without touching the network when no
    /// API key is configured.
    pub fn build_request(
        &self,
        subject: &Subject<'_>,
        history: &[ChatMessage],
        user_message: &str,
    ) -> Result<ChatRequest, ConsumerError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConsumerError::MissingApiKey)?;
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(subject.system_message()?);
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(user_message));

        let mut req = ChatRequest::new(self.settings.model.clone(), messages);
        req.api_key = Some(api_key.to_string());
        req.course_name = self.settings.course_name.clone();
        req.temperature = self.settings.temperature;
        req.retrieval_only = self.settings.retrieval_only;
        Ok(req)
    }

    /// Sends one request to the proxy. A request without an API key is refused
    /// before any network use. A non-2xx answer becomes
    /// `ConsumerError::Upstream` carrying the status and body text.
    pub async fn send(&self, req: &ChatRequest) -> Result<FragmentStream, ConsumerError> {
        if req.api_key().is_none() {
            return Err(ConsumerError::MissingApiKey);
        }
        let resp = self
            .http
            .post(&self.settings.proxy_url)
            .json(req)
            .send()
            .await
            .map_err(|err| ConsumerError::Transport(err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.map_err(|err| {
                ConsumerError::Transport(format!("failed to read {status} response body: {err}"))
            })?;
            return Err(ConsumerError::Upstream { status, body });
        }
        Ok(fragments(resp).boxed())
    }

    pub async fn stream_reply(
        &self,
        subject: &Subject<'_>,
        history: &[ChatMessage],
        user_message: &str,
    ) -> Result<FragmentStream, ConsumerError> {
        let req = self.build_request(subject, history, user_message)?;
        self.send(&req).await
    }

    /// Runs one turn against `conversation`, calling `on_fragment` as text
    /// arrives. On failure the reply slot holds the error text and the
    /// conversation is ready for another message.
    pub async fn run_turn<F>(
        &self,
        conversation: &mut Conversation,
        subject: &Subject<'_>,
        user_message: &str,
        mut on_fragment: F,
    ) -> Result<String, ConsumerError>
    where
        F: FnMut(&str),
    {
        conversation.switch_subject(&subject.key());
        let history = conversation.history_for_request();
        conversation.begin_turn(user_message);

        let mut stream = match self.stream_reply(subject, &history, user_message).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = %err, "chat turn failed");
                conversation.fail_turn(&err);
                return Err(err);
            }
        };
        while let Some(fragment) = stream.next().await {
            conversation.append_fragment(&fragment);
            on_fragment(&fragment);
        }
        Ok(conversation.finish_turn())
    }
}

/// Decoded text of `resp` in arrival order, one read in flight at a time.
/// The stream ends when the body ends; a read error mid-body also ends it.
pub fn fragments(resp: reqwest::Response) -> impl Stream<Item = String> + Send + 'static {
    stream::unfold(
        Some((resp, Utf8ChunkDecoder::new())),
        |state| async move {
            let (mut resp, mut decoder) = state?;
            loop {
                match resp.chunk().await {
                    Ok(Some(bytes)) => {
                        let text = decoder.push(&bytes);
                        if !text.is_empty() {
                            return Some((text, Some((resp, decoder))));
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!(error = %err, "response body read failed, ending stream");
                        break;
                    }
                }
            }
            let tail = decoder.finish();
            if tail.is_empty() {
                None
            } else {
                Some((tail, None))
            }
        },
    )
}
