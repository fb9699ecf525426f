use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CandidateMethod {
    Post,
    Get,
}

impl CandidateMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            CandidateMethod::Post => "POST",
            CandidateMethod::Get => "GET",
        }
    }
}

impl Default for CandidateMethod {
    fn default() -> Self {
        CandidateMethod::Post
    }
}

/// One (url, method) hypothesis for reaching the upstream chat endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UpstreamCandidate {
    pub url: String,
    #[serde(default)]
    pub method: CandidateMethod,
}

impl UpstreamCandidate {
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: CandidateMethod::Post,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: CandidateMethod::Get,
        }
    }
}

/// Ordered candidate list. Every POST candidate is tried before any GET
/// candidate; relative order inside each group is the operator's ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateList {
    candidates: Vec<UpstreamCandidate>,
}

impl CandidateList {
    pub fn new(candidates: Vec<UpstreamCandidate>) -> Result<Self, String> {
        if candidates.is_empty() {
            return Err("candidate list is empty".to_string());
        }
        if let Some(bad) = candidates.iter().find(|c| c.url.trim().is_empty()) {
            return Err(format!("candidate with blank url ({})", bad.method.as_str()));
        }
        let (mut ordered, gets): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| c.method == CandidateMethod::Post);
        ordered.extend(gets);
        Ok(Self {
            candidates: ordered,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, String> {
        let candidates: Vec<UpstreamCandidate> =
            serde_json::from_str(raw).map_err(|err| err.to_string())?;
        Self::new(candidates)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UpstreamCandidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl Default for CandidateList {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
        }
    }
}

// Which of these the upstream accepts changes between deployments; override
// with RELAY_UPSTREAM_CANDIDATES.
fn default_candidates() -> Vec<UpstreamCandidate> {
    vec![
        UpstreamCandidate::post("https://uiuc.chat/api/chat-api/chat"),
        UpstreamCandidate::post("https://uiuc.chat/api/chat-api/chat/"),
        UpstreamCandidate::post("https://chat.illinois.edu/api/chat-api/chat"),
        UpstreamCandidate::post("https://uiuc.chat/api/chat"),
        UpstreamCandidate::get("https://uiuc.chat/api/chat-api/chat"),
    ]
}
