use crate::chat::ChatMessage;
use crate::corpus::Video;

/// Characters of a single transcript sent upstream.
pub const TRANSCRIPT_CHAR_BUDGET: usize = 15_000;
/// Stand-in summary length for videos without an AI summary.
pub const FALLBACK_SUMMARY_CHARS: usize = 500;
/// Summaries included in a cross-video prompt.
pub const MAX_COLLECTION_SUMMARIES: usize = 10;

const WORKSHOP: &str = "NBER Economics of Transformative AI Workshop";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("no transcript available for \"{title}\"")]
    NoTranscript { title: String },
    #[error("no transcripts available")]
    NoTranscripts,
}

/// What a conversation is about.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    Transcript(&'a Video),
    Collection(&'a [Video]),
}

impl Subject<'_> {
    /// Conversations are reset when this changes.
    pub fn key(&self) -> String {
        match self {
            Subject::Transcript(video) => format!("video:{}", video.id),
            Subject::Collection(_) => "all".to_string(),
        }
    }

    pub fn system_message(&self) -> Result<ChatMessage, ContextError> {
        let prompt = match self {
            Subject::Transcript(video) => transcript_prompt(video)?,
            Subject::Collection(videos) => collection_prompt(videos)?,
        };
        Ok(ChatMessage::system(prompt))
    }
}

/// First `max_chars` characters of `text`. Never splits a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn transcript_prompt(video: &Video) -> Result<String, ContextError> {
    let transcript = video.transcript().ok_or_else(|| ContextError::NoTranscript {
        title: video.title.clone(),
    })?;
    let excerpt = truncate_chars(transcript, TRANSCRIPT_CHAR_BUDGET);
    Ok(format!(
        "You are an AI assistant helping users understand a presentation from the {WORKSHOP}.\n\n\
         Video Title: {title}\n\
         Presenters: {presenters}\n\n\
         Full Transcript:\n\
         {excerpt}\n\n\
         Answer the user's question based on this transcript. Be concise and cite specific points from the presentation when relevant.",
        title = video.title,
        presenters = video.presenter_names(),
    ))
}

fn collection_prompt(videos: &[Video]) -> Result<String, ContextError> {
    let available: Vec<(&Video, &str)> = videos
        .iter()
        .filter_map(|v| v.transcript().map(|t| (v, t)))
        .collect();
    if available.is_empty() {
        return Err(ContextError::NoTranscripts);
    }
    let summaries: Vec<String> = available
        .iter()
        .take(MAX_COLLECTION_SUMMARIES)
        .map(|(video, transcript)| {
            let summary = video
                .summary()
                .unwrap_or_else(|| truncate_chars(transcript, FALLBACK_SUMMARY_CHARS));
            format!("**{}** by {}\n{}", video.title, video.presenter_names(), summary)
        })
        .collect();
    Ok(format!(
        "You are an AI assistant helping users understand presentations from the {WORKSHOP}.\n\n\
         You have access to information from {count} presentations:\n\n\
         {summaries}\n\n\
         Answer the user's question by synthesizing information across these presentations. \
         When referencing specific presentations, mention the title and presenter. \
         If the question relates to a specific topic, identify which presentations are most relevant.",
        count = available.len(),
        summaries = summaries.join("\n"),
    ))
}
