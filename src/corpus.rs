use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("failed to read corpus file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse corpus file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presenter {
    pub name: String,
    #[serde(default)]
    pub affiliation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scholar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default)]
    pub has_transcript: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub presenters: Vec<Presenter>,
}

impl Video {
    pub fn transcript(&self) -> Option<&str> {
        self.transcript.as_deref().filter(|t| !t.trim().is_empty())
    }

    pub fn summary(&self) -> Option<&str> {
        self.ai_summary.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn presenter_names(&self) -> String {
        self.presenters
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn matches(&self, needle: &str) -> bool {
        if self.title.to_lowercase().contains(needle) {
            return true;
        }
        if self.presenters.iter().any(|p| {
            p.name.to_lowercase().contains(needle) || p.affiliation.to_lowercase().contains(needle)
        }) {
            return true;
        }
        self.transcript()
            .map(|t| t.to_lowercase().contains(needle))
            .unwrap_or(false)
    }
}

/// Listing view without the transcript body.
#[derive(Debug, Clone, Serialize)]
pub struct VideoListing<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub url: &'a str,
    pub has_transcript: bool,
    pub ai_summary: Option<&'a str>,
    pub presenters: &'a [Presenter],
}

impl<'a> From<&'a Video> for VideoListing<'a> {
    fn from(video: &'a Video) -> Self {
        Self {
            id: &video.id,
            title: &video.title,
            url: &video.url,
            has_transcript: video.transcript().is_some(),
            ai_summary: video.summary(),
            presenters: &video.presenters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRef {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenterEntry {
    pub name: String,
    pub affiliation: String,
    pub scholar_url: Option<String>,
    pub videos: Vec<VideoRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub videos: usize,
    pub transcripts: usize,
    pub presenters: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    videos: Vec<Video>,
}

impl Corpus {
    pub fn new(videos: Vec<Video>) -> Self {
        Self { videos }
    }

    pub async fn load(path: &Path) -> Result<Self, CorpusError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CorpusError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let videos: Vec<Video> =
            serde_json::from_str(&raw).map_err(|source| CorpusError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(videos))
    }

    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    /// Case-insensitive match on title, then presenters, then transcript.
    /// A blank query returns everything.
    pub fn search(&self, query: &str) -> Vec<&Video> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.videos.iter().collect();
        }
        self.videos.iter().filter(|v| v.matches(&needle)).collect()
    }

    /// Unique presenters keyed by name, sorted by name. The first record seen
    /// for a name supplies its affiliation. A non-blank `query` keeps only
    /// entries whose name or affiliation contains it, ignoring case.
    pub fn presenters(&self, query: &str) -> Vec<PresenterEntry> {
        let mut by_name: BTreeMap<&str, PresenterEntry> = BTreeMap::new();
        for video in &self.videos {
            for presenter in &video.presenters {
                let entry = by_name
                    .entry(presenter.name.as_str())
                    .or_insert_with(|| PresenterEntry {
                        name: presenter.name.clone(),
                        affiliation: presenter.affiliation.clone(),
                        scholar_url: presenter.scholar_url.clone(),
                        videos: Vec::new(),
                    });
                entry.videos.push(VideoRef {
                    id: video.id.clone(),
                    title: video.title.clone(),
                    url: video.url.clone(),
                });
            }
        }
        let needle = query.trim().to_lowercase();
        by_name
            .into_values()
            .filter(|p| {
                needle.is_empty()
                    || p.name.to_lowercase().contains(&needle)
                    || p.affiliation.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn stats(&self) -> CorpusStats {
        CorpusStats {
            videos: self.videos.len(),
            transcripts: self
                .videos
                .iter()
                .filter(|v| v.transcript().is_some())
                .count(),
            presenters: self.videos.iter().map(|v| v.presenters.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn corpus() -> Corpus {
        let videos: Vec<Video> = serde_json::from_value(json!([
            {
                "id": "v1",
                "title": "Labor Markets and AGI",
                "url": "https://youtu.be/v1",
                "transcript": "We model wages under automation.",
                "has_transcript": true,
                "ai_summary": "Wages fall, then rise.",
                "presenters": [{ "name": "Zoe Park", "affiliation": "MIT" }]
            },
            {
                "id": "v2",
                "title": "Compute Scaling",
                "url": "https://youtu.be/v2",
                "has_transcript": false,
                "presenters": [
                    { "name": "Anil Rao", "affiliation": "Stanford", "scholar_url": "https://scholar/a" },
                    { "name": "Zoe Park", "affiliation": "MIT" }
                ]
            },
            {
                "id": "v3",
                "title": "Growth Theory",
                "url": "https://youtu.be/v3",
                "transcript": "Automation of ideas drives growth.",
                "has_transcript": true,
                "presenters": []
            }
        ]))
        .unwrap();
        Corpus::new(videos)
    }

    #[test]
    fn blank_query_returns_all_in_order() {
        let corpus = corpus();
        let ids: Vec<&str> = corpus.search("  ").iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2", "v3"]);
    }

    #[test]
    fn search_covers_title_presenter_and_transcript() {
        let corpus = corpus();
        let ids = |q: &str| -> Vec<String> {
            corpus.search(q).iter().map(|v| v.id.clone()).collect()
        };
        assert_eq!(ids("SCALING"), vec!["v2"]);
        assert_eq!(ids("stanford"), vec!["v2"]);
        assert_eq!(ids("zoe"), vec!["v1", "v2"]);
        assert_eq!(ids("automation"), vec!["v1", "v3"]);
        assert!(ids("blockchain").is_empty());
    }

    #[test]
    fn presenters_are_unique_and_sorted() {
        let directory = corpus().presenters("");
        let names: Vec<&str> = directory.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Anil Rao", "Zoe Park"]);
        assert_eq!(directory[0].scholar_url.as_deref(), Some("https://scholar/a"));
        let zoe_videos: Vec<&str> = directory[1].videos.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(zoe_videos, vec!["v1", "v2"]);
    }

    #[test]
    fn presenter_filter_matches_name_or_affiliation() {
        let corpus = corpus();
        let names = |q: &str| -> Vec<String> {
            corpus.presenters(q).into_iter().map(|p| p.name).collect()
        };
        assert_eq!(names("STANford"), vec!["Anil Rao"]);
        assert_eq!(names("zoe"), vec!["Zoe Park"]);
        assert_eq!(names("  "), vec!["Anil Rao", "Zoe Park"]);
        assert!(names("automation").is_empty());
    }

    #[test]
    fn stats_count_only_real_transcripts() {
        let stats = corpus().stats();
        assert_eq!(
            stats,
            CorpusStats {
                videos: 3,
                transcripts: 2,
                presenters: 3
            }
        );
    }

    #[tokio::test]
    async fn load_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("videos.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Corpus::load(&path).await.unwrap_err();
        assert!(matches!(err, CorpusError::Parse { .. }));
        assert!(err.to_string().contains("videos.json"));
    }
}
