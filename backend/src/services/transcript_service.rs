use log::{info, warn};
use std::sync::Arc;
use yt_transcript_rs::api::YouTubeTranscriptApi;
use yt_transcript_rs::errors::{CouldNotRetrieveTranscript, CouldNotRetrieveTranscriptReason};

use crate::error::{PipelineError, PipelineResult};
use crate::models::TranscriptEntry;
use crate::services::store::Store;
use crate::utils::{extract_youtube_video_id, is_video_key};

/// Source of timed transcripts for a video id.
#[rocket::async_trait]
pub trait TranscriptProvider: Send + Sync {
    async fn fetch(&self, video_id: &str) -> PipelineResult<Vec<TranscriptEntry>>;
}

pub struct YouTubeTranscriptProvider {
    languages: Vec<String>,
}

impl YouTubeTranscriptProvider {
    pub fn new(languages: Vec<String>) -> Self {
        Self { languages }
    }
}

#[rocket::async_trait]
impl TranscriptProvider for YouTubeTranscriptProvider {
    async fn fetch(&self, video_id: &str) -> PipelineResult<Vec<TranscriptEntry>> {
        let api = YouTubeTranscriptApi::new(None, None, None).map_err(|e| {
            PipelineError::internal(format!("Failed to create YouTubeTranscriptApi: {e}"))
        })?;
        let languages: Vec<&str> = self.languages.iter().map(String::as_str).collect();

        match api.fetch_transcript(video_id, &languages, false).await {
            Ok(transcript) => Ok(transcript
                .snippets
                .into_iter()
                .map(|snippet| TranscriptEntry {
                    text: snippet.text,
                    start: snippet.start,
                    duration: snippet.duration,
                })
                .collect()),
            Err(e) => Err(classify_provider_error(video_id, e)),
        }
    }
}

fn classify_provider_error(video_id: &str, err: CouldNotRetrieveTranscript) -> PipelineError {
    match err.reason {
        Some(CouldNotRetrieveTranscriptReason::TranscriptsDisabled)
        | Some(CouldNotRetrieveTranscriptReason::NoTranscriptFound { .. })
        | Some(CouldNotRetrieveTranscriptReason::VideoUnavailable) => {
            PipelineError::TranscriptUnavailable {
                video_id: video_id.to_string(),
            }
        }
        _ => PipelineError::internal(err.to_string()),
    }
}

pub fn parse_video_input(input: &str) -> PipelineResult<String> {
    extract_youtube_video_id(input)
        .ok_or_else(|| PipelineError::invalid_input("Could not extract video ID from URL"))
}

/// Cache lookups also accept ids of other lengths, since stored rows are
/// keyed by whatever id produced them.
fn parse_cache_key(input: &str) -> PipelineResult<String> {
    if let Some(video_id) = extract_youtube_video_id(input) {
        return Ok(video_id);
    }
    let input = input.trim();
    if is_video_key(input) {
        return Ok(input.to_string());
    }
    Err(PipelineError::invalid_input(
        "Could not extract video ID from URL",
    ))
}

/// Fetch from the provider and replace whatever the store held for the video.
pub async fn fetch_and_store(
    store: &Arc<Store>,
    provider: &dyn TranscriptProvider,
    video_id: &str,
) -> PipelineResult<Vec<TranscriptEntry>> {
    let entries = provider.fetch(video_id).await?;
    info!("Fetched {} transcript lines for video {video_id}", entries.len());

    let lines: Vec<(i64, String)> = entries
        .iter()
        .map(|entry| (entry.start.max(0.0).floor() as i64, entry.text.clone()))
        .collect();
    let owner = video_id.to_string();
    store
        .clone()
        .blocking(move |store| store.replace_transcript(&owner, &lines))
        .await?;

    Ok(entries)
}

/// POST path: always goes to the provider.
pub async fn refresh_transcript(
    store: &Arc<Store>,
    provider: &dyn TranscriptProvider,
    input: &str,
) -> PipelineResult<Vec<TranscriptEntry>> {
    let video_id = parse_video_input(input)?;
    info!("Extracted video_id: {video_id}");
    fetch_and_store(store, provider, &video_id).await
}

/// GET path: stored lines win; duration is not persisted and reads back as 0.
pub async fn resolve_transcript(
    store: &Arc<Store>,
    provider: &dyn TranscriptProvider,
    input: &str,
) -> PipelineResult<Vec<TranscriptEntry>> {
    let video_id = parse_cache_key(input)?;

    let cached = store.transcript_lines(&video_id)?;
    if !cached.is_empty() {
        info!("Returning {} transcript lines for {video_id} from DB", cached.len());
        return Ok(cached
            .into_iter()
            .map(|line| TranscriptEntry {
                text: line.text,
                start: line.start_sec as f64,
                duration: 0.0,
            })
            .collect());
    }

    if extract_youtube_video_id(&video_id).is_none() {
        warn!("Fetching transcript for non-standard video id {video_id}");
    }
    fetch_and_store(store, provider, &video_id).await
}
