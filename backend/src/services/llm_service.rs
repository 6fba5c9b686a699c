use anyhow::Result;
use log::{error, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::OllamaConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{NewSegment, SegmentPayload, StartMarker, TopicSegment};
use crate::services::illustration_queue::IllustrationQueue;
use crate::services::store::Store;
use crate::utils::{extract_json_array, is_video_key};

pub const SEGMENT_TIMEOUT: Duration = Duration::from_secs(60);
pub const EXTRACT_TIMEOUT: Duration = Duration::from_secs(30);

const TOPIC_PROMPT: &str = "You are given a podcast transcript with timestamps.\n\
Segment the transcript into up to 10 meaningful topics.\n\
For each topic:\n\
- Provide the timestamp (in [MM:SS] format) where the topic begins\n\
- Generate ONE keyword (not multiple) that best represents that entire topic.\n\
Return a JSON list in this format:\n\
[\n  { \"start\": \"00:04\", \"keyword\": \"introduction\" },\n  ...\n]\n\
Transcript:\n";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for a local Ollama server's non-streaming generate endpoint.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate(&self, prompt: &str, timeout: Duration) -> PipelineResult<String> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: GenerateOptions { temperature: 0.2 },
            })
            .send()
            .await?;

        let status = response.status();
        info!("Ollama POST {url} status: {status}");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Ollama error: {status} {body}");
            return Err(PipelineError::GenerationService {
                status: status.as_u16(),
                body,
            });
        }

        let data: GenerateResponse = response.json().await?;
        Ok(data.response)
    }
}

pub fn build_topic_prompt(transcript: &str) -> String {
    format!("{TOPIC_PROMPT}{transcript}")
}

/// Turn raw model output into validated topic segments. Nothing is returned
/// unless every element carries a usable start marker and a keyword.
pub fn parse_topic_segments(raw: &str) -> PipelineResult<Vec<TopicSegment>> {
    let value = extract_json_array(raw).map_err(|e| PipelineError::malformed(e.to_string(), raw))?;
    let Value::Array(items) = value else {
        return Err(PipelineError::malformed("Not a list", raw));
    };

    items
        .into_iter()
        .map(|item| {
            let (Some(start), Some(keyword)) = (item.get("start"), item.get("keyword")) else {
                return Err(PipelineError::malformed("Missing fields in a segment", raw));
            };
            let start: StartMarker = serde_json::from_value(start.clone())
                .map_err(|_| PipelineError::malformed(format!("Bad start marker {start}"), raw))?;
            if start.to_seconds().is_none() {
                return Err(PipelineError::malformed(
                    format!("Start marker {start:?} is not MM:SS"),
                    raw,
                ));
            }
            let Some(keyword) = keyword.as_str() else {
                return Err(PipelineError::malformed("Keyword is not a string", raw));
            };

            Ok(TopicSegment {
                start,
                keyword: keyword.to_string(),
            })
        })
        .collect()
}

/// Ask the model for topic segments, persist them (replacing earlier ones)
/// and queue illustration of the new set.
pub async fn segment_topics(
    store: &Arc<Store>,
    llm: &OllamaClient,
    queue: &IllustrationQueue,
    video_id: &str,
    transcript: &str,
) -> PipelineResult<Vec<TopicSegment>> {
    if !is_video_key(video_id) {
        return Err(PipelineError::invalid_input("Invalid video ID"));
    }
    info!("Segmenting transcript for {video_id} with model {}", llm.model());

    let raw = llm
        .generate(&build_topic_prompt(transcript), SEGMENT_TIMEOUT)
        .await?;
    info!("Ollama response: {}...", raw.chars().take(200).collect::<String>());

    let segments = match parse_topic_segments(&raw) {
        Ok(segments) => segments,
        Err(e) => {
            if let PipelineError::MalformedGenerationOutput { reason, .. } = &e {
                error!("JSON parse error: {reason}");
            }
            return Err(e);
        }
    };

    let rows: Vec<NewSegment> = segments
        .iter()
        .filter_map(|segment| {
            segment.start.to_seconds().map(|start_sec| NewSegment {
                start_sec: i64::from(start_sec),
                keyword: segment.keyword.clone(),
                text: None,
                image_path: None,
            })
        })
        .collect();
    let stored = rows.len();
    let owner = video_id.to_string();
    store
        .clone()
        .blocking(move |store| store.replace_segments(&owner, &rows))
        .await?;
    info!("Stored {stored} segments for {video_id}");

    let payload: Vec<SegmentPayload> = segments.iter().cloned().map(SegmentPayload::from).collect();
    let job_id = queue.enqueue(video_id, payload);
    info!("Queued illustration job {job_id}");

    Ok(segments)
}

pub async fn extract_keywords(llm: &OllamaClient, text: &str) -> PipelineResult<String> {
    info!(
        "Keyword extraction called. Text: {}... Model: {}",
        text.chars().take(100).collect::<String>(),
        llm.model()
    );
    let prompt = format!("Extract keywords and entities from this text: {text}");
    llm.generate(&prompt, EXTRACT_TIMEOUT).await
}
