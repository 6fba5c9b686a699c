use rocket::serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::{mmss_to_seconds, seconds_to_mmss, strip_brackets};

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptRequest {
    pub url: String,
}

/// One timed transcript line as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

/// Segment start offset as it appears on the wire: usually "MM:SS", but
/// callers replaying stored data may send plain seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartMarker {
    Seconds(u32),
    Clock(String),
}

impl StartMarker {
    pub fn to_seconds(&self) -> Option<u32> {
        match self {
            StartMarker::Seconds(secs) => Some(*secs),
            StartMarker::Clock(clock) => mmss_to_seconds(clock),
        }
    }

    /// Token used in generated image filenames ("00:04" -> "0004").
    pub fn file_token(&self) -> String {
        match self {
            StartMarker::Seconds(secs) => seconds_to_mmss(*secs).replace(':', ""),
            StartMarker::Clock(clock) => strip_brackets(clock).replace(':', ""),
        }
    }
}

impl From<&str> for StartMarker {
    fn from(clock: &str) -> Self {
        StartMarker::Clock(clock.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSegment {
    pub start: StartMarker,
    pub keyword: String,
}

#[derive(Debug, Deserialize)]
pub struct TopicKeywordsRequest {
    #[serde(rename = "videoId")]
    pub video_id: String,
    pub transcript: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicKeywordsResponse {
    pub segments: Vec<TopicSegment>,
}

/// A segment travelling through illustration. Fields are optional because the
/// batch is accepted as sent and incomplete entries are passed through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<StartMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl SegmentPayload {
    /// A keyword plus a start marker that converts to seconds.
    pub fn is_complete(&self) -> bool {
        self.keyword.is_some()
            && self
                .start
                .as_ref()
                .and_then(StartMarker::to_seconds)
                .is_some()
    }
}

impl From<TopicSegment> for SegmentPayload {
    fn from(segment: TopicSegment) -> Self {
        SegmentPayload {
            start: Some(segment.start),
            keyword: Some(segment.keyword),
            text: None,
            image: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateSegmentsImagesRequest {
    #[serde(rename = "videoId")]
    pub video_id: String,
    pub segments: Vec<SegmentPayload>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentsImagesResponse {
    pub segments: Vec<SegmentPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentView {
    pub start: String,
    pub keyword: String,
    pub text: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LlmRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LlmResponse {
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    pub video_id: String,
    pub start_sec: i64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSegment {
    pub start_sec: i64,
    pub keyword: String,
    pub text: Option<String>,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    pub id: i64,
    pub video_id: String,
    pub start_sec: i64,
    pub keyword: String,
    pub text: Option<String>,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub video_id: String,
    pub status: JobStatus,
    pub segment_count: usize,
    pub added_at: String,
    pub processed_at: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct IllustrationQueueResponse {
    pub success: bool,
    pub message: String,
    pub items: Vec<QueueItem>,
}

/// Session identity as returned by the identity provider's userinfo endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser(pub Value);

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_response: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
            status: None,
            llm_response: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_marker_accepts_clock_and_seconds() {
        let clock: StartMarker = serde_json::from_str("\"02:10\"").unwrap();
        let secs: StartMarker = serde_json::from_str("130").unwrap();

        assert_eq!(clock.to_seconds(), Some(130));
        assert_eq!(secs.to_seconds(), Some(130));
        assert_eq!(clock.file_token(), "0210");
        assert_eq!(secs.file_token(), "0210");
    }

    #[test]
    fn bracketed_clock_gives_plain_file_token() {
        let marker = StartMarker::from("[00:04]");
        assert_eq!(marker.to_seconds(), Some(4));
        assert_eq!(marker.file_token(), "0004");
    }

    #[test]
    fn segment_payload_keeps_unknown_image_as_null() {
        let payload: SegmentPayload =
            serde_json::from_str(r#"{"start":"00:04","keyword":"intro"}"#).unwrap();
        assert!(payload.is_complete());

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["image"], Value::Null);
        assert!(json.get("text").is_none());
    }

    #[test]
    fn incomplete_payload_is_detected() {
        let payload: SegmentPayload = serde_json::from_str(r#"{"keyword":"intro"}"#).unwrap();
        assert!(!payload.is_complete());

        let payload: SegmentPayload =
            serde_json::from_str(r#"{"start":"soon","keyword":"intro"}"#).unwrap();
        assert!(!payload.is_complete());
    }
}
