use anyhow::Result;
use base64::Engine;
use log::{error, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ImageServiceConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{NewSegment, SegmentPayload};
use crate::services::store::Store;
use crate::utils::is_video_key;

pub const TXT2IMG_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct Txt2ImgRequest<'a> {
    prompt: &'a str,
    steps: u32,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Generates one image per segment through a Stable Diffusion WebUI and
/// records the resulting filenames on the stored segments.
pub struct Illustrator {
    client: Client,
    base_url: String,
    steps: u32,
    images_dir: PathBuf,
    store: Arc<Store>,
}

impl Illustrator {
    pub fn new(config: &ImageServiceConfig, images_dir: PathBuf, store: Arc<Store>) -> Result<Self> {
        let client = Client::builder().timeout(TXT2IMG_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            steps: config.steps,
            images_dir,
            store,
        })
    }

    pub async fn illustrate(
        &self,
        video_id: &str,
        mut segments: Vec<SegmentPayload>,
    ) -> PipelineResult<Vec<SegmentPayload>> {
        if !is_video_key(video_id) {
            return Err(PipelineError::invalid_input("Invalid video ID"));
        }
        tokio::fs::create_dir_all(&self.images_dir).await?;
        self.purge_images(video_id).await;

        for segment in segments.iter_mut() {
            if !segment.is_complete() {
                continue;
            }
            let (Some(start), Some(keyword)) = (&segment.start, &segment.keyword) else {
                continue;
            };
            let filename = format!("{video_id}_{}.png", start.file_token());
            segment.image = self.render(keyword, &filename).await;
        }
        info!("Image generation complete for {video_id}");

        let rows: Vec<NewSegment> = segments
            .iter()
            .filter_map(|segment| {
                let start_sec = segment.start.as_ref()?.to_seconds()?;
                Some(NewSegment {
                    start_sec: i64::from(start_sec),
                    keyword: segment.keyword.clone()?,
                    text: segment.text.clone(),
                    image_path: segment.image.clone(),
                })
            })
            .collect();
        let incomplete = segments.iter().filter(|s| !s.is_complete()).count();
        if rows.len() < segments.len() {
            warn!(
                "{} of {} segments for {video_id} were not stored ({incomplete} incomplete)",
                segments.len() - rows.len(),
                segments.len()
            );
        }
        let owner = video_id.to_string();
        self.store
            .clone()
            .blocking(move |store| store.replace_segments(&owner, &rows))
            .await?;

        Ok(segments)
    }

    /// Remove earlier images of this video. Failures are logged, never fatal.
    pub async fn purge_images(&self, video_id: &str) {
        let prefix = format!("{video_id}_");
        let mut entries = match tokio::fs::read_dir(&self.images_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Error listing images for cleanup: {e}");
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Error listing images for cleanup: {e}");
                    break;
                }
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(&prefix) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => info!("Deleted old image {name}"),
                Err(e) => warn!("Failed to delete {name}: {e}"),
            }
        }
    }

    /// Request and save one image; `None` whenever any step fails.
    async fn render(&self, prompt: &str, filename: &str) -> Option<String> {
        let url = format!("{}/sdapi/v1/txt2img", self.base_url);
        let response = match self
            .client
            .post(&url)
            .json(&Txt2ImgRequest {
                prompt,
                steps: self.steps,
            })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("StableDiffusion request failed for {prompt}: {e}");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("StableDiffusion error for {prompt}: {status} {body}");
            return None;
        }

        let data: Txt2ImgResponse = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                error!("StableDiffusion returned unreadable body for {prompt}: {e}");
                return None;
            }
        };
        let encoded = data.images.into_iter().next()?;
        let bytes = match base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("StableDiffusion image for {prompt} is not base64: {e}");
                return None;
            }
        };

        match tokio::fs::write(self.images_dir.join(filename), bytes).await {
            Ok(()) => Some(filename.to_string()),
            Err(e) => {
                error!("Failed to write {filename}: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StartMarker;
    use std::path::Path;
    use serde_json::json;
    use tempfile::tempdir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload(start: &str, keyword: &str) -> SegmentPayload {
        SegmentPayload {
            start: Some(StartMarker::from(start)),
            keyword: Some(keyword.to_string()),
            ..Default::default()
        }
    }

    fn encoded(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    async fn mock_prompt(server: &MockServer, prompt: &str, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/sdapi/v1/txt2img"))
            .and(body_partial_json(json!({"prompt": prompt, "steps": 20})))
            .respond_with(response)
            .mount(server)
            .await;
    }

    fn illustrator(server: &MockServer, dir: &Path, store: Arc<Store>) -> Illustrator {
        Illustrator::new(
            &ImageServiceConfig {
                base_url: server.uri(),
                steps: 20,
            },
            dir.to_path_buf(),
            store,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn one_failed_image_does_not_abort_the_batch() {
        let server = MockServer::start().await;
        mock_prompt(
            &server,
            "intro",
            ResponseTemplate::new(200).set_body_json(json!({"images": [encoded(b"one")]})),
        )
        .await;
        mock_prompt(&server, "history", ResponseTemplate::new(500)).await;
        mock_prompt(
            &server,
            "outro",
            ResponseTemplate::new(200).set_body_json(json!({"images": [encoded(b"three")]})),
        )
        .await;

        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let segments = illustrator(&server, dir.path(), store.clone())
            .illustrate(
                "abc123",
                vec![
                    payload("00:04", "intro"),
                    payload("01:30", "history"),
                    payload("02:10", "outro"),
                ],
            )
            .await
            .unwrap();

        let images: Vec<_> = segments.iter().map(|s| s.image.clone()).collect();
        assert_eq!(
            images,
            vec![
                Some("abc123_0004.png".to_string()),
                None,
                Some("abc123_0210.png".to_string())
            ]
        );
        assert_eq!(
            std::fs::read(dir.path().join("abc123_0004.png")).unwrap(),
            b"one"
        );

        let stored = store.segments("abc123").unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[1].keyword, "history");
        assert_eq!(stored[1].image_path, None);
        assert_eq!(stored[2].image_path.as_deref(), Some("abc123_0210.png"));
        assert!(store.get_video("abc123").unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_image_list_yields_null_reference() {
        let server = MockServer::start().await;
        mock_prompt(
            &server,
            "intro",
            ResponseTemplate::new(200).set_body_json(json!({"images": []})),
        )
        .await;

        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let segments = illustrator(&server, dir.path(), store.clone())
            .illustrate("abc123", vec![payload("00:04", "intro")])
            .await
            .unwrap();

        assert_eq!(segments[0].image, None);
        assert_eq!(store.segments("abc123").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn incomplete_segments_pass_through() {
        let server = MockServer::start().await;
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let incomplete = SegmentPayload {
            keyword: Some("orphan".to_string()),
            ..Default::default()
        };

        let segments = illustrator(&server, dir.path(), store.clone())
            .illustrate("abc123", vec![incomplete.clone()])
            .await
            .unwrap();

        assert_eq!(segments, vec![incomplete]);
        assert!(store.segments("abc123").unwrap().is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn purge_only_touches_this_video() {
        let server = MockServer::start().await;
        let dir = tempdir().unwrap();
        for name in ["abc123_0004.png", "abc123_0100.png", "abc1234_0004.png", "other_0004.png"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let store = Arc::new(Store::open_in_memory().unwrap());

        illustrator(&server, dir.path(), store)
            .purge_images("abc123")
            .await;

        assert!(!dir.path().join("abc123_0004.png").exists());
        assert!(!dir.path().join("abc123_0100.png").exists());
        assert!(dir.path().join("abc1234_0004.png").exists());
        assert!(dir.path().join("other_0004.png").exists());
    }

    #[tokio::test]
    async fn path_like_video_id_is_rejected_before_any_write() {
        let server = MockServer::start().await;
        let root = tempdir().unwrap();
        let images = root.path().join("images");
        let store = Arc::new(Store::open_in_memory().unwrap());

        let err = illustrator(&server, &images, store.clone())
            .illustrate("../escaped", vec![payload("00:04", "intro")])
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert!(!root.path().join("escaped_0004.png").exists());
        assert!(server.received_requests().await.unwrap().is_empty());
        assert!(store.segments("../escaped").unwrap().is_empty());
    }

    #[tokio::test]
    async fn unconvertible_start_gets_no_image() {
        let server = MockServer::start().await;
        mock_prompt(
            &server,
            "later",
            ResponseTemplate::new(200).set_body_json(json!({"images": [encoded(b"png")]})),
        )
        .await;
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());

        let segments = illustrator(&server, dir.path(), store.clone())
            .illustrate("abc123", vec![payload("soon", "later")])
            .await
            .unwrap();

        assert_eq!(segments[0].image, None);
        assert!(!dir.path().join("abc123_soon.png").exists());
        assert!(server.received_requests().await.unwrap().is_empty());
        assert!(store.segments("abc123").unwrap().is_empty());
    }

    #[tokio::test]
    async fn bracketed_marker_names_file_without_brackets() {
        let server = MockServer::start().await;
        mock_prompt(
            &server,
            "intro",
            ResponseTemplate::new(200).set_body_json(json!({"images": [encoded(b"png")]})),
        )
        .await;
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());

        let segments = illustrator(&server, dir.path(), store.clone())
            .illustrate("abc123", vec![payload("[00:04]", "intro")])
            .await
            .unwrap();

        assert_eq!(segments[0].image.as_deref(), Some("abc123_0004.png"));
        assert!(dir.path().join("abc123_0004.png").exists());
        assert_eq!(store.segments("abc123").unwrap()[0].start_sec, 4);
    }

    #[tokio::test]
    async fn text_and_seconds_markers_are_stored() {
        let server = MockServer::start().await;
        mock_prompt(&server, "intro", ResponseTemplate::new(503)).await;
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let segment = SegmentPayload {
            start: Some(StartMarker::Seconds(75)),
            keyword: Some("intro".to_string()),
            text: Some("opening remarks".to_string()),
            image: None,
        };

        illustrator(&server, dir.path(), store.clone())
            .illustrate("abc123", vec![segment])
            .await
            .unwrap();

        let stored = store.segments("abc123").unwrap();
        assert_eq!(stored[0].start_sec, 75);
        assert_eq!(stored[0].text.as_deref(), Some("opening remarks"));
    }
}
