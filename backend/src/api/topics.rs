use crate::error::PipelineResult;
use crate::models::{
    GenerateSegmentsImagesRequest, SegmentsImagesResponse, TopicKeywordsRequest,
    TopicKeywordsResponse,
};
use crate::services::llm_service;
use crate::AppState;
use log::{error, info};
use rocket::serde::json::Json;
use rocket::{post, State};

#[post("/topic-keywords", data = "<request>")]
pub async fn topic_keywords(
    state: &State<AppState>,
    request: Json<TopicKeywordsRequest>,
) -> PipelineResult<Json<TopicKeywordsResponse>> {
    let request = request.into_inner();
    match llm_service::segment_topics(
        &state.store,
        &state.llm,
        &state.illustration_queue,
        &request.video_id,
        &request.transcript,
    )
    .await
    {
        Ok(segments) => Ok(Json(TopicKeywordsResponse { segments })),
        Err(e) => {
            error!("Topic segmentation failed for {}: {e}", request.video_id);
            Err(e)
        }
    }
}

/// Synchronous illustration of a caller-supplied segment list.
#[post("/generate-segments-images", data = "<request>")]
pub async fn generate_segments_images(
    state: &State<AppState>,
    request: Json<GenerateSegmentsImagesRequest>,
) -> PipelineResult<Json<SegmentsImagesResponse>> {
    let request = request.into_inner();
    info!(
        "Generating images for {} segments of {}",
        request.segments.len(),
        request.video_id
    );
    match state
        .illustrator
        .illustrate(&request.video_id, request.segments)
        .await
    {
        Ok(segments) => Ok(Json(SegmentsImagesResponse { segments })),
        Err(e) => {
            error!("Image generation failed for {}: {e}", request.video_id);
            Err(e)
        }
    }
}
