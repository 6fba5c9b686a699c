use crate::error::{PipelineError, PipelineResult};
use crate::models::{TranscriptEntry, TranscriptRequest};
use crate::services::transcript_service;
use crate::AppState;
use log::{error, info};
use rocket::serde::json::Json;
use rocket::{get, post, State};

#[post("/transcript/<_..>", data = "<request>")]
pub async fn fetch_transcript_post(
    state: &State<AppState>,
    request: Json<TranscriptRequest>,
) -> PipelineResult<Json<Vec<TranscriptEntry>>> {
    info!("/api/transcript/ POST called. URL: {}", request.url);
    match transcript_service::refresh_transcript(
        &state.store,
        state.transcripts.as_ref(),
        &request.url,
    )
    .await
    {
        Ok(lines) => Ok(Json(lines)),
        Err(e) => {
            error!("Transcript fetch failed for {}: {e}", request.url);
            Err(e)
        }
    }
}

#[get("/transcript/<_..>?<video_id>")]
pub async fn fetch_transcript_get(
    state: &State<AppState>,
    video_id: Option<String>,
) -> PipelineResult<Json<Vec<TranscriptEntry>>> {
    info!("/api/transcript/ GET called. video_id: {video_id:?}");
    let Some(video_id) = video_id.filter(|id| !id.trim().is_empty()) else {
        return Err(PipelineError::invalid_input("Missing video_id"));
    };

    match transcript_service::resolve_transcript(
        &state.store,
        state.transcripts.as_ref(),
        &video_id,
    )
    .await
    {
        Ok(lines) => Ok(Json(lines)),
        Err(e) => {
            error!("Transcript lookup failed for {video_id}: {e}");
            Err(e)
        }
    }
}
