use crate::error::PipelineResult;
use crate::models::SegmentView;
use crate::services::segment_service;
use crate::AppState;
use log::info;
use rocket::serde::json::Json;
use rocket::{get, State};

#[get("/segments/<video_id>")]
pub async fn get_segments(
    state: &State<AppState>,
    video_id: &str,
) -> PipelineResult<Json<Vec<SegmentView>>> {
    let segments = segment_service::get_segments(&state.store, video_id)?;
    info!("Returning {} segments for {video_id}", segments.len());
    Ok(Json(segments))
}
