use crate::error::{PipelineError, PipelineResult};
use crate::models::{IllustrationQueueResponse, QueueItem};
use crate::AppState;
use log::info;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{delete, get, State};

#[get("/illustrations")]
pub async fn list_illustration_jobs(state: &State<AppState>) -> Json<IllustrationQueueResponse> {
    let items = state.illustration_queue.get_all_items();

    Json(IllustrationQueueResponse {
        success: true,
        message: format!("Retrieved {} queue items", items.len()),
        items,
    })
}

#[get("/illustrations/<id>")]
pub async fn get_illustration_job(
    state: &State<AppState>,
    id: &str,
) -> PipelineResult<Json<QueueItem>> {
    state
        .illustration_queue
        .get(id)
        .map(Json)
        .ok_or_else(|| PipelineError::not_found("Queue item not found"))
}

#[delete("/illustrations/<id>")]
pub async fn remove_illustration_job(
    state: &State<AppState>,
    id: &str,
) -> PipelineResult<Status> {
    if state.illustration_queue.remove_item(id) {
        info!("Queue item removed successfully: {id}");
        Ok(Status::NoContent)
    } else {
        Err(PipelineError::not_found("Queue item not found"))
    }
}
