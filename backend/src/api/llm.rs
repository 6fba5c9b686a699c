use crate::error::PipelineResult;
use crate::models::{LlmRequest, LlmResponse};
use crate::services::llm_service;
use crate::AppState;
use log::error;
use rocket::serde::json::Json;
use rocket::{post, State};

#[post("/llm", data = "<request>")]
pub async fn llm_extract(
    state: &State<AppState>,
    request: Json<LlmRequest>,
) -> PipelineResult<Json<LlmResponse>> {
    match llm_service::extract_keywords(&state.llm, &request.text).await {
        Ok(response) => Ok(Json(LlmResponse { response })),
        Err(e) => {
            error!("Keyword extraction failed: {e}");
            Err(e)
        }
    }
}
