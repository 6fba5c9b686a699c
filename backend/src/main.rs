#[macro_use]
extern crate rocket;

mod api;
mod config;
mod error;
mod models;
mod services;
mod utils;


use crate::config::{create_app_state, create_cors, init_logger, load_environment, AppConfig};
use crate::models::ErrorResponse;
use crate::services::auth_service::GoogleAuth;
use crate::services::illustration_queue::IllustrationQueue;
use crate::services::image_service::Illustrator;
use crate::services::llm_service::OllamaClient;
use crate::services::store::Store;
use crate::services::transcript_service::TranscriptProvider;
use rocket::fs::FileServer;
use rocket::serde::json::Json;
use rocket::{Build, Request, Rocket};
use std::sync::Arc;

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<Store>,
    pub transcripts: Arc<dyn TranscriptProvider>,
    pub llm: OllamaClient,
    pub illustrator: Arc<Illustrator>,
    pub illustration_queue: Arc<IllustrationQueue>,
    pub auth: GoogleAuth,
}

#[catch(404)]
fn not_found(_req: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse::new("Not found"))
}

#[catch(400)]
fn bad_request(_req: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse::new("Bad request"))
}

#[catch(422)]
fn unprocessable(_req: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse::new("Request body does not match the expected shape"))
}

#[catch(500)]
fn internal_error(_req: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse::new("Internal server error"))
}

pub fn build_rocket(state: AppState) -> Rocket<Build> {
    let images_dir = state.config.images_dir.clone();

    rocket::build()
        .manage(state)
        .mount(
            "/api",
            routes![
                api::fetch_transcript_get,
                api::fetch_transcript_post,
                api::topic_keywords,
                api::generate_segments_images,
                api::get_segments,
                api::list_illustration_jobs,
                api::get_illustration_job,
                api::remove_illustration_job,
                api::llm_extract,
                api::get_user,
            ],
        )
        .mount("/", routes![api::login, api::auth_callback, api::logout])
        .mount("/images", FileServer::from(images_dir))
        .register("/", catchers![not_found, bad_request, unprocessable, internal_error])
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    load_environment();
    init_logger();

    let config = AppConfig::from_env();
    let cors = create_cors(&config.cors_origin)?;
    let state = create_app_state(config).await?;

    let _rocket = build_rocket(state).attach(cors).launch().await?;
    Ok(())
}
