use crate::models::SessionUser;
use crate::services::auth_service::{GoogleAuth, USER_COOKIE};
use crate::services::illustration_queue::{run_illustration_worker, IllustrationQueue};
use crate::services::image_service::Illustrator;
use crate::services::llm_service::OllamaClient;
use crate::services::store::Store;
use crate::services::transcript_service::{TranscriptProvider, YouTubeTranscriptProvider};
use crate::AppState;
use anyhow::{Context, Result};
use env_logger::Builder;
use log::{info, LevelFilter};
use rocket::http::{Method, Status};
use rocket::request::{FromRequest, Outcome};
use rocket::Request;
use rocket_cors::{AllowedHeaders, AllowedOrigins, CorsOptions};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct ImageServiceConfig {
    pub base_url: String,
    pub steps: u32,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub images_dir: PathBuf,
    pub ollama: OllamaConfig,
    pub image_service: ImageServiceConfig,
    pub google: GoogleOAuthConfig,
    pub cors_origin: String,
    pub transcript_languages: Vec<String>,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Self {
        AppConfig {
            database_path: PathBuf::from(env_or("DATABASE_PATH", "data/app.db")),
            images_dir: PathBuf::from(env_or("IMAGES_DIR", "images")),
            ollama: OllamaConfig {
                base_url: env_or("OLLAMA_URL", "http://localhost:11434"),
                model: env_or("OLLAMA_MODEL", "llama3.1:8b"),
            },
            image_service: ImageServiceConfig {
                base_url: env_or("SD_URL", "http://127.0.0.1:7860"),
                steps: env_or("SD_STEPS", "20").parse::<u32>().unwrap_or(20),
            },
            google: GoogleOAuthConfig {
                client_id: env_or("GOOGLE_CLIENT_ID", ""),
                client_secret: env_or("GOOGLE_CLIENT_SECRET", ""),
                redirect_uri: env_or(
                    "GOOGLE_REDIRECT_URI",
                    "http://localhost:8000/auth/google/callback",
                ),
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            },
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:8080"),
            transcript_languages: env_or("TRANSCRIPT_LANGUAGES", "en")
                .split(',')
                .map(|lang| lang.trim().to_string())
                .filter(|lang| !lang.is_empty())
                .collect(),
        }
    }
}

pub fn init_logger() {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();
    info!("Starting Rocket backend...");
}

pub fn load_environment() {
    dotenv::dotenv().ok();
}

pub async fn create_app_state(config: AppConfig) -> Result<AppState> {
    let provider = Arc::new(YouTubeTranscriptProvider::new(
        config.transcript_languages.clone(),
    ));
    create_app_state_with_provider(config, provider).await
}

/// Open the store, build the service clients and start the illustration
/// worker. The worker stops once the state (and its queue) is dropped.
pub async fn create_app_state_with_provider(
    config: AppConfig,
    transcripts: Arc<dyn TranscriptProvider>,
) -> Result<AppState> {
    let store = Arc::new(Store::open(&config.database_path)?);

    std::fs::create_dir_all(&config.images_dir)
        .with_context(|| format!("Failed to create images directory {:?}", config.images_dir))?;

    let llm = OllamaClient::new(&config.ollama)?;
    let illustrator = Arc::new(Illustrator::new(
        &config.image_service,
        config.images_dir.clone(),
        store.clone(),
    )?);
    let auth = GoogleAuth::new(config.google.clone())?;

    let (queue, jobs) = IllustrationQueue::new();
    let illustration_queue = Arc::new(queue);
    tokio::spawn(run_illustration_worker(
        Arc::downgrade(&illustration_queue),
        jobs,
        illustrator.clone(),
    ));
    info!("Illustration worker spawned.");

    Ok(AppState {
        config,
        store,
        transcripts,
        llm,
        illustrator,
        illustration_queue,
        auth,
    })
}

pub fn create_cors(origin: &str) -> Result<rocket_cors::Cors> {
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::some_exact(&[origin]))
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Delete, Method::Options]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allowed_headers(AllowedHeaders::some(&[
            "Authorization",
            "Accept",
            "Content-Type",
        ]))
        .allow_credentials(true)
        .to_cors()
        .map_err(|e| anyhow::anyhow!("Failed to create CORS options: {}", e))?;

    Ok(cors)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionUser {
    type Error = &'static str;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let user = request
            .cookies()
            .get_private(USER_COOKIE)
            .and_then(|cookie| serde_json::from_str(cookie.value()).ok());

        match user {
            Some(user) => Outcome::Success(SessionUser(user)),
            None => Outcome::Error((Status::Unauthorized, "Not logged in")),
        }
    }
}
