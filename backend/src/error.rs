use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::io::Cursor;
use thiserror::Error;

use crate::models::ErrorResponse;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Transcript not available for this video.")]
    TranscriptUnavailable { video_id: String },

    #[error("{0}")]
    NotFound(String),

    #[error("Ollama error")]
    GenerationService { status: u16, body: String },

    #[error("Failed to parse LLM output as JSON")]
    MalformedGenerationOutput { reason: String, raw: String },

    #[error("{0}")]
    Internal(String),

    #[error("Store error: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn malformed(reason: impl Into<String>, raw: &str) -> Self {
        Self::MalformedGenerationOutput {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }

    pub fn status(&self) -> Status {
        match self {
            PipelineError::InvalidInput(_) => Status::BadRequest,
            PipelineError::TranscriptUnavailable { .. } | PipelineError::NotFound(_) => {
                Status::NotFound
            }
            PipelineError::GenerationService { .. } => Status::BadGateway,
            PipelineError::MalformedGenerationOutput { .. }
            | PipelineError::Internal(_)
            | PipelineError::Store(_)
            | PipelineError::Http(_)
            | PipelineError::Io(_) => Status::InternalServerError,
        }
    }

    pub fn to_response_body(&self) -> ErrorResponse {
        let mut body = ErrorResponse::new(self.to_string());
        match self {
            PipelineError::GenerationService { status, .. } => body.status = Some(*status),
            PipelineError::MalformedGenerationOutput { raw, .. } => {
                body.llm_response = Some(raw.clone())
            }
            _ => {}
        }
        body
    }
}

impl<'r> Responder<'r, 'static> for PipelineError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let json = serde_json::to_string(&self.to_response_body())
            .map_err(|_| Status::InternalServerError)?;
        Response::build()
            .status(self.status())
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}
