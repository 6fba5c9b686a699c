pub mod auth_service;
pub mod illustration_queue;
pub mod image_service;
pub mod llm_service;
pub mod migrations;
pub mod segment_service;
pub mod store;
pub mod transcript_service;
