pub mod auth;
pub mod illustrations;
pub mod llm;
pub mod segments;
pub mod topics;
pub mod transcript;

pub use auth::*;
pub use illustrations::*;
pub use llm::*;
pub use segments::*;
pub use topics::*;
pub use transcript::*;
