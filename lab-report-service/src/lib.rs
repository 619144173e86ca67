pub mod batch;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod normalizer;
pub mod pdf;
pub mod prompt;
pub mod service;
pub mod tasks;
pub mod translation;
pub mod workflow;

pub use config::AppConfig;
pub use error::ServiceError;
pub use models::*;
pub use prompt::Category;
pub use service::{AppState, build_router, create_app};
pub use workflow::{build_extraction_workflow, build_translation_workflow, run_metric_extraction, run_translation};
