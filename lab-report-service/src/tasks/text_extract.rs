use async_trait::async_trait;
use relay_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, warn};

use super::session_keys;
use crate::error::ServiceError;
use crate::pdf::{PdfReader, extract_text};

/// Turns the uploaded PDF into plain text
pub struct TextExtractTask {
    reader: Arc<dyn PdfReader>,
}

impl TextExtractTask {
    pub fn new(reader: Arc<dyn PdfReader>) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl Task for TextExtractTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let document = context
            .attachment(session_keys::DOCUMENT)
            .ok_or(ServiceError::MissingFile)?;

        info!(bytes = document.len(), "Extracting text from PDF");

        // PDF parsing is CPU bound
        let reader = self.reader.clone();
        let text = tokio::task::spawn_blocking(move || extract_text(reader.as_ref(), &document))
            .await
            .map_err(|e| GraphError::task_failed(ServiceError::Internal(e.to_string())))?;

        if text.is_empty() {
            warn!("No text extracted from document");
            return Err(ServiceError::EmptyText.into());
        }

        let characters = text.chars().count();
        context.set(session_keys::EXTRACTED_TEXT, text).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(format!("Extracted {} characters", characters)),
        ))
    }
}
