use async_trait::async_trait;
use relay_flow::{Context, NextAction, Result, Task, TaskResult};
use tracing::info;

use super::session_keys;
use crate::error::ServiceError;
use crate::prompt::Category;

const PDF_EXTENSION: &str = ".pdf";

/// Rejects requests without a PDF upload or with an unknown category
pub struct UploadGateTask;

#[async_trait]
impl Task for UploadGateTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        if context.attachment(session_keys::DOCUMENT).is_none() {
            return Err(ServiceError::MissingFile.into());
        }

        let filename: String = context
            .get(session_keys::FILENAME)
            .await
            .unwrap_or_default();
        if !filename.to_lowercase().ends_with(PDF_EXTENSION) {
            return Err(ServiceError::UnsupportedFileType.into());
        }

        let tag: String = context.get_required(session_keys::CATEGORY_TAG).await?;
        let category: Category = tag.parse()?;
        context.set(session_keys::CATEGORY, category).await?;

        info!(filename = %filename, category = %category, "Upload accepted");

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(format!("{} accepted for {} extraction", filename, category)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn context_with(filename: Option<&str>, document: bool, tag: &str) -> Context {
        let context = Context::new();
        if document {
            context.attach(session_keys::DOCUMENT, b"%PDF-1.4".to_vec());
        }
        if let Some(name) = filename {
            context.set(session_keys::FILENAME, name).await.unwrap();
        }
        context.set(session_keys::CATEGORY_TAG, tag).await.unwrap();
        context
    }

    async fn gate(context: Context) -> std::result::Result<TaskResult, ServiceError> {
        UploadGateTask
            .run(context)
            .await
            .map_err(ServiceError::from_graph_error)
    }

    #[tokio::test]
    async fn accepts_pdf_with_known_category() {
        let context = context_with(Some("Report.PDF"), true, "heart").await;
        let result = gate(context.clone()).await.unwrap();

        assert_eq!(result.next_action, NextAction::Continue);
        let category: Category = context.get(session_keys::CATEGORY).await.unwrap();
        assert_eq!(category, Category::HeartDisease);
    }

    #[tokio::test]
    async fn missing_document_is_rejected_first() {
        let err = gate(context_with(None, false, "unknown").await).await.unwrap_err();
        assert!(matches!(err, ServiceError::MissingFile));
    }

    #[tokio::test]
    async fn non_pdf_extension_is_rejected() {
        let err = gate(context_with(Some("report.docx"), true, "diabetes").await)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedFileType));
    }

    #[tokio::test]
    async fn unknown_category_is_rejected() {
        let err = gate(context_with(Some("report.pdf"), true, "kidney").await)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedCategory(tag) if tag == "kidney"));
    }
}
