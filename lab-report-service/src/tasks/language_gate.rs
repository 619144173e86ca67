use async_trait::async_trait;
use relay_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::warn;

use super::session_keys;
use crate::error::ServiceError;
use crate::translation::Translator;

/// Refuses language codes with no loaded translation model
pub struct LanguageGateTask {
    translator: Arc<dyn Translator>,
}

impl LanguageGateTask {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self { translator }
    }
}

#[async_trait]
impl Task for LanguageGateTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let lang_code: String = context.get_required(session_keys::LANG_CODE).await?;

        if !self.translator.supports(&lang_code) {
            warn!(
                lang = %lang_code,
                supported = ?self.translator.supported_languages(),
                "Unsupported language code"
            );
            return Err(ServiceError::UnsupportedLanguage(lang_code).into());
        }

        Ok(TaskResult::new(None, NextAction::Continue))
    }
}
