use async_trait::async_trait;
use relay_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;

use super::session_keys;
use crate::batch::translate_batch;
use crate::models::TranslationBatch;
use crate::translation::Translator;

/// Translates insights, recommendations and risk in one model call
pub struct BatchTranslateTask {
    translator: Arc<dyn Translator>,
}

impl BatchTranslateTask {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self { translator }
    }
}

#[async_trait]
impl Task for BatchTranslateTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let batch: TranslationBatch = context.get_required(session_keys::TRANSLATION_BATCH).await?;
        let lang_code: String = context.get_required(session_keys::LANG_CODE).await?;

        let translated = translate_batch(self.translator.as_ref(), &batch, &lang_code).await?;

        context.set(session_keys::TRANSLATED_BATCH, translated).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::End,
            Some(format!("Translated batch into '{}'", lang_code)),
        ))
    }
}
