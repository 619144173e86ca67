use async_trait::async_trait;
use relay_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::session_keys;
use crate::error::ServiceError;
use crate::llm::CompletionService;
use crate::normalizer::normalize_reply;
use crate::prompt::{Category, SYSTEM_PROMPT, build_extraction_prompt};

/// Asks the LLM for the category's metrics and normalizes its reply
pub struct MetricExtractTask {
    llm: Arc<dyn CompletionService>,
    timeout: Duration,
}

impl MetricExtractTask {
    pub fn new(llm: Arc<dyn CompletionService>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }
}

#[async_trait]
impl Task for MetricExtractTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let category: Category = context.get_required(session_keys::CATEGORY).await?;
        let text: String = context.get_required(session_keys::EXTRACTED_TEXT).await?;

        let prompt = build_extraction_prompt(category, &text);
        info!(category = %category, "Requesting metric extraction from LLM");

        let reply = match tokio::time::timeout(self.timeout, self.llm.complete(SYSTEM_PROMPT, &prompt)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(ServiceError::Llm(e.to_string()).into()),
            Err(_) => return Err(ServiceError::LlmTimeout(self.timeout.as_secs()).into()),
        };

        let metrics = normalize_reply(&reply, &category.fields());
        let parsed = !metrics.is_fallback();
        context.set(session_keys::METRICS, &metrics).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::End,
            Some(if parsed {
                format!("Extracted {} metric fields", metrics.len())
            } else {
                "Model reply was not JSON; returning raw reply".to_string()
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricRecord, NOT_FOUND, RAW_RESPONSE_FIELD};
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedLlm {
        reply: anyhow::Result<String>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedLlm {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedLlm {
        async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), user_prompt.to_string()));
            match &self.reply {
                Ok(reply) => Ok(reply.clone()),
                Err(e) => Err(anyhow!("{}", e)),
            }
        }
    }

    struct StalledLlm;

    #[async_trait]
    impl CompletionService for StalledLlm {
        async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    async fn prepared_context() -> Context {
        let context = Context::new();
        context.set(session_keys::CATEGORY, Category::Diabetes).await.unwrap();
        context
            .set(session_keys::EXTRACTED_TEXT, "Glucose: 110")
            .await
            .unwrap();
        context
    }

    #[tokio::test]
    async fn reply_is_normalized_into_metrics() {
        let llm = Arc::new(ScriptedLlm::replying(r#"{"Glucose": "110"}"#));
        let task = MetricExtractTask::new(llm.clone(), Duration::from_secs(5));
        let context = prepared_context().await;

        let result = task.run(context.clone()).await.unwrap();
        assert_eq!(result.next_action, NextAction::End);

        let metrics: MetricRecord = context.get(session_keys::METRICS).await.unwrap();
        assert_eq!(metrics.len(), 8);
        assert_eq!(metrics.get("Glucose"), Some(&json!("110")));
        assert_eq!(metrics.get("Age"), Some(&json!(NOT_FOUND)));

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].0, SYSTEM_PROMPT);
        assert!(prompts[0].1.contains("Glucose: 110"));
    }

    #[tokio::test]
    async fn prose_reply_degrades_to_raw_record() {
        let llm = Arc::new(ScriptedLlm::replying("No values found."));
        let task = MetricExtractTask::new(llm, Duration::from_secs(5));
        let context = prepared_context().await;

        task.run(context.clone()).await.unwrap();

        let metrics: MetricRecord = context.get(session_keys::METRICS).await.unwrap();
        assert_eq!(metrics.get(RAW_RESPONSE_FIELD), Some(&json!("No values found.")));
    }

    #[tokio::test]
    async fn llm_failure_carries_the_message() {
        let llm = Arc::new(ScriptedLlm {
            reply: Err(anyhow!("401 Unauthorized")),
            prompts: Mutex::new(Vec::new()),
        });
        let task = MetricExtractTask::new(llm, Duration::from_secs(5));

        let err = task.run(prepared_context().await).await.unwrap_err();
        assert!(matches!(
            ServiceError::from_graph_error(err),
            ServiceError::Llm(msg) if msg == "401 Unauthorized"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_llm_times_out() {
        let task = MetricExtractTask::new(Arc::new(StalledLlm), Duration::from_secs(30));

        let err = task.run(prepared_context().await).await.unwrap_err();
        assert!(matches!(
            ServiceError::from_graph_error(err),
            ServiceError::LlmTimeout(30)
        ));
    }
}
