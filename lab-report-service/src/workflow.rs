//! The two request workflows.
//!
//! Metric extraction: `UploadGate → TextExtract → MetricExtract`.
//! Translation: `LanguageGate → BatchTranslate`.
//! A failing task ends the walk; its [`ServiceError`] becomes the response.

use relay_flow::{Context, Graph, GraphBuilder, Task};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::error::ServiceError;
use crate::llm::CompletionService;
use crate::models::{
    ExtractionRequest, MetricExtraction, MetricRecord, TranslationBatch, TranslationRequest,
    TranslationResponse,
};
use crate::pdf::PdfReader;
use crate::prompt::char_prefix;
use crate::tasks::*;
use crate::translation::Translator;

/// Characters of extracted text echoed back to the caller
pub const TEXT_PREVIEW_CHARS: usize = 1000;

pub fn build_extraction_workflow(
    pdf_reader: Arc<dyn PdfReader>,
    llm: Arc<dyn CompletionService>,
    llm_timeout: Duration,
) -> Graph {
    let upload_gate_task = Arc::new(UploadGateTask);
    let upload_gate_id = upload_gate_task.id().to_string();

    let text_extract_task = Arc::new(TextExtractTask::new(pdf_reader));
    let text_extract_id = text_extract_task.id().to_string();

    let metric_extract_task = Arc::new(MetricExtractTask::new(llm, llm_timeout));
    let metric_extract_id = metric_extract_task.id().to_string();

    GraphBuilder::new("metric_extraction")
        .add_task(upload_gate_task)
        .add_task(text_extract_task)
        .add_task(metric_extract_task)
        .add_edge(&upload_gate_id, &text_extract_id)
        .add_edge(&text_extract_id, &metric_extract_id)
        .build()
}

pub fn build_translation_workflow(translator: Arc<dyn Translator>) -> Graph {
    let language_gate_task = Arc::new(LanguageGateTask::new(translator.clone()));
    let language_gate_id = language_gate_task.id().to_string();

    let batch_translate_task = Arc::new(BatchTranslateTask::new(translator));
    let batch_translate_id = batch_translate_task.id().to_string();

    GraphBuilder::new("translation")
        .add_task(language_gate_task)
        .add_task(batch_translate_task)
        .add_edge(&language_gate_id, &batch_translate_id)
        .build()
}

/// Run the metric extraction workflow for one upload.
pub async fn run_metric_extraction(
    graph: &Graph,
    request: ExtractionRequest,
) -> Result<MetricExtraction, ServiceError> {
    let context = Context::new();
    if let Some(document) = request.document {
        context.attach(session_keys::DOCUMENT, document.bytes);
        set(&context, session_keys::FILENAME, document.filename).await?;
    }
    set(&context, session_keys::CATEGORY_TAG, &request.category).await?;

    let outcome = execute_extraction(graph, &context).await;

    outcome.inspect_err(|e: &ServiceError| {
        error!(
            kind = e.kind(),
            category = %request.category,
            error = %e,
            "Health metric extraction error"
        )
    })
}

/// Run the translation workflow; `score` is passed through untouched.
pub async fn run_translation(
    graph: &Graph,
    request: TranslationRequest,
) -> Result<TranslationResponse, ServiceError> {
    let context = Context::new();
    set(&context, session_keys::TRANSLATION_BATCH, request.batch()).await?;
    set(&context, session_keys::LANG_CODE, &request.lang_code).await?;

    let outcome = execute_translation(graph, &context)
        .await
        .map(|translated| TranslationResponse::new(translated, request.score.clone()));

    outcome.inspect_err(|e: &ServiceError| {
        error!(
            kind = e.kind(),
            lang = %request.lang_code,
            error = %e,
            "Translation error"
        )
    })
}

async fn execute_extraction(graph: &Graph, context: &Context) -> Result<MetricExtraction, ServiceError> {
    let result = graph
        .execute(context.clone())
        .await
        .map_err(ServiceError::from_graph_error)?;
    info!(trail = ?result.trail, "Metric extraction workflow completed");

    let metrics: MetricRecord = required(context, session_keys::METRICS).await?;
    let text: String = required(context, session_keys::EXTRACTED_TEXT).await?;

    Ok(MetricExtraction {
        metrics,
        text_preview: char_prefix(&text, TEXT_PREVIEW_CHARS).to_string(),
    })
}

async fn execute_translation(graph: &Graph, context: &Context) -> Result<TranslationBatch, ServiceError> {
    graph
        .execute(context.clone())
        .await
        .map_err(ServiceError::from_graph_error)?;

    required(context, session_keys::TRANSLATED_BATCH).await
}

async fn set(context: &Context, key: &str, value: impl serde::Serialize) -> Result<(), ServiceError> {
    context
        .set(key, value)
        .await
        .map_err(ServiceError::from_graph_error)
}

async fn required<T: serde::de::DeserializeOwned>(context: &Context, key: &str) -> Result<T, ServiceError> {
    context
        .get_required(key)
        .await
        .map_err(ServiceError::from_graph_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NOT_FOUND, UploadedDocument};
    use crate::pdf::PageTexts;
    use crate::prompt::Category;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    struct TwoPageReader;

    impl PdfReader for TwoPageReader {
        fn read(&self, _bytes: &[u8]) -> anyhow::Result<PageTexts> {
            Ok(vec![Ok("Glucose: 110".to_string()), Err(anyhow!("corrupt page"))])
        }
    }

    struct CountingLlm {
        reply: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionService for CountingLlm {
        async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    struct FixedTranslator(Vec<&'static str>);

    #[async_trait]
    impl Translator for FixedTranslator {
        fn supports(&self, lang_code: &str) -> bool {
            lang_code == "hi"
        }

        fn supported_languages(&self) -> Vec<String> {
            vec!["hi".to_string()]
        }

        async fn translate(&self, _texts: Vec<String>, _lang_code: &str) -> anyhow::Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    fn extraction_graph(reply: &str) -> (Graph, Arc<CountingLlm>) {
        let llm = Arc::new(CountingLlm {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        });
        let graph = build_extraction_workflow(Arc::new(TwoPageReader), llm.clone(), Duration::from_secs(5));
        (graph, llm)
    }

    fn pdf_request(filename: &str, category: &str) -> ExtractionRequest {
        ExtractionRequest {
            document: Some(UploadedDocument {
                filename: filename.to_string(),
                bytes: Arc::from(&b"%PDF-1.4"[..]),
            }),
            category: category.to_string(),
        }
    }

    #[tokio::test]
    async fn two_page_report_with_a_corrupt_page() {
        let (graph, llm) = extraction_graph(r#"{"Glucose": "110"}"#);

        let extraction = run_metric_extraction(&graph, pdf_request("labs.pdf", "diabetes"))
            .await
            .unwrap();

        assert_eq!(extraction.text_preview, "Glucose: 110");
        assert_eq!(extraction.metrics.get("Glucose"), Some(&json!("110")));
        for field in Category::Diabetes.fields().into_iter().filter(|f| *f != "Glucose") {
            assert_eq!(extraction.metrics.get(field), Some(&json!(NOT_FOUND)));
        }
        assert_eq!(extraction.metrics.len(), 8);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gate_failures_never_reach_the_model() {
        let (graph, llm) = extraction_graph("{}");

        let missing = ExtractionRequest {
            document: None,
            category: "diabetes".to_string(),
        };
        let err = run_metric_extraction(&graph, missing).await.unwrap_err();
        assert!(matches!(err, ServiceError::MissingFile));

        let err = run_metric_extraction(&graph, pdf_request("labs.txt", "diabetes"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedFileType));

        let err = run_metric_extraction(&graph, pdf_request("labs.pdf", "thyroid"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedCategory(_)));

        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn preview_is_bounded() {
        struct LongReader;

        impl PdfReader for LongReader {
            fn read(&self, _bytes: &[u8]) -> anyhow::Result<PageTexts> {
                Ok(vec![Ok("x".repeat(TEXT_PREVIEW_CHARS + 500))])
            }
        }

        let llm = Arc::new(CountingLlm {
            reply: "{}".to_string(),
            calls: AtomicUsize::new(0),
        });
        let graph = build_extraction_workflow(Arc::new(LongReader), llm, Duration::from_secs(5));

        let extraction = run_metric_extraction(&graph, pdf_request("big.pdf", "parkinsons"))
            .await
            .unwrap();
        assert_eq!(extraction.text_preview.chars().count(), TEXT_PREVIEW_CHARS);
        assert_eq!(extraction.metrics.len(), Category::Parkinsons.fields().len());
    }

    #[tokio::test]
    async fn whitespace_only_text_is_sent_to_the_model() {
        struct WhitespaceReader;

        impl PdfReader for WhitespaceReader {
            fn read(&self, _bytes: &[u8]) -> anyhow::Result<PageTexts> {
                Ok(vec![Ok(" \n\t".to_string())])
            }
        }

        let llm = Arc::new(CountingLlm {
            reply: "{}".to_string(),
            calls: AtomicUsize::new(0),
        });
        let graph = build_extraction_workflow(Arc::new(WhitespaceReader), llm.clone(), Duration::from_secs(5));

        let extraction = run_metric_extraction(&graph, pdf_request("scan.pdf", "diabetes"))
            .await
            .unwrap();
        assert_eq!(extraction.text_preview, " \n\t");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    fn translation_request(lang_code: &str) -> TranslationRequest {
        TranslationRequest {
            insights: vec!["A".to_string(), "B".to_string()],
            recommendations: vec!["C".to_string()],
            risk: "D".to_string(),
            score: json!(72.5),
            lang_code: lang_code.to_string(),
        }
    }

    #[tokio::test]
    async fn translation_splits_by_input_lengths() {
        let graph = build_translation_workflow(Arc::new(FixedTranslator(vec!["a", "b", "c", "d"])));

        let response = run_translation(&graph, translation_request("hi")).await.unwrap();

        assert!(response.success);
        assert_eq!(response.insights, vec!["a", "b"]);
        assert_eq!(response.recommendations, vec!["c"]);
        assert_eq!(response.risk, "d");
        assert_eq!(response.score, json!(72.5));
    }

    #[tokio::test]
    async fn unsupported_language_is_rejected() {
        let graph = build_translation_workflow(Arc::new(FixedTranslator(vec![])));

        let err = run_translation(&graph, translation_request("xx")).await.unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedLanguage(code) if code == "xx"));
    }

    #[tokio::test]
    async fn short_translation_output_is_a_processing_error() {
        let graph = build_translation_workflow(Arc::new(FixedTranslator(vec!["a"])));

        let err = run_translation(&graph, translation_request("hi")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Translation(_)));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    #[traced_test]
    async fn translation_failure_is_logged_once() {
        let graph = build_translation_workflow(Arc::new(FixedTranslator(vec!["a"])));

        run_translation(&graph, translation_request("hi")).await.unwrap_err();

        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|line| line.contains("ERROR")).count() {
                1 => Ok(()),
                n => Err(format!("expected one error line, found {n}")),
            }
        });
    }

    #[tokio::test]
    #[traced_test]
    async fn extraction_failure_is_logged_once() {
        struct FailingLlm;

        #[async_trait]
        impl CompletionService for FailingLlm {
            async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> anyhow::Result<String> {
                Err(anyhow!("503 Service Unavailable"))
            }
        }

        let graph = build_extraction_workflow(Arc::new(TwoPageReader), Arc::new(FailingLlm), Duration::from_secs(5));

        let err = run_metric_extraction(&graph, pdf_request("labs.pdf", "diabetes"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Llm(_)));

        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|line| line.contains("ERROR")).count() {
                1 => Ok(()),
                n => Err(format!("expected one error line, found {n}")),
            }
        });
    }
}
