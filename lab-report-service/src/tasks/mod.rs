// Metric extraction workflow
pub mod metric_extract;
pub mod text_extract;
pub mod upload_gate;

// Translation workflow
pub mod batch_translate;
pub mod language_gate;

pub use batch_translate::BatchTranslateTask;
pub use language_gate::LanguageGateTask;
pub use metric_extract::MetricExtractTask;
pub use text_extract::TextExtractTask;
pub use upload_gate::UploadGateTask;

/// Keys shared by the tasks through the request context
pub mod session_keys {
    pub const DOCUMENT: &str = "document";
    pub const FILENAME: &str = "filename";
    pub const CATEGORY_TAG: &str = "category_tag";
    pub const CATEGORY: &str = "category";
    pub const EXTRACTED_TEXT: &str = "extracted_text";
    pub const METRICS: &str = "metrics";
    pub const TRANSLATION_BATCH: &str = "translation_batch";
    pub const LANG_CODE: &str = "lang_code";
    pub const TRANSLATED_BATCH: &str = "translated_batch";
}
