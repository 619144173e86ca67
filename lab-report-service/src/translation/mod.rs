pub mod marian;

use async_trait::async_trait;

pub use marian::{MarianModel, MarianTranslator};

/// Pretrained machine-translation models, one per supported target language.
///
/// Built once at startup and shared read-only by every request.
#[async_trait]
pub trait Translator: Send + Sync {
    fn supports(&self, lang_code: &str) -> bool;

    fn supported_languages(&self) -> Vec<String>;

    /// Translate `texts` in a single model invocation; output order follows input order.
    async fn translate(&self, texts: Vec<String>, lang_code: &str) -> anyhow::Result<Vec<String>>;
}
