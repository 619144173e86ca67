//! Flatten the three translation groups into one model batch and split the result back.
//!
//! Slice boundaries come from the input group sizes only, so the output groups always
//! have the sizes of the input groups.

use tracing::{info, warn};

use crate::error::ServiceError;
use crate::models::TranslationBatch;
use crate::translation::Translator;

/// `insights ++ recommendations ++ [risk]`
pub fn flatten(batch: &TranslationBatch) -> Vec<String> {
    let mut texts = Vec::with_capacity(batch.insights.len() + batch.recommendations.len() + 1);
    texts.extend(batch.insights.iter().cloned());
    texts.extend(batch.recommendations.iter().cloned());
    texts.push(batch.risk.clone());
    texts
}

/// Reassemble model output using the sizes of the `original` groups.
///
/// Extra output strings are tolerated (the risk is always the final entry); too few
/// cannot fill the groups and is an error.
pub fn split(original: &TranslationBatch, translated: Vec<String>) -> Result<TranslationBatch, ServiceError> {
    let insights_len = original.insights.len();
    let recommendations_len = original.recommendations.len();
    let expected = insights_len + recommendations_len + 1;

    if translated.len() < expected {
        return Err(ServiceError::Translation(format!(
            "Translation model returned {} strings for {} inputs",
            translated.len(),
            expected
        )));
    }
    if translated.len() > expected {
        warn!(
            expected,
            received = translated.len(),
            "Translation model returned extra strings"
        );
    }

    let mut translated = translated;
    let risk = translated.pop().unwrap_or_default();
    let recommendations = translated[insights_len..insights_len + recommendations_len].to_vec();
    translated.truncate(insights_len);

    Ok(TranslationBatch {
        insights: translated,
        recommendations,
        risk,
    })
}

/// Translate every group of `batch` with a single call to `translator`.
pub async fn translate_batch(
    translator: &dyn Translator,
    batch: &TranslationBatch,
    lang_code: &str,
) -> Result<TranslationBatch, ServiceError> {
    if !translator.supports(lang_code) {
        return Err(ServiceError::UnsupportedLanguage(lang_code.to_string()));
    }

    let texts = flatten(batch);
    info!(
        lang = %lang_code,
        insights = batch.insights.len(),
        recommendations = batch.recommendations.len(),
        "Translating batch of {} strings",
        texts.len()
    );

    let translated = translator
        .translate(texts, lang_code)
        .await
        .map_err(|e| ServiceError::Translation(e.to_string()))?;

    split(batch, translated)
}
