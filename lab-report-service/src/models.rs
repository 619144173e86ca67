use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Placeholder stored for every expected field the model did not report
pub const NOT_FOUND: &str = "Not Found";

/// Field holding the verbatim model reply when no JSON object could be parsed
pub const RAW_RESPONSE_FIELD: &str = "raw_response";

/// A file received through the multipart upload
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub bytes: Arc<[u8]>,
}

/// One call to the metric extraction endpoint
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub document: Option<UploadedDocument>,
    /// Raw `type` query value, resolved against the category registry
    pub category: String,
}

/// Metrics reported by the model, keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricRecord(Map<String, Value>);

impl MetricRecord {
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Record used when the reply held nothing parseable
    pub fn fallback(raw_reply: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(RAW_RESPONSE_FIELD.to_string(), json!(raw_reply));
        Self(fields)
    }

    pub fn is_fallback(&self) -> bool {
        self.0.len() == 1 && self.0.contains_key(RAW_RESPONSE_FIELD)
    }

    /// Insert the sentinel for each expected field that is absent.
    pub fn fill_missing(&mut self, expected: &[&str]) {
        for field in expected {
            self.0
                .entry(field.to_string())
                .or_insert_with(|| json!(NOT_FOUND));
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Payload of a successful metric extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricExtraction {
    pub metrics: MetricRecord,
    pub text_preview: String,
}

/// Uniform `{success, data | error}` response body
#[derive(Debug, Serialize)]
pub struct ResultEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ResultEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExtractQuery {
    #[serde(rename = "type")]
    pub category: Option<String>,
}

fn default_score() -> Value {
    json!(0)
}

fn default_lang_code() -> String {
    "hi".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub risk: String,
    /// Passed back untouched
    #[serde(default = "default_score")]
    pub score: Value,
    #[serde(default = "default_lang_code")]
    pub lang_code: String,
}

impl TranslationRequest {
    pub fn batch(&self) -> TranslationBatch {
        TranslationBatch {
            insights: self.insights.clone(),
            recommendations: self.recommendations.clone(),
            risk: self.risk.clone(),
        }
    }
}

/// The three named groups translated in one model call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationBatch {
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub risk: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResponse {
    pub success: bool,
    pub risk: String,
    pub score: Value,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
}

impl TranslationResponse {
    pub fn new(translated: TranslationBatch, score: Value) -> Self {
        Self {
            success: true,
            risk: translated.risk,
            score,
            insights: translated.insights,
            recommendations: translated.recommendations,
        }
    }
}
