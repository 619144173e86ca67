use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{GraphError, Result};

/// Request-scoped state shared by the tasks of one graph execution.
///
/// Structured values are stored as JSON. Binary payloads (uploaded documents)
/// live in a separate attachment map so they are shared, not serialized.
#[derive(Clone, Debug, Default)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
    attachments: Arc<DashMap<String, Arc<[u8]>>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl serde::Serialize) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| GraphError::ContextError(format!("cannot store '{}': {}", key, e)))?;
        self.data.insert(key, value);
        Ok(())
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Like [`Context::get`], but a missing or mistyped value is an error.
    pub async fn get_required<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get(key)
            .await
            .ok_or_else(|| GraphError::ContextError(format!("{} not found in context", key)))
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    pub fn attach(&self, key: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.attachments.insert(key.into(), bytes.into());
    }

    pub fn attachment(&self, key: &str) -> Option<Arc<[u8]>> {
        self.attachments.get(key).map(|entry| entry.clone())
    }
}
