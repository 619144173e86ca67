//! Marian (opus-mt) translation on ONNX Runtime.
//!
//! Each language directory holds an optimum export of the model:
//! `encoder_model.onnx`, `decoder_model.onnx`, `tokenizer.json` and the model's
//! `config.json`. Generation is batched greedy decoding without a KV cache.

use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use ort::{
    inputs,
    session::{Session, builder::GraphOptimizationLevel},
    value::Tensor,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use super::Translator;

const ENCODER_FILE: &str = "encoder_model.onnx";
const DECODER_FILE: &str = "decoder_model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";
const CONFIG_FILE: &str = "config.json";

/// Source sentences longer than this are cut (keeping the closing EOS token)
const MAX_SOURCE_TOKENS: usize = 512;

fn default_max_length() -> usize {
    512
}

/// The generation settings we need from the Hugging Face `config.json`
#[derive(Debug, Clone, Deserialize)]
pub struct MarianConfig {
    pub decoder_start_token_id: i64,
    pub eos_token_id: i64,
    pub pad_token_id: i64,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

pub struct MarianModel {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    tokenizer: Tokenizer,
    config: MarianConfig,
}

impl MarianModel {
    pub fn load(dir: &Path, intra_threads: usize) -> anyhow::Result<Self> {
        let config_text = std::fs::read_to_string(dir.join(CONFIG_FILE))
            .with_context(|| format!("reading {}", dir.join(CONFIG_FILE).display()))?;
        let config: MarianConfig =
            serde_json::from_str(&config_text).context("parsing Marian config.json")?;

        let tokenizer = Tokenizer::from_file(dir.join(TOKENIZER_FILE))
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", dir.display(), e))?;

        let encoder = load_session(&dir.join(ENCODER_FILE), intra_threads)?;
        let decoder = load_session(&dir.join(DECODER_FILE), intra_threads)?;

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            tokenizer,
            config,
        })
    }

    /// Translate a batch in one encoder pass and one shared greedy decoding loop.
    pub fn translate(&self, texts: &[String]) -> anyhow::Result<Vec<String>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let (input_ids, attention_mask, source_len) = self.encode_batch(texts)?;
        let batch = texts.len();

        let (hidden, hidden_dim) = {
            let mut encoder = self
                .encoder
                .lock()
                .map_err(|_| anyhow!("encoder session lock poisoned"))?;
            let outputs = encoder.run(inputs![
                "input_ids" => Tensor::from_array(([batch, source_len], input_ids.into_boxed_slice()))?,
                "attention_mask" => Tensor::from_array(([batch, source_len], attention_mask.clone().into_boxed_slice()))?
            ])?;
            let (shape, data) = outputs["last_hidden_state"].try_extract_tensor::<f32>()?;
            let hidden_dim = *shape
                .last()
                .ok_or_else(|| anyhow!("encoder returned a scalar"))? as usize;
            (data.to_vec(), hidden_dim)
        };

        let generated = self.greedy_decode(&hidden, hidden_dim, &attention_mask, batch, source_len)?;

        generated
            .iter()
            .map(|ids| {
                self.tokenizer
                    .decode(ids, true)
                    .map_err(|e| anyhow!("Failed to decode translation: {}", e))
            })
            .collect()
    }

    /// Token ids and attention mask, right-padded to the longest sentence.
    fn encode_batch(&self, texts: &[String]) -> anyhow::Result<(Vec<i64>, Vec<i64>, usize)> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.iter().map(String::as_str).collect::<Vec<_>>(), true)
            .map_err(|e| anyhow!("Failed to tokenize batch: {}", e))?;

        let mut rows: Vec<Vec<i64>> = encodings
            .iter()
            .map(|encoding| encoding.get_ids().iter().map(|&id| id as i64).collect())
            .collect();

        for row in rows.iter_mut() {
            if row.len() > MAX_SOURCE_TOKENS {
                row.truncate(MAX_SOURCE_TOKENS);
                row[MAX_SOURCE_TOKENS - 1] = self.config.eos_token_id;
            }
            if row.is_empty() {
                row.push(self.config.eos_token_id);
            }
        }

        let source_len = rows.iter().map(Vec::len).max().unwrap_or(1);
        let mut input_ids = Vec::with_capacity(rows.len() * source_len);
        let mut attention_mask = Vec::with_capacity(rows.len() * source_len);

        for row in &rows {
            let padding = source_len - row.len();
            input_ids.extend_from_slice(row);
            input_ids.extend(std::iter::repeat_n(self.config.pad_token_id, padding));
            attention_mask.extend(std::iter::repeat_n(1i64, row.len()));
            attention_mask.extend(std::iter::repeat_n(0i64, padding));
        }

        Ok((input_ids, attention_mask, source_len))
    }

    fn greedy_decode(
        &self,
        hidden: &[f32],
        hidden_dim: usize,
        attention_mask: &[i64],
        batch: usize,
        source_len: usize,
    ) -> anyhow::Result<Vec<Vec<u32>>> {
        let MarianConfig {
            decoder_start_token_id,
            eos_token_id,
            pad_token_id,
            max_length,
        } = self.config.clone();

        let mut sequences = vec![vec![decoder_start_token_id]; batch];
        let mut finished = vec![false; batch];
        let mut decoder = self
            .decoder
            .lock()
            .map_err(|_| anyhow!("decoder session lock poisoned"))?;

        for step in 1..max_length {
            let step_len = sequences[0].len();
            let outputs = decoder.run(inputs![
                "encoder_attention_mask" => Tensor::from_array(([batch, source_len], attention_mask.to_vec().into_boxed_slice()))?,
                "input_ids" => Tensor::from_array(([batch, step_len], sequences.concat().into_boxed_slice()))?,
                "encoder_hidden_states" => Tensor::from_array(([batch, source_len, hidden_dim], hidden.to_vec().into_boxed_slice()))?
            ])?;
            let (shape, logits) = outputs["logits"].try_extract_tensor::<f32>()?;
            let vocab_size = *shape
                .last()
                .ok_or_else(|| anyhow!("decoder returned a scalar"))? as usize;

            for (row, sequence) in sequences.iter_mut().enumerate() {
                if finished[row] {
                    sequence.push(pad_token_id);
                    continue;
                }

                let offset = (row * step_len + step_len - 1) * vocab_size;
                let next_token = logits[offset..offset + vocab_size]
                    .iter()
                    .enumerate()
                    .filter(|(id, _)| *id as i64 != pad_token_id)
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))
                    .map(|(id, _)| id as i64)
                    .unwrap_or(eos_token_id);

                sequence.push(next_token);
                if next_token == eos_token_id {
                    finished[row] = true;
                }
            }

            if finished.iter().all(|done| *done) {
                debug!(steps = step, "All sequences reached EOS");
                break;
            }
        }

        Ok(sequences
            .into_iter()
            .map(|sequence| {
                sequence
                    .into_iter()
                    .skip(1)
                    .take_while(|&id| id != eos_token_id)
                    .map(|id| id as u32)
                    .collect()
            })
            .collect())
    }
}

fn load_session(path: &Path, intra_threads: usize) -> anyhow::Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?
        .commit_from_file(path)
        .with_context(|| format!("loading ONNX model {}", path.display()))?;
    Ok(session)
}

/// [`Translator`] holding one [`MarianModel`] per language code
pub struct MarianTranslator {
    models: HashMap<String, Arc<MarianModel>>,
}

impl MarianTranslator {
    /// Load `<models_dir>/<lang>` for each language. Languages that fail to load are
    /// logged and left unsupported.
    pub fn load(models_dir: &Path, languages: &[String], intra_threads: usize) -> Self {
        let mut models = HashMap::new();

        for lang in languages {
            let dir: PathBuf = models_dir.join(lang);
            match MarianModel::load(&dir, intra_threads) {
                Ok(model) => {
                    info!(lang = %lang, dir = %dir.display(), "Loaded translation model");
                    models.insert(lang.clone(), Arc::new(model));
                }
                Err(e) => {
                    warn!(lang = %lang, dir = %dir.display(), error = %e, "Translation model unavailable");
                }
            }
        }

        Self { models }
    }
}

#[async_trait]
impl Translator for MarianTranslator {
    fn supports(&self, lang_code: &str) -> bool {
        self.models.contains_key(lang_code)
    }

    fn supported_languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.models.keys().cloned().collect();
        languages.sort();
        languages
    }

    async fn translate(&self, texts: Vec<String>, lang_code: &str) -> anyhow::Result<Vec<String>> {
        let model = self
            .models
            .get(lang_code)
            .cloned()
            .ok_or_else(|| anyhow!("no translation model loaded for '{}'", lang_code))?;

        info!(lang = %lang_code, strings = texts.len(), "Running batch translation");

        tokio::task::spawn_blocking(move || model.translate(&texts)).await?
    }
}
