use anyhow::anyhow;
use async_trait::async_trait;
use rig::{
    client::CompletionClient,
    completion::Prompt,
    providers::{groq, openrouter},
};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Hosted chat-completion model used for metric extraction
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Groq,
    OpenRouter,
}

impl LlmProvider {
    pub fn api_key_var(self) -> &'static str {
        match self {
            LlmProvider::Groq => "GROQ_API_KEY",
            LlmProvider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            LlmProvider::Groq => "llama3-70b-8192",
            LlmProvider::OpenRouter => "meta-llama/llama-3-70b-instruct",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::Groq => f.write_str("groq"),
            LlmProvider::OpenRouter => f.write_str("openrouter"),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(LlmProvider::Groq),
            "openrouter" => Ok(LlmProvider::OpenRouter),
            other => Err(anyhow!("unknown LLM provider '{}'", other)),
        }
    }
}

enum ProviderClient {
    Groq(groq::Client),
    OpenRouter(openrouter::Client),
}

/// [`CompletionService`] backed by a rig agent
pub struct RigCompletionService {
    client: ProviderClient,
    model: String,
    temperature: f64,
}

impl RigCompletionService {
    pub fn new(provider: LlmProvider, api_key: &str, model: impl Into<String>, temperature: f64) -> Self {
        let client = match provider {
            LlmProvider::Groq => ProviderClient::Groq(groq::Client::new(api_key)),
            LlmProvider::OpenRouter => ProviderClient::OpenRouter(openrouter::Client::new(api_key)),
        };

        Self {
            client,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl CompletionService for RigCompletionService {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        info!(model = %self.model, prompt_chars = user_prompt.len(), "Calling LLM");

        let reply = match &self.client {
            ProviderClient::Groq(client) => {
                let agent = client
                    .agent(&self.model)
                    .preamble(system_prompt)
                    .temperature(self.temperature)
                    .build();
                agent.prompt(user_prompt).await?
            }
            ProviderClient::OpenRouter(client) => {
                let agent = client
                    .agent(&self.model)
                    .preamble(system_prompt)
                    .temperature(self.temperature)
                    .build();
                agent.prompt(user_prompt).await?
            }
        };

        info!(reply_chars = reply.len(), "LLM replied");
        Ok(reply)
    }
}
