//! Remote oracle using OpenAI-compatible APIs
//!
//! Implements both oracle traits over HTTP. Supports any OpenAI-compatible
//! endpoint with configurable URL, model, and API key via environment variable.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RemoteOracleConfig;
use crate::oracle::prompts::{response_prompts, summary_prompt};
use crate::oracle::{ItemContent, OracleError, ResponseOracle, SummarizationOracle, SummaryDraft};

const SUMMARY_SYSTEM_PROMPT: &str = "You compress conversation history into faithful memory summaries.";

/// Remote oracle using OpenAI-compatible HTTP APIs
#[derive(Debug)]
pub struct RemoteOracle {
    client: Client,
    config: RemoteOracleConfig,
    api_key: String,
}

/// OpenAI-compatible chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

/// Message in the chat completion request
#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// JSON body the summary prompt asks for
#[derive(Debug, Deserialize)]
struct SummaryJson {
    summary: String,
    #[serde(default)]
    quality_score: Option<f32>,
}

impl RemoteOracle {
    /// Create a new remote oracle with the given configuration
    ///
    /// Reads the API key from the environment variable specified in config.api_key_env.
    /// Returns an error if the environment variable is not set.
    pub fn new(config: &RemoteOracleConfig) -> Result<Self, OracleError> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            OracleError::Config(format!(
                "API key env var '{}' not set",
                config.api_key_env
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::RequestFailed(e.to_string()))?;

        info!(
            "RemoteOracle initialized with model: {}, api_url: {}",
            config.model, config.api_url
        );

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    /// Call the remote API with exponential backoff for rate limiting
    ///
    /// Makes up to 3 attempts with backoff delays of 1s, 2s on 429 or transport errors.
    async fn call_api(&self, system: &str, prompt: &str) -> Result<String, OracleError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.3,
            max_tokens: 1024,
        };

        let url = format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'));
        debug!("Calling remote API at: {}", url);

        let mut last_error = None;
        let mut delay = Duration::from_secs(1);
        const MAX_RETRIES: u32 = 3;

        for attempt in 0..MAX_RETRIES {
            match self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    if status == 429 {
                        warn!(
                            "Rate limited on attempt {}/{}, waiting {:?}",
                            attempt + 1,
                            MAX_RETRIES,
                            delay
                        );
                        last_error = Some(format!("rate limited ({status})"));
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        continue;
                    }

                    if !status.is_success() {
                        let error_text = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(OracleError::RequestFailed(format!(
                            "API returned {status}: {error_text}"
                        )));
                    }

                    let completion: ChatCompletionResponse = response
                        .json()
                        .await
                        .map_err(|e| OracleError::Malformed(e.to_string()))?;

                    return completion
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| OracleError::Malformed("Empty response".to_string()));
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    last_error = Some(err_msg.clone());
                    if attempt < MAX_RETRIES - 1 {
                        warn!(
                            "Request failed on attempt {}/{}, retrying: {}",
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(OracleError::RequestFailed(format!(
            "Failed after {} retries: {}",
            MAX_RETRIES,
            last_error.unwrap_or_else(|| "Unknown error".to_string())
        )))
    }
}

/// Parse the summary JSON, tolerating a surrounding markdown code fence
fn parse_summary(response: &str) -> Result<SummaryDraft, OracleError> {
    let trimmed = response.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let parsed: SummaryJson = serde_json::from_str(body)
        .map_err(|e| OracleError::Malformed(format!("Failed to parse summary JSON: {e}")))?;

    let summary = parsed.summary.trim();
    if summary.is_empty() {
        return Err(OracleError::Malformed("Summary is empty".to_string()));
    }

    let mut draft = SummaryDraft::new(summary);
    if let Some(score) = parsed.quality_score {
        draft = draft.with_quality_score(score);
    }
    Ok(draft)
}

#[async_trait]
impl SummarizationOracle for RemoteOracle {
    async fn summarize(
        &self,
        items: &[ItemContent],
        persona: &str,
        language: &str,
    ) -> Result<SummaryDraft, OracleError> {
        if items.is_empty() {
            return Err(OracleError::Malformed("Nothing to summarize".to_string()));
        }
        let prompt = summary_prompt(items, persona, language);
        let response = self.call_api(SUMMARY_SYSTEM_PROMPT, &prompt).await?;
        debug!("Summary response: {}", response);
        parse_summary(&response)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[async_trait]
impl ResponseOracle for RemoteOracle {
    async fn respond(
        &self,
        context: &str,
        incoming_message: &str,
        persona: &str,
    ) -> Result<String, OracleError> {
        let (system, prompt) = response_prompts(context, incoming_message, persona);
        let response = self.call_api(&system, &prompt).await?;
        let response = response.trim();
        if response.is_empty() {
            return Err(OracleError::Malformed("Empty reply".to_string()));
        }
        Ok(response.to_string())
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
