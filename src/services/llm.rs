//! LLM-backed statement extraction
//!
//! Calls the Anthropic Messages API with the quote diff and the three
//! knowledge layers, and reads candidate rules back from `STATEMENT:` lines.

use super::{ExtractionRequest, ExtractionService};
use crate::error::{QuotewiseError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Write as _;
use tracing::debug;

/// Configuration for the LLM service
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Anthropic API key
    pub api_key: String,

    /// Model to use (default: claude-3-5-haiku-20241022)
    pub model: String,

    /// Max tokens for responses
    pub max_tokens: usize,

    /// Temperature for sampling
    pub temperature: f32,

    pub endpoint: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
        }
    }
}

pub struct LlmExtractionService {
    config: LlmConfig,
    client: reqwest::Client,
}

/// Anthropic API message format
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Anthropic API response format
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    text: String,
}

impl LlmExtractionService {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(QuotewiseError::Config(
                "ANTHROPIC_API_KEY not set".to_string(),
            ));
        }

        Ok(Self {
            config,
            client: reqwest::Client::new(),
        })
    }

    /// Create with default config
    pub fn with_default() -> Result<Self> {
        Self::new(LlmConfig::default())
    }

    async fn call_api(&self, prompt: &str) -> Result<String> {
        debug!("Calling Anthropic API");

        let request = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(QuotewiseError::LlmApi(format!(
                "API request failed with status {}: {}",
                status, error_text
            )));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| QuotewiseError::LlmApi(format!("Failed to parse response: {}", e)))?;

        api_response
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| QuotewiseError::LlmApi("Empty response from API".to_string()))
    }
}

#[async_trait]
impl ExtractionService for LlmExtractionService {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<String>> {
        let prompt = build_prompt(request);
        let response = self.call_api(&prompt).await?;
        let statements = parse_statements(&response);
        debug!(
            category = %request.category,
            attempt = request.attempt,
            count = statements.len(),
            "Extracted candidate statements"
        );
        Ok(statements)
    }
}

/// Render the extraction prompt
pub fn build_prompt(request: &ExtractionRequest) -> String {
    let mut prompt = format!(
        r#"You are helping a contractor's quoting assistant learn from their edits.

Job category: {}
{}
The contractor changed a generated quote as follows:
{}"#,
        request.category,
        request
            .job_description
            .as_deref()
            .map(|d| format!("Job description: {}\n", d))
            .unwrap_or_default(),
        request.diff.summary()
    );

    if let Some(notes) = &request.contractor_notes {
        let _ = writeln!(prompt, "\nContractor notes: {}", notes);
    }
    if let Some(philosophy) = &request.philosophy {
        let _ = writeln!(prompt, "\nContractor pricing philosophy: {}", philosophy);
    }
    if let Some(guidance) = &request.tailored_guidance {
        let _ = writeln!(prompt, "\nGuidance for this category: {}", guidance);
    }
    if !request.existing_statements.is_empty() {
        let _ = writeln!(prompt, "\nRules already learned (do not repeat them):");
        for statement in &request.existing_statements {
            let _ = writeln!(prompt, "- {}", statement);
        }
    }
    if !request.rejection_feedback.is_empty() {
        let _ = writeln!(
            prompt,
            "\nYour previous answer was rejected. Fix these problems:"
        );
        for feedback in &request.rejection_feedback {
            let _ = writeln!(
                prompt,
                "- \"{}\" scored {}/100: {}",
                feedback.statement,
                feedback.score,
                feedback.issues.join("; ")
            );
        }
    }

    prompt.push_str(
        r#"
Write 1-3 pricing rules this edit teaches. Each rule must be one sentence,
30-200 characters, start with an action verb, and name a concrete amount,
percentage or unit. No hedging and no generic advice.

Format your response EXACTLY as:
STATEMENT: <rule>
STATEMENT: <rule>
"#,
    );
    prompt
}

/// Pull `STATEMENT:` lines out of a model response
pub fn parse_statements(response: &str) -> Vec<String> {
    response
        .lines()
        .filter_map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c == '-' || c == '*' || c.is_ascii_digit() || c == '.')
                .trim()
                .strip_prefix("STATEMENT:")
        })
        .map(|s| s.trim().trim_matches('"').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
