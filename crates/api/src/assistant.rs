//! Conversational wellness assistant backed by a chat-completions API

use crate::config::AssistantConfig;
use report::{dashboard_summary, fatigue_hotspot_hour, ReportError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use storage::Repository;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Reply when the model returns nothing usable
pub const BLOCKED_REPLY: &str =
    "I'm sorry, I couldn't generate a response for that. It may have triggered my safety filters.";

/// Reply when the model cannot be reached
pub const UNAVAILABLE_REPLY: &str =
    "Sorry, I'm having trouble connecting to the AI service right now. Please try again later.";

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("assistant has no API key")]
    NotConfigured,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("could not load user context: {0}")]
    Context(#[from] ReportError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Rolling transcript of `User: ...` / `AI: ...` lines
#[derive(Debug)]
pub struct ChatHistory {
    lines: VecDeque<String>,
    limit: usize,
}

impl ChatHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(limit + 1),
            limit: limit.max(1),
        }
    }

    pub fn push_user(&mut self, message: &str) {
        self.push(format!("User: {message}"));
    }

    pub fn push_ai(&mut self, reply: &str) {
        self.push(format!("AI: {reply}"));
    }

    fn push(&mut self, line: String) {
        self.lines.push_back(line);
        while self.lines.len() > self.limit {
            self.lines.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn render(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Numbers the prompt may mention
#[derive(Debug, Clone, PartialEq)]
pub struct UserContext {
    pub user_name: String,
    pub avg_bpm: u32,
    pub health_score: u32,
    /// "HH:00", or "Not enough data"
    pub fatigue_hotspot: String,
}

impl UserContext {
    pub async fn gather(repo: &Repository) -> Result<Self, ReportError> {
        let user_name = repo
            .get_settings()
            .await?
            .map(|s| s.user_name)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "friend".to_string());

        let summary = dashboard_summary(repo, chrono::Local::now().date_naive()).await?;
        let fatigue_hotspot = fatigue_hotspot_hour(&summary.fatigue_hotspots)
            .map_or_else(|| "Not enough data".to_string(), |h| format!("{h:02}:00"));

        Ok(Self {
            user_name,
            avg_bpm: summary.avg_blink_rate,
            health_score: summary.health_score,
            fatigue_hotspot,
        })
    }
}

pub fn build_prompt(history: &str, message: &str, ctx: &UserContext) -> String {
    let name = &ctx.user_name;
    format!(
        r#"You are DrishtiAI, a gentle and supportive wellness companion. Your user's name is {name}.

Core Identity:
- You ARE DrishtiAI. Do not introduce yourself in every message. Assume the user knows who you are.
- Your tone is always warm, empathetic, and kind, like a caring friend.
- You can answer general knowledge questions, but gently guide the conversation back to wellness, well-being, or eye health.

This is the recent conversation history:
{history}

User's NEW Message: "{message}"

Context Data (Only use if relevant to the conversation):
- Average Blink Rate: {bpm} BPM
- Screen Health Score: {score}/100
- Common Fatigue Time: {hotspot}

Behavior Rules:
- If the user sounds stressed or tired, respond with calming and reassuring words. Offer a simple breathing exercise.
- If the user sounds happy, match their energy with light, encouraging, and slightly playful support.
- If the user asks a factual question that is not about wellness, answer it concisely and accurately, then gently pivot back to their well-being or offer a wellness tip.
- If the message is unclear, gibberish, or just a greeting, respond with a gentle check-in.
- Never respond to unclear messages by re-introducing yourself.
- Be concise. Keep your replies to 2-3 short sentences.
- Avoid using the user's name ({name}) repeatedly; only use it at the start of a conversation or in emotionally significant moments."#,
        bpm = ctx.avg_bpm,
        score = ctx.health_score,
        hotspot = ctx.fatigue_hotspot,
    )
}

/// Assistant with a single shared conversation
pub struct Assistant {
    config: AssistantConfig,
    client: reqwest::Client,
    history: Mutex<ChatHistory>,
}

impl Assistant {
    pub fn new(config: AssistantConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let history = Mutex::new(ChatHistory::new(config.history_limit));
        Self {
            config,
            client,
            history,
        }
    }

    pub fn is_available(&self) -> bool {
        self.api_key().is_some()
    }

    fn api_key(&self) -> Option<&str> {
        self.config.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    /// Answer `message`, remembering both sides of the exchange
    pub async fn reply(&self, repo: &Repository, message: &str) -> Result<String, AssistantError> {
        let api_key = self.api_key().ok_or(AssistantError::NotConfigured)?;

        let mut history = self.history.lock().await;
        history.push_user(message);
        let ctx = UserContext::gather(repo).await?;
        let prompt = build_prompt(&history.render(), message, &ctx);

        let content = self.complete(api_key, prompt).await?;
        let reply = match content {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                error!("Assistant response was blocked or empty");
                BLOCKED_REPLY.to_string()
            }
        };

        history.push_ai(&reply);
        Ok(reply)
    }

    async fn complete(&self, api_key: &str, prompt: String) -> Result<Option<String>, AssistantError> {
        let url = format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [ChatMessage { role: "user".into(), content: prompt }],
            "stream": false,
        });

        debug!("Sending chat request to {}", url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AssistantError::HttpStatus { status, body });
        }

        let parsed: ChatResponse = resp.json().await?;
        Ok(parsed.choices.into_iter().next().map(|c| c.message.content))
    }
}
