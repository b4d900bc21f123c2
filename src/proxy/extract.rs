//! Request/response field extraction for the proxy pipeline.
//!
//! Everything here parses only the minimal fields the gateway needs;
//! unknown fields pass through untouched in the forwarded body.

use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::recorder::Tokens;

/// The minimal OpenAI-shaped request the gateway needs to understand.
/// Parse failures leave the default in place; the body is still forwarded.
#[derive(Debug, Default, Deserialize)]
pub struct MinimalRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Option<Value>,
    #[serde(default)]
    pub stream: bool,
}

impl MinimalRequest {
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }
}

/// Known LLM providers, inferred from the model name or provider URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Mistral,
    Meta,
    DeepSeek,
    Xai,
    Cohere,
    Alibaba,
    Groq,
    Together,
    Fireworks,
    Unknown,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Mistral => "mistral",
            Provider::Meta => "meta",
            Provider::DeepSeek => "deepseek",
            Provider::Xai => "xai",
            Provider::Cohere => "cohere",
            Provider::Alibaba => "alibaba",
            Provider::Groq => "groq",
            Provider::Together => "together",
            Provider::Fireworks => "fireworks",
            Provider::Unknown => "unknown",
        }
    }
}

/// Infer the provider from model-name prefixes, falling back to host
/// substrings of the provider URL.
pub fn infer_provider(model: &str, provider_url: &str) -> Provider {
    let model = model.to_lowercase();

    let prefixes: &[(&[&str], Provider)] = &[
        (&["gpt", "o1", "o3", "chatgpt", "dall-e"], Provider::OpenAi),
        (&["claude"], Provider::Anthropic),
        (&["gemini"], Provider::Google),
        (
            &["mistral", "mixtral", "codestral", "pixtral"],
            Provider::Mistral,
        ),
        (&["llama", "meta-llama"], Provider::Meta),
        (&["deepseek"], Provider::DeepSeek),
        (&["grok"], Provider::Xai),
        (&["command", "embed-", "rerank-"], Provider::Cohere),
        (&["qwen"], Provider::Alibaba),
    ];

    for (names, provider) in prefixes {
        if names.iter().any(|p| model.starts_with(p)) {
            return *provider;
        }
    }

    if provider_url.contains("openai.com") {
        Provider::OpenAi
    } else if provider_url.contains("anthropic.com") {
        Provider::Anthropic
    } else if provider_url.contains("groq.com") {
        Provider::Groq
    } else if provider_url.contains("together.xyz") || provider_url.contains("together.ai") {
        Provider::Together
    } else if provider_url.contains("fireworks.ai") {
        Provider::Fireworks
    } else {
        Provider::Unknown
    }
}

/// Derive the session identifier: `X-Session-ID` header, else a stable
/// hash of the Authorization header, else "anonymous".
pub fn extract_session_id(headers: &HeaderMap) -> String {
    if let Some(sid) = headers.get("x-session-id").and_then(|v| v.to_str().ok()) {
        if !sid.is_empty() {
            return sid.to_string();
        }
    }

    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if !auth.is_empty() {
            let digest = Sha256::digest(auth.as_bytes());
            return format!("auth_{}", hex::encode(&digest[..8]));
        }
    }

    "anonymous".to_string()
}

/// Pull the last user message content from the messages array. Content may
/// be a plain string or an array of typed parts.
pub fn extract_prompt_text(messages: Option<&Value>) -> String {
    let Some(list) = messages.and_then(Value::as_array) else {
        return String::new();
    };

    for msg in list.iter().rev() {
        if msg.get("role").and_then(Value::as_str) != Some("user") {
            continue;
        }
        let Some(content) = msg.get("content") else {
            continue;
        };

        if let Some(text) = content.as_str() {
            return text.to_string();
        }

        if let Some(parts) = content.as_array() {
            for part in parts {
                if part.get("type").and_then(Value::as_str) == Some("text") {
                    if let Some(text) = part.get("text").and_then(Value::as_str) {
                        return text.to_string();
                    }
                }
            }
        }
    }

    String::new()
}

/// Pull tool/function names from the request body.
pub fn extract_tool_names(body: &[u8]) -> Vec<String> {
    #[derive(Deserialize)]
    struct ToolsOnly {
        #[serde(default)]
        tools: Vec<ToolEntry>,
    }
    #[derive(Deserialize)]
    struct ToolEntry {
        #[serde(default)]
        function: FunctionEntry,
    }
    #[derive(Default, Deserialize)]
    struct FunctionEntry {
        #[serde(default)]
        name: String,
    }

    let Ok(parsed) = serde_json::from_slice::<ToolsOnly>(body) else {
        return Vec::new();
    };

    parsed
        .tools
        .into_iter()
        .map(|t| t.function.name)
        .filter(|name| !name.is_empty())
        .collect()
}

#[derive(Debug, Deserialize)]
struct UsageBody {
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl From<Usage> for Tokens {
    fn from(u: Usage) -> Self {
        Tokens {
            prompt: u.prompt_tokens,
            completion: u.completion_tokens,
            total: u.total_tokens,
        }
    }
}

/// Parse OpenAI-shape `usage` from a buffered response body.
pub fn parse_usage(body: &[u8]) -> Option<Tokens> {
    let parsed: UsageBody = serde_json::from_slice(body).ok()?;
    parsed.usage.map(Tokens::from)
}

/// Extract token usage from a captured SSE stream: walk the `data:` lines
/// from the tail and take the first chunk carrying a `usage` field,
/// skipping `[DONE]`. Providers include usage in the final data chunk when
/// `stream_options.include_usage` is set.
pub fn extract_stream_tokens(data: &[u8]) -> Tokens {
    let text = String::from_utf8_lossy(data);

    for line in text.lines().rev() {
        let line = line.trim();
        let Some(payload) = line.strip_prefix("data: ") else {
            continue;
        };
        if payload == "[DONE]" {
            continue;
        }
        if let Ok(chunk) = serde_json::from_str::<UsageBody>(payload) {
            if let Some(usage) = chunk.usage {
                return usage.into();
            }
        }
    }

    Tokens::default()
}
