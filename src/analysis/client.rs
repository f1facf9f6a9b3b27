//! OpenAI-compatible chat completions client.
//!
//! Sends `POST {base_url}/v1/chat/completions` with a system message and a
//! user message made of the text part plus, for captures, the PNG inlined as
//! a `data:` URL.

use base64::Engine;
use log::debug;
use serde_json::{json, Value};
use std::{fs, path::Path, sync::OnceLock, time::Duration};

use super::{AnalysisCall, AnalysisError, AnalysisService};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 1024;
/// How much of an error body ends up in logs.
const ERROR_BODY_PREVIEW: usize = 512;

/// Blocking HTTP client. Call it from a blocking context (a plain thread or
/// `spawn_blocking`), never directly from async code.
pub struct ChatCompletionsClient {
    // Built on first use so construction never happens inside a runtime.
    http: OnceLock<reqwest::blocking::Client>,
}

impl Default for ChatCompletionsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatCompletionsClient {
    pub fn new() -> Self {
        Self {
            http: OnceLock::new(),
        }
    }

    fn http(&self) -> Result<&reqwest::blocking::Client, AnalysisError> {
        if let Some(client) = self.http.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("screenguard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| AnalysisError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(self.http.get_or_init(|| client))
    }
}

impl AnalysisService for ChatCompletionsClient {
    fn analyze(&self, call: &AnalysisCall<'_>) -> Result<String, AnalysisError> {
        if let Some(missing) = call.missing_setting() {
            return Err(AnalysisError::NotConfigured(missing));
        }

        let image_url = call.image.map(image_data_url).transpose()?;
        let payload = build_payload(
            &call.role.model,
            call.system_prompt(),
            call.user_text,
            image_url.as_deref(),
        );
        let url = completions_url(&call.config.base_url);
        debug!("POST {url} model={} image={}", call.role.model, image_url.is_some());

        let response = self
            .http()?
            .post(&url)
            .bearer_auth(call.config.api_key.trim())
            .json(&payload)
            .send()
            .map_err(|err| AnalysisError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| AnalysisError::Transport(format!("failed to read body: {err}")))?;

        if !status.is_success() {
            return Err(AnalysisError::Transport(format!(
                "HTTP {}: {}",
                status.as_u16(),
                preview(&body)
            )));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|err| AnalysisError::Transport(format!("invalid JSON response: {err}")))?;
        extract_reply(&value)
    }
}

pub fn completions_url(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim().trim_end_matches('/'))
}

pub fn build_payload(
    model: &str,
    system_prompt: &str,
    user_text: &str,
    image_url: Option<&str>,
) -> Value {
    let mut content = vec![json!({ "type": "text", "text": user_text })];
    if let Some(url) = image_url {
        content.push(json!({ "type": "image_url", "image_url": { "url": url } }));
    }

    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": content },
        ],
        "temperature": TEMPERATURE,
        "max_tokens": MAX_TOKENS,
    })
}

/// `choices[0].message.content`, which must be non-blank.
pub fn extract_reply(body: &Value) -> Result<String, AnalysisError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
        .ok_or(AnalysisError::EmptyReply)
}

fn image_data_url(path: &Path) -> Result<String, AnalysisError> {
    let bytes = fs::read(path).map_err(|source| AnalysisError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:image/png;base64,{encoded}"))
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_PREVIEW) {
        Some((index, _)) => &body[..index],
        None => body,
    }
}
