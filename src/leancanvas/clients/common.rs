//! Shared plumbing for OpenAI-compatible clients.

use crate::leancanvas::client_wrapper::{ClientError, Message, TokenUsage};
use lazy_static::lazy_static;
use openai_rust::chat;
use openai_rust2 as openai_rust;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    /// One pooled HTTP client for every model request in the process.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(300))
        .build()
        .unwrap_or_else(|e| {
            log::warn!("leancanvas::clients::common: falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        });
}

pub fn get_shared_http_client() -> &'static reqwest::Client {
    &SHARED_HTTP_CLIENT
}

/// Error returned by the upstream model API.
#[derive(Debug, Clone)]
pub struct UpstreamError(pub String);

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model API error: {}", self.0)
    }
}

impl std::error::Error for UpstreamError {}

pub fn to_chat_messages(messages: &[Message]) -> Vec<chat::Message> {
    messages
        .iter()
        .map(|msg| chat::Message {
            role: msg.role.as_str().to_owned(),
            content: msg.content.clone(),
        })
        .collect()
}

/// Send a chat request, record its usage, and return the assistant's content.
pub async fn send_and_track(
    api: &openai_rust::Client,
    model: &str,
    messages: &[Message],
    url_path: Option<String>,
    usage_slot: &Mutex<Option<TokenUsage>>,
) -> Result<String, ClientError> {
    let chat_arguments = chat::ChatArguments::new(model, to_chat_messages(messages));

    let response = api.create_chat(chat_arguments, url_path).await.map_err(|err| {
        log::error!(
            "leancanvas::clients::common::send_and_track(...): API error: {}",
            err
        );
        UpstreamError(err.to_string())
    })?;

    let usage = TokenUsage {
        input_tokens: response.usage.prompt_tokens as usize,
        output_tokens: response.usage.completion_tokens as usize,
        total_tokens: response.usage.total_tokens as usize,
    };
    if let Ok(mut slot) = usage_slot.lock() {
        *slot = Some(usage);
    }

    response
        .choices
        .first()
        .map(|choice| choice.message.content.clone())
        .ok_or_else(|| UpstreamError("response contained no choices".to_string()).into())
}
