//! [`ClientWrapper`] for OpenAI's Chat Completions API and compatible endpoints.
//!
//! The canvas backend points this at whatever provider `AI_BASE_URL` names, using the model
//! id from `AI_MODEL`.
//!
//! ```rust,no_run
//! use leancanvas::client_wrapper::{ClientWrapper, Message};
//! use leancanvas::clients::openai::OpenAIClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let key = std::env::var("AI_API_KEY")?;
//!     let client = OpenAIClient::new_with_model_string(&key, "gpt-4.1-mini");
//!     let reply = client
//!         .send_message(&[Message::system("You are terse."), Message::user("Hello!")])
//!         .await?;
//!     println!("{}", reply.content);
//!     Ok(())
//! }
//! ```

use crate::leancanvas::client_wrapper::{ClientError, ClientWrapper, Message, TokenUsage};
use crate::leancanvas::clients::common::{get_shared_http_client, send_and_track};
use async_trait::async_trait;
use openai_rust2 as openai_rust;
use std::sync::Mutex;

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

pub struct OpenAIClient {
    client: openai_rust::Client,
    model: String,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        OpenAIClient {
            client: openai_rust::Client::new_with_client(
                secret_key,
                get_shared_http_client().clone(),
            ),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        }
    }

    /// Target an OpenAI-compatible deployment at `base_url`.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        OpenAIClient {
            client: openai_rust::Client::new_with_client_and_base_url(
                secret_key,
                get_shared_http_client().clone(),
                base_url,
            ),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_message(&self, messages: &[Message]) -> Result<Message, ClientError> {
        let content = send_and_track(
            &self.client,
            &self.model,
            messages,
            Some(CHAT_COMPLETIONS_PATH.to_string()),
            &self.token_usage,
        )
        .await?;
        Ok(Message::assistant(content))
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_model_name() {
        let client = OpenAIClient::new_with_base_url("sk-test", "llama-3.1-8b", "http://localhost:1");
        assert_eq!(client.model_name(), "llama-3.1-8b");
        assert!(client.get_last_usage().is_none());
    }
}
