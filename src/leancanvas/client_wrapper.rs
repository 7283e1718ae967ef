//! Provider-neutral interface to a hosted chat model.
//!
//! A [`ClientWrapper`] sends a list of [`Message`]s and returns the assistant reply, either
//! whole or as a stream of [`MessageChunk`]s. It does not keep conversation state; the
//! agent network assembles the full message list for every call.

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::pin::Pin;
use std::sync::Mutex;

/// Speaker of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions and injected context.
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One piece of a streamed reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageChunk {
    pub content: String,
    /// Set on the last chunk (`"stop"`, `"length"`, ...).
    pub finish_reason: Option<String>,
}

/// Error type at the client seam.
pub type ClientError = Box<dyn Error + Send + Sync>;

pub type MessageChunkStream = Pin<Box<dyn Stream<Item = Result<MessageChunk, ClientError>> + Send>>;

#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Model identifier sent with every request.
    fn model_name(&self) -> &str;

    async fn send_message(&self, messages: &[Message]) -> Result<Message, ClientError>;

    /// Stream the reply. The default sends one request and yields the whole reply as a
    /// single final chunk.
    async fn send_message_stream(
        &self,
        messages: &[Message],
    ) -> Result<MessageChunkStream, ClientError> {
        let reply = self.send_message(messages).await?;
        let chunk = MessageChunk {
            content: reply.content,
            finish_reason: Some("stop".to_string()),
        };
        Ok(Box::pin(futures_util::stream::iter(vec![Ok(chunk)])))
    }

    /// Usage reported by the most recent `send_message` call.
    fn get_last_usage(&self) -> Option<TokenUsage> {
        self.usage_slot()
            .and_then(|slot| slot.lock().ok().and_then(|usage| usage.clone()))
    }

    /// Clients that track usage return their slot here.
    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    struct FixedClient;

    #[async_trait]
    impl ClientWrapper for FixedClient {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn send_message(&self, messages: &[Message]) -> Result<Message, ClientError> {
            Ok(Message::assistant(format!("{} message(s)", messages.len())))
        }
    }

    #[tokio::test]
    async fn default_stream_yields_whole_reply() {
        let client = FixedClient;
        let mut stream = client
            .send_message_stream(&[Message::system("ctx"), Message::user("hi")])
            .await
            .unwrap();
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk.content, "2 message(s)");
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
        assert!(stream.next().await.is_none());
        assert!(client.get_last_usage().is_none());
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::user("hello")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hello"}"#);
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }
}
