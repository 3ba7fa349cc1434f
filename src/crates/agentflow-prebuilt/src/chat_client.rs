//! Minimal chat-client seam for prompt-driven managers
//!
//! Model-client implementations are out of scope for this workspace; the
//! [`StandardMagenticManager`](crate::magentic::StandardMagenticManager)
//! only needs something that turns a conversation into one reply. Any
//! provider adapter (or a scripted stub in tests) implements [`ChatClient`].

use async_trait::async_trait;

use agentflow_core::messages::ChatMessage;

use crate::error::Result;

/// A chat completion client: conversation in, one assistant message out
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Produce the model's reply to the conversation
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatMessage>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Scripted client replaying canned replies in order
    pub struct ScriptedChatClient {
        replies: Mutex<Vec<String>>,
    }

    impl ScriptedChatClient {
        pub fn new(replies: Vec<&str>) -> Self {
            let mut replies: Vec<String> = replies.into_iter().map(str::to_string).collect();
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedChatClient {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<ChatMessage> {
            let reply = self
                .replies
                .lock()
                .expect("scripted replies lock")
                .pop()
                .unwrap_or_else(|| "out of scripted replies".to_string());
            Ok(ChatMessage::assistant(reply))
        }
    }
}
