//! Chat message types and the agent seam
//!
//! The orchestrators in `agentflow-prebuilt` drive conversations of
//! [`ChatMessage`]s between [`Agent`] implementations. The core crate owns
//! these types because workflows can be adapted into agents themselves via
//! [`Workflow::as_agent`](crate::workflow::Workflow::as_agent), closing the
//! loop: agents run inside workflows, and workflows present as agents.
//!
//! # Example
//!
//! ```rust
//! use agentflow_core::messages::{ChatMessage, Role};
//!
//! let conversation = vec![
//!     ChatMessage::system("You are terse."),
//!     ChatMessage::user("Summarize the report."),
//!     ChatMessage::assistant("Revenue up 4%.").with_author("analyst"),
//! ];
//! assert_eq!(conversation[2].author_name.as_deref(), Some("analyst"));
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The role of a chat message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// End-user input
    User,
    /// Model or agent output
    Assistant,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role
    pub role: Role,

    /// Display name of the author (participant or orchestrator name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,

    /// Message text
    pub text: String,
}

impl ChatMessage {
    /// Create a message with an explicit role
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            author_name: None,
            text: text.into(),
        }
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Set the author name
    pub fn with_author(mut self, author_name: impl Into<String>) -> Self {
        self.author_name = Some(author_name.into());
        self
    }
}

/// The result of one agent invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRunResponse {
    /// Messages the agent produced, in order
    pub messages: Vec<ChatMessage>,
}

impl AgentRunResponse {
    /// Build a response from produced messages
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    /// Build a single-message assistant response
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::assistant(text)],
        }
    }

    /// Concatenated text of all produced messages
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|message| message.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A conversational agent: the external collaborator the orchestrators drive
///
/// Model-client specifics are out of scope for the core; anything that can
/// turn a conversation into a reply can participate in a group chat or a
/// Magentic run.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The agent's display name (participant key in orchestrations)
    fn name(&self) -> &str;

    /// Short description used by planners when composing participant lists
    fn description(&self) -> &str {
        ""
    }

    /// Produce a reply to the conversation
    async fn run(&self, messages: &[ChatMessage]) -> Result<AgentRunResponse>;
}
