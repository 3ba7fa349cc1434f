//! Wrapping an [`Agent`] as a workflow executor
//!
//! Orchestrators dispatch work to participants as [`AgentDispatch`]
//! messages; the wrapped agent's reply travels back as an [`AgentReply`].
//! Reply fragments are also streamed to the caller as
//! `AgentRunUpdate` events so front-ends can render partial progress.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use agentflow_core::executor::{handler, Executor, HandlerMap};
use agentflow_core::messages::{Agent, ChatMessage};

/// A unit of work sent to a participant executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDispatch {
    /// The conversation so far
    pub conversation: Vec<ChatMessage>,
    /// Optional instruction appended for this turn (Magentic ledger
    /// instructions; group chat sends the bare conversation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

/// A participant's reply, routed back to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    /// Name of the replying participant
    pub participant: String,
    /// Messages the participant produced, authored under its name
    pub messages: Vec<ChatMessage>,
}

/// An executor that delegates each dispatch to a wrapped [`Agent`]
///
/// The executor's ID is the participant name, which makes participant
/// membership part of the workflow's graph signature: renaming a
/// participant invalidates old checkpoints.
pub struct AgentExecutor {
    id: String,
    handlers: HandlerMap,
}

impl AgentExecutor {
    /// Wrap an agent under its own name
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        let id = agent.name().to_string();
        let participant = id.clone();
        let mut handlers = HandlerMap::new();
        handlers.insert(
            handler::<AgentDispatch, _, _>(move |dispatch, ctx| {
                let agent = Arc::clone(&agent);
                let participant = participant.clone();
                async move {
                    let mut conversation = dispatch.conversation;
                    if let Some(instruction) = dispatch.instruction {
                        conversation.push(ChatMessage::user(instruction));
                    }

                    let response = agent.run(&conversation).await?;
                    let messages: Vec<ChatMessage> = response
                        .messages
                        .into_iter()
                        .map(|message| match message.author_name {
                            Some(_) => message,
                            None => message.with_author(participant.clone()),
                        })
                        .collect();

                    for message in &messages {
                        ctx.agent_update(message.text.clone());
                    }

                    ctx.send_message(AgentReply {
                        participant: participant.clone(),
                        messages,
                    })
                    .await
                }
            })
            .with_output::<AgentReply>(),
        );
        Self { id, handlers }
    }
}

impl Executor for AgentExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn handlers(&self) -> &HandlerMap {
        &self.handlers
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubAgent;
    use super::*;
    use agentflow_core::message::{Message, TypedData};
    use agentflow_core::runner_context::RunnerContext;
    use agentflow_core::shared_state::SharedState;

    #[tokio::test]
    async fn test_dispatch_produces_authored_reply() {
        let executor = AgentExecutor::new(StubAgent::new("alpha", "hello from alpha"));
        assert_eq!(executor.id(), "alpha");

        let runner = RunnerContext::new();
        let dispatch = AgentDispatch {
            conversation: vec![ChatMessage::user("task")],
            instruction: None,
        };
        executor
            .execute(
                Message::new(TypedData::new(&dispatch).unwrap(), "orchestrator"),
                vec!["orchestrator".into()],
                SharedState::new(),
                runner.clone(),
            )
            .await
            .unwrap();

        let sent = runner.drain_messages();
        assert_eq!(sent.len(), 1);
        let reply: AgentReply = sent[0].data.decode().unwrap();
        assert_eq!(reply.participant, "alpha");
        assert_eq!(reply.messages[0].text, "hello from alpha");
        assert_eq!(reply.messages[0].author_name.as_deref(), Some("alpha"));
    }

    #[tokio::test]
    async fn test_instruction_is_appended_as_user_turn() {
        struct EchoLast;
        #[async_trait::async_trait]
        impl Agent for EchoLast {
            fn name(&self) -> &str {
                "echo"
            }
            async fn run(
                &self,
                messages: &[ChatMessage],
            ) -> agentflow_core::error::Result<agentflow_core::messages::AgentRunResponse> {
                Ok(agentflow_core::messages::AgentRunResponse::from_text(
                    messages.last().unwrap().text.clone(),
                ))
            }
        }

        let executor = AgentExecutor::new(Arc::new(EchoLast));
        let runner = RunnerContext::new();
        let dispatch = AgentDispatch {
            conversation: vec![ChatMessage::user("conversation")],
            instruction: Some("do the thing".into()),
        };
        executor
            .execute(
                Message::new(TypedData::new(&dispatch).unwrap(), "orchestrator"),
                vec!["orchestrator".into()],
                SharedState::new(),
                runner.clone(),
            )
            .await
            .unwrap();

        let reply: AgentReply = runner.drain_messages()[0].data.decode().unwrap();
        assert_eq!(reply.messages[0].text, "do the thing");
    }
}
