use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::{ChatRequest, LlmClient, LlmError, ToolSpec};
use crate::roster::{AgentDefinition, AgentRoster};
use crate::tools::ToolRegistry;
use crate::transcript::{ChatMessage, ChatSession, ToolCall};

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("agent `{0}` is not in the roster")]
    UnknownAgent(String),
    #[error("tool `{tool}` is not available to agent `{agent}`")]
    ToolNotAvailable { tool: String, agent: String },
    #[error("turn exceeded the budget of {0} model calls")]
    StepBudgetExhausted(u32),
}

/// Drives one conversation turn: renders the current agent into a chat
/// request, dispatches tool calls and handoffs, and returns the final
/// assistant text.
pub struct TurnRunner {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    roster: AgentRoster,
    max_steps_per_turn: u32,
}

impl TurnRunner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        roster: AgentRoster,
        max_steps_per_turn: u32,
    ) -> Self {
        Self { llm, tools, roster, max_steps_per_turn }
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    /// Handle one user message. May span several model calls when the model
    /// chains tool calls or transfers; the step budget bounds them.
    pub async fn run_turn(
        &self,
        session: &mut ChatSession,
        user_text: &str,
    ) -> Result<String, TurnError> {
        session.transcript.push(ChatMessage::user(user_text));

        for step in 0..self.max_steps_per_turn {
            let agent = self
                .roster
                .get(&session.current_agent)
                .ok_or_else(|| TurnError::UnknownAgent(session.current_agent.clone()))?;
            let request = self.build_request(agent, session)?;

            debug!(
                event_name = "agent.model_call",
                session_id = %session.session_id,
                agent = %agent.name,
                step,
                messages = request.messages.len(),
                "sending chat request"
            );

            let outcome = self.llm.chat(&request).await?;

            if !outcome.tool_calls.is_empty() {
                session
                    .transcript
                    .push(ChatMessage::assistant_tool_calls(outcome.tool_calls.clone()));
                for call in &outcome.tool_calls {
                    self.dispatch_tool_call(session, call).await?;
                }
                continue;
            }

            if let Some(text) = outcome.text {
                session.transcript.push(ChatMessage::assistant(text.as_str()));
                return Ok(text);
            }

            return Err(TurnError::Llm(LlmError::EmptyResponse));
        }

        Err(TurnError::StepBudgetExhausted(self.max_steps_per_turn))
    }

    async fn dispatch_tool_call(
        &self,
        session: &mut ChatSession,
        call: &ToolCall,
    ) -> Result<(), TurnError> {
        if let Some(target) = self.roster.resolve_handoff(&call.name) {
            let target_name = target.name.clone();
            let allowed = self
                .roster
                .get(&session.current_agent)
                .map(|agent| agent.handoffs.contains(&target_name))
                .unwrap_or(false);
            if !allowed {
                return Err(TurnError::ToolNotAvailable {
                    tool: call.name.clone(),
                    agent: session.current_agent.clone(),
                });
            }
            info!(
                event_name = "agent.handoff",
                session_id = %session.session_id,
                from = %session.current_agent,
                to = %target_name,
                "conversation transferred"
            );
            session.current_agent = target_name.clone();
            session
                .transcript
                .push(ChatMessage::tool(call.id.as_str(), format!("Transferred to {target_name}.")));
            return Ok(());
        }

        let allowed = self
            .roster
            .get(&session.current_agent)
            .map(|agent| agent.tools.iter().any(|tool| tool == &call.name))
            .unwrap_or(false);
        if !allowed {
            return Err(TurnError::ToolNotAvailable {
                tool: call.name.clone(),
                agent: session.current_agent.clone(),
            });
        }

        match self.tools.dispatch(&call.name, &mut session.context, call.arguments.clone()).await
        {
            Ok(output) => {
                info!(
                    event_name = "agent.tool_call",
                    session_id = %session.session_id,
                    agent = %session.current_agent,
                    tool = %call.name,
                    "tool executed"
                );
                session.transcript.push(ChatMessage::tool(call.id.as_str(), output));
            }
            Err(error) => {
                // Fed back to the model as tool output; one failed call
                // degrades the turn instead of ending the session.
                warn!(
                    event_name = "agent.tool_error",
                    session_id = %session.session_id,
                    agent = %session.current_agent,
                    tool = %call.name,
                    error = %error,
                    "tool execution failed"
                );
                session
                    .transcript
                    .push(ChatMessage::tool(call.id.as_str(), format!("Tool error: {error}")));
            }
        }

        Ok(())
    }

    fn build_request(
        &self,
        agent: &AgentDefinition,
        session: &ChatSession,
    ) -> Result<ChatRequest, TurnError> {
        let mut messages = Vec::with_capacity(session.transcript.len() + 1);
        messages.push(ChatMessage::system(format!(
            "{}\n\nCurrent traveler record: {}",
            agent.system_prompt(),
            session.context.summary()
        )));
        messages.extend(session.transcript.messages().iter().cloned());

        let mut tools = Vec::with_capacity(agent.tools.len() + agent.handoffs.len());
        for name in &agent.tools {
            let tool = self.tools.get(name).ok_or_else(|| TurnError::ToolNotAvailable {
                tool: name.clone(),
                agent: agent.name.clone(),
            })?;
            tools.push(ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            });
        }
        for target_name in &agent.handoffs {
            let target = self
                .roster
                .get(target_name)
                .ok_or_else(|| TurnError::UnknownAgent(target_name.clone()))?;
            tools.push(ToolSpec {
                name: AgentRoster::handoff_tool_name(&target.name),
                description: format!(
                    "Transfer the conversation to {}. {}",
                    target.name, target.handoff_description
                ),
                parameters: json!({ "type": "object", "properties": {} }),
            });
        }

        Ok(ChatRequest { messages, tools })
    }
}
