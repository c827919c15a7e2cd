//! Agent layer - roles, tools, and the turn runner
//!
//! This crate provides the conversational brain of skydesk:
//! - Chat protocol types and the pluggable LLM client (`transcript`, `llm`)
//! - The domain tools operating on the traveler context (`tools`)
//! - Agent role definitions and the handoff graph (`roster`)
//! - The per-turn loop dispatching tool calls and handoffs (`runner`)
//!
//! # Architecture
//!
//! One user message is handled as a *turn*:
//! 1. The runner renders the current agent (instructions + tools + transfer
//!    tools) into a chat request over the session transcript.
//! 2. The model either answers in text, calls a domain tool, or calls a
//!    transfer tool.
//! 3. Tool output is appended to the transcript and the loop continues;
//!    a transfer switches which agent serves the next model call; text ends
//!    the turn.
//!
//! # Key Types
//!
//! - `TurnRunner` - the per-turn loop (see `runner` module)
//! - `LlmClient` - pluggable trait over chat-completions backends
//! - `Tool` / `ToolRegistry` - structured callables over the traveler context
//! - `AgentRoster` - the named role definitions and their handoff graph
//!
//! # Safety Principle
//!
//! The model never mutates the traveler context directly. Every write goes
//! through a registered tool, and tools validate their own preconditions.

pub mod llm;
pub mod roster;
pub mod runner;
pub mod tools;
pub mod transcript;
