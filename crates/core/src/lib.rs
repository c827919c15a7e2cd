//! Skydesk core - configuration and shared conversation state
//!
//! This crate holds the pieces every other crate depends on:
//! - `config` - layered configuration (defaults, `skydesk.toml`, `SKYDESK_*`
//!   environment overrides, CLI overrides) with validation and secret
//!   handling
//! - `context` - the traveler record threaded through a chat session and
//!   mutated by tool calls
//!
//! Nothing here performs network I/O; the LLM protocol and the agent loop
//! live in `skydesk-agent`.

pub mod config;
pub mod context;

pub use config::{
    AppConfig, ChatConfig, ConfigError, ConfigOverrides, LlmConfig, LlmProvider, LoadOptions,
    LogFormat, LoggingConfig,
};
pub use context::TravelerContext;
