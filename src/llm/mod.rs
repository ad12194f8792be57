//! LLM integration module.
//!
//! Provides an OpenAI-compatible client for the judge model and
//! the instruction it is given.

mod client;
mod prompts;

pub use client::{LlmClient, LlmResponse, Message, Role, TokenUsage};
pub use prompts::Prompts;
