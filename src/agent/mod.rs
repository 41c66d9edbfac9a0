//! Language-model collaborator.
//!
//! This module provides the chat client, transcripts, prompts and the retry
//! policy shared with the search client.

pub mod client;
pub mod conversation;
pub mod prompts;
pub mod retry;

pub use client::{ChatModel, ClientConfig, ModelError, OllamaClient};
pub use conversation::{ask_once, strip_code_fence, Conversation};
pub use prompts::PromptSet;
