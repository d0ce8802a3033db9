//! LLM provider abstraction layer
//!
//! Provider-agnostic chat-completion interface used by crew agents, with an
//! OpenAI backend.

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;
