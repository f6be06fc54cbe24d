// LLM abstraction layer

pub mod anthropic;
pub mod generation;
pub mod openai;
pub mod provider;

pub use generation::{Generation, GenerationClient, GenerationRequest};
pub use provider::*;
