//! LLM provider abstraction and backend adapters.

pub mod any;
pub mod cache;
pub mod claude;
pub mod compatible;
pub mod error;
pub mod gemini;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod openrouter;
pub mod provider;
pub mod registry;
#[cfg(test)]
mod testing;

pub use any::AnyProvider;
pub use error::LlmError;
pub use provider::LlmProvider;
pub use registry::ProviderRegistry;
