//! Screenshot-to-solution pipeline: configuration, task classification, response
//! normalization and the orchestrator that drives a provider.

pub mod classifier;
pub mod config;
pub mod config_watcher;
pub mod content;
pub mod error;
pub mod normalizer;
pub mod orchestrator;
pub mod prompts;
pub mod secret;

pub use config::Config;
pub use content::{ContentKind, DebugResult, ExtractedContent, Screenshot, SolutionResult};
pub use error::PipelineError;
pub use orchestrator::{Orchestrator, PipelineEvent, PipelineState};
