// Public modules
pub mod analysis;
pub mod assessor;
pub mod collectors;
pub mod commands;
pub mod config;
pub mod error;
pub mod extractor;
pub mod formats;
pub mod health;
pub mod io;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod publish;
pub mod scoring;
pub mod views;
pub mod workflow;

// Re-export commonly used types
pub use assessor::Assessor;
pub use collectors::{build_collectors, build_research_collectors, collect_all, dedup, Collector};
pub use commands::Command;
pub use config::{Config, KeywordsConfig, SourcesConfig};
pub use error::{CommandError, WeightsError, WorkflowError};
pub use extractor::EvidenceExtractor;
pub use formats::{FormatGenerator, Formats};
pub use io::RunPaths;
pub use llm::{GeminiClient, LlmClient, OpenAiClient};
pub use models::{Article, Candidate, CollectionMetadata};
pub use publish::{publish_all, DatabaseManager, Publisher};
pub use scoring::Weights;
pub use workflow::{Outcome, Stage, Workflow};

use tracing_subscriber::{fmt as tfmt, EnvFilter};

/// Log to stderr, filtered by `RUST_LOG` (default `info`)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tfmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
