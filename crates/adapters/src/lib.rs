mod assets;
mod base_url;
mod cloud;
mod companion;
mod error;
mod local;
mod openai;
mod orchestrator;
mod pipeline;
mod providers;
mod retry;

pub use assets::DirectoryAssetStore;
pub use base_url::{api_base_url, check_base_url, service_url};
pub use cloud::cloud_triple;
pub use companion::companion_triple;
pub use error::{classify, AdapterError, ProviderError, ProviderErrorKind};
pub use local::local_triple;
pub use orchestrator::{GenerationOrchestrator, OrchestratorError, ProviderFactory, StoryOutcome};
pub use pipeline::{PipelineError, PipelineOptions, StoryPackage, StoryPipeline};
pub use providers::HttpProviderFactory;
pub use retry::{ProviderAttemptResult, RetryConfig, RetryExecutor};
