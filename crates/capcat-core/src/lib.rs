pub mod batch;
pub mod behavior;
pub mod circuit_breaker;
pub mod config;
pub mod content;
pub mod dedup;
pub mod discovery;
pub mod error;
pub mod feed_discovery;
pub mod feed_parser;
pub mod models;
pub mod output;
pub mod rate_limiter;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod update;

pub use batch::{BatchProcessor, BatchRequest};
pub use behavior::{DiscoveryOutcome, SourceBehavior};
pub use config::Config;
pub use content::{ContentFetcher, SpecializedHandler, SpecializedHandlerRegistry};
pub use error::{CapcatError, ErrorKind, Result};
pub use models::{
    Article, Bundle, CircuitState, DiscoverySpec, FeedItem, RateLimitSpec, RssUrls, RunSummary,
    SkipRecord, SourceDescriptor, SourceKind, SourceSummary,
};
pub use output::{sanitize_filename, OutputLayout};
pub use registry::SourceRegistry;
pub use runtime::Runtime;
pub use update::UpdateController;
