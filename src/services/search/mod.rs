//! Search pipeline
//!
//! The stage graph behind one request: gate and intent classification,
//! language resolution, parallel filter extraction, route mapping, the
//! provider call (or candidate-pool reuse), cuisine enforcement, local
//! filtering with relaxation, deterministic ranking, and response assembly.
//! The orchestrator owns the graph; everything else here is a stage it
//! drives.

pub mod assistant;
pub mod canonical;
pub mod landmarks;
pub mod language;
pub mod mapper;
pub mod orchestrator;
pub mod post_filter;
pub mod provider;
pub mod ranker;
pub mod requery;
pub mod response;

pub use assistant::AssistantStage;
pub use landmarks::LandmarkRegistry;
pub use mapper::RouteMapper;
pub use orchestrator::SearchOrchestrator;
pub use provider::ProviderStage;

use thiserror::Error;

use crate::models::ErrorCode;
use crate::services::job_store::StoreError;

/// Stage-fatal pipeline errors. Recoverable conditions (filter fallbacks,
/// enforcement failure, assistant failure) never surface here.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("route mapping failed: {0}")]
    MapperFailed(String),

    #[error("provider call failed: {0}")]
    ProviderFailed(String),

    #[error("search stage failed: {0}")]
    StageFailed(String),

    #[error("job store error: {0}")]
    Store(#[from] StoreError),
}

impl SearchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MapperFailed(_) => ErrorCode::MapperFailed,
            Self::ProviderFailed(_) => ErrorCode::ProviderFailed,
            Self::StageFailed(_) | Self::Store(_) => ErrorCode::SearchFailed,
        }
    }
}
