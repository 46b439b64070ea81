//! Savor Library
//!
//! This library contains all the core modules for the Savor search service.

use std::sync::Arc;

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use services::llm::{LlmError, ScenarioRunner};
pub use services::{
    AssistantStage, JobStore, LandmarkRegistry, ProviderStage, RouteMapper, SearchOrchestrator,
    StaleSweeper, TicketIssuer, TieredCache, WsHub,
};

/// Application shared state
///
/// One flat struct of Arc-wrapped services, assembled once in main() and
/// cloned per request by axum. Handlers only ever see this snapshot; the
/// orchestrator carries its own references to everything it drives.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,

    pub store: Arc<dyn JobStore>,
    pub hub: Arc<WsHub>,
    pub tickets: Arc<TicketIssuer>,
    pub orchestrator: Arc<SearchOrchestrator>,
}

#[cfg(test)]
mod tests;
