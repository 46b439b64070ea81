pub mod cache;
pub mod job_store;
pub mod llm;
pub mod places;
pub mod search;
pub mod ws_hub;

pub use cache::{MemoryKv, RedisKv, SharedKv, TieredCache};
pub use job_store::{JobStore, KvJobStore, MemoryJobStore, StaleSweeper};
pub use llm::{LlmClient, LlmError, ScenarioRunner};
pub use places::{GeocodeClient, PlacesClient, PlacesError, PlacesProvider};
pub use search::{
    AssistantStage, LandmarkRegistry, ProviderStage, RouteMapper, SearchError, SearchOrchestrator,
};
pub use ws_hub::{TicketIssuer, WsHub};
