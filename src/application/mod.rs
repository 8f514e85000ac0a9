pub mod orchestrator;
pub mod registry;

pub use orchestrator::{BetDecision, CapitalSnapshot, EngineSnapshot, LineOrchestrator};
pub use registry::{RegistryError, StrategyRegistry};
