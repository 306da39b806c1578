pub mod climate;
pub mod config;
pub mod engine;
pub mod error;
pub mod household;
pub mod population;
pub mod replicate;
pub mod response;
pub mod rng;
pub mod scenario;
pub mod snapshot;
pub mod systems;
pub mod vital_rates;
pub mod world;

pub use config::{LandConstraintMode, ModelParameters};
pub use engine::{Engine, EngineBuilder, EngineSettings};
pub use error::{ConfigError, EngineError, ReplicateError, SimulationError};
pub use scenario::{Scenario, ScenarioLoader};
pub use snapshot::{PopulationSnapshot, TimeSeries};
pub use world::World;
