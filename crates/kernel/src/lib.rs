//! Population kernel: owns the live entities, spawns and despawns them at
//! configured rates, switches levels, and saves/loads the whole population.
//!
//! # Invariants
//! - Every live entity is owned by exactly one place: the population or the factory.
//! - No entity is created or destroyed by the tick while a level transition is in flight.
//! - Save records are always written at [`SAVE_VERSION`]; every older version stays readable.

pub mod accumulator;
pub mod config;
pub mod entity;
pub mod factory;
pub mod spawner;

pub use accumulator::RateAccumulator;
pub use config::SpawnerConfig;
pub use entity::Entity;
pub use factory::{EntityFactory, FactoryStats, ShapeFactory};
pub use spawner::{PopulationEvent, SAVE_VERSION, SaveHeader, Spawner, inspect_header};

use spawnworld_persist::PersistError;
use spawnworld_stream::{LevelIndex, TransitionError};

/// Errors surfaced by the population controller.
#[derive(Debug, thiserror::Error)]
pub enum SpawnerError {
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("level {requested} out of range 1..={level_count}")]
    LevelOutOfRange { requested: i32, level_count: i32 },
    #[error("transition to {0} still in progress")]
    Busy(LevelIndex),
    #[error("invalid configuration: {0}")]
    Config(String),
}
