//! Streaming: discrete levels loaded and unloaded on demand.
//!
//! # Invariants
//! - At most one level is loaded at a time; the previous level is fully
//!   unloaded before the next one starts loading.
//! - Only one transition is in flight; a second request is rejected.

mod level;
mod loader;
mod transition;

pub use level::{LevelCatalog, LevelIndex, LevelSpec, SpawnZone};
pub use loader::{SceneEvent, ScriptedSceneLoader};
pub use transition::{
    LevelTransition, SceneLoader, SceneOp, TransitionError, TransitionProgress, TransitionState,
};
