//! Shared value types for the spawnworld crates.
//!
//! # Invariants
//! - `ShapeKey` is fixed at creation; nothing mutates it afterwards.
//! - `EntityId` identifies an instance across pool reuse.

mod types;

pub use types::{Color, EntityId, ShapeKey, Transform};
