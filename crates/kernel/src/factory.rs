use rand::{Rng, RngCore};
use spawnworld_common::ShapeKey;
use std::collections::HashMap;

use crate::entity::Entity;

/// Source and sink of pooled entities.
pub trait EntityFactory {
    /// An entity of the given kind and variant.
    fn create(&mut self, key: ShapeKey) -> Entity;

    /// An entity of a randomly chosen kind and variant.
    fn create_random(&mut self, rng: &mut dyn RngCore) -> Entity;

    /// Take an entity back. The caller gives up ownership.
    fn reclaim(&mut self, entity: Entity);
}

/// Diagnostic counters for a [`ShapeFactory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactoryStats {
    pub instantiated: u64,
    pub reused: u64,
    pub reclaimed: u64,
}

/// Factory over `kind_count` shapes and `variant_count` materials, with one
/// recycle pool per kind.
#[derive(Debug)]
pub struct ShapeFactory {
    kind_count: i32,
    variant_count: i32,
    recycle: bool,
    pools: HashMap<i32, Vec<Entity>>,
    stats: FactoryStats,
}

impl ShapeFactory {
    pub fn new(kind_count: i32, variant_count: i32, recycle: bool) -> Self {
        Self {
            kind_count: kind_count.max(1),
            variant_count: variant_count.max(1),
            recycle,
            pools: HashMap::new(),
            stats: FactoryStats::default(),
        }
    }

    pub fn stats(&self) -> FactoryStats {
        self.stats
    }

    /// Entities waiting in the pools.
    pub fn pooled(&self) -> usize {
        self.pools.values().map(Vec::len).sum()
    }
}

impl EntityFactory for ShapeFactory {
    fn create(&mut self, key: ShapeKey) -> Entity {
        if self.recycle {
            if let Some(mut entity) = self.pools.get_mut(&key.kind).and_then(Vec::pop) {
                entity.reissue(key);
                self.stats.reused += 1;
                tracing::trace!(%key, id = ?entity.id(), "reused pooled entity");
                return entity;
            }
        }
        self.stats.instantiated += 1;
        Entity::new(key)
    }

    fn create_random(&mut self, rng: &mut dyn RngCore) -> Entity {
        let key = ShapeKey::new(
            rng.gen_range(0..self.kind_count),
            rng.gen_range(0..self.variant_count),
        );
        self.create(key)
    }

    fn reclaim(&mut self, entity: Entity) {
        self.stats.reclaimed += 1;
        if self.recycle {
            self.pools.entry(entity.kind()).or_default().push(entity);
        }
    }
}
