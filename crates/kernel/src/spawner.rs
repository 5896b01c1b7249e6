use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use spawnworld_common::{Color, EntityId, ShapeKey, Transform};
use spawnworld_persist::{GameDataReader, GameDataWriter, PersistError, Persistable, SaveStore};
use spawnworld_stream::{LevelIndex, LevelTransition, SceneLoader, SpawnZone, TransitionProgress};
use std::time::Duration;

use crate::accumulator::RateAccumulator;
use crate::config::SpawnerConfig;
use crate::entity::Entity;
use crate::factory::EntityFactory;
use crate::SpawnerError;

/// Version written by [`Spawner::save`].
///
/// Format history:
/// - v0: no marker; leading integer is the entity count, entities carry
///   transform only.
/// - v1: marker, count, then kind/variant ids and color per entity.
/// - v2: level index between the marker and the count.
pub const SAVE_VERSION: i32 = 2;

/// Leading fields of a save record, resolved across format versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveHeader {
    /// Effective format version; 0 for headerless records.
    pub version: i32,
    /// Stored level, or level 1 for records older than v2.
    pub level: LevelIndex,
    pub count: usize,
}

impl SaveHeader {
    /// Sniff the version marker and read the fields that follow it.
    ///
    /// A marker `<= 0` means a headerless record whose first integer was the
    /// entity count; both cases leave the reader at the first entity.
    pub fn read(reader: &mut GameDataReader<'_>) -> Result<Self, PersistError> {
        let marker = reader.read_version_marker()?;
        if marker > SAVE_VERSION {
            return Err(PersistError::UnsupportedVersion {
                found: marker,
                supported: SAVE_VERSION,
            });
        }
        if marker <= 0 {
            return Ok(Self {
                version: 0,
                level: LevelIndex::FIRST,
                count: marker.unsigned_abs() as usize,
            });
        }
        let level = if marker >= 2 {
            LevelIndex(reader.read_i32()?)
        } else {
            LevelIndex::FIRST
        };
        let count = reader.read_i32()?;
        if count < 0 {
            return Err(PersistError::InvalidCount(count));
        }
        Ok(Self {
            version: marker,
            level,
            count: count as usize,
        })
    }
}

/// Decode just the header of a complete record.
pub fn inspect_header(bytes: &[u8]) -> Result<SaveHeader, PersistError> {
    SaveHeader::read(&mut GameDataReader::new(bytes))
}

/// A record of every change to the population, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum PopulationEvent {
    Created { id: EntityId, key: ShapeKey },
    Destroyed { id: EntityId, key: ShapeKey },
    /// Whole population handed back to the factory.
    Cleared { count: usize },
    Loaded {
        version: i32,
        level: LevelIndex,
        count: usize,
    },
    LevelActivated { level: LevelIndex },
}

/// The population controller.
///
/// Owns the live entities and drives creation/destruction from two rate
/// accumulators on every [`tick`](Spawner::tick). While a level transition is
/// in flight the tick only advances the transition.
///
/// Entity order is insertion order, but [`destroy_entity`](Spawner::destroy_entity)
/// fills the hole with the last entity, so indices are not stable across a destroy.
pub struct Spawner<F, L> {
    factory: F,
    loader: L,
    rng: SmallRng,
    population: Vec<Entity>,
    creation: RateAccumulator,
    destruction: RateAccumulator,
    creation_rate: f64,
    destruction_rate: f64,
    level_count: i32,
    scale_range: (f32, f32),
    transition: LevelTransition,
    spawn_zone: SpawnZone,
    events: Vec<PopulationEvent>,
}

impl<F: EntityFactory, L: SceneLoader> Spawner<F, L> {
    pub fn new(config: &SpawnerConfig, factory: F, loader: L) -> Result<Self, SpawnerError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Ok(Self {
            factory,
            loader,
            rng,
            population: Vec::new(),
            creation: RateAccumulator::new(),
            destruction: RateAccumulator::new(),
            creation_rate: config.creation_rate,
            destruction_rate: config.destruction_rate,
            level_count: config.level_count,
            scale_range: config.scale_range,
            transition: LevelTransition::new(),
            spawn_zone: SpawnZone::default(),
            events: Vec::new(),
        })
    }

    /// Adopt a level the loader already has loaded, or start loading level 1.
    pub fn start(&mut self) -> Result<(), SpawnerError> {
        if let Some(level) = self.loader.loaded_level() {
            self.transition.adopt(level, &mut self.loader)?;
            self.on_level_activated(level);
        } else {
            self.transition.begin(LevelIndex::FIRST, &mut self.loader)?;
        }
        Ok(())
    }

    /// Advance one simulation step.
    pub fn tick(&mut self, dt: Duration) -> Result<(), SpawnerError> {
        if self.transition.is_busy() {
            match self.transition.advance(&mut self.loader) {
                Ok(TransitionProgress::Completed(level)) => self.on_level_activated(level),
                Ok(_) => {}
                Err(err) => {
                    self.spawn_zone = SpawnZone::default();
                    return Err(err.into());
                }
            }
            return Ok(());
        }

        let dt = dt.as_secs_f64();
        for _ in 0..self.creation.accumulate(dt, self.creation_rate) {
            self.create_entity();
        }
        let due = self.destruction.accumulate(dt, self.destruction_rate);
        let due = usize::try_from(due).unwrap_or(usize::MAX).min(self.population.len());
        for _ in 0..due {
            self.destroy_entity();
        }
        Ok(())
    }

    /// Take a random entity from the factory and place it in the active spawn zone.
    pub fn create_entity(&mut self) {
        let mut entity = self.factory.create_random(&mut self.rng);
        let (lo, hi) = self.scale_range;
        entity.transform = Transform {
            position: self.spawn_zone.spawn_point(&mut self.rng),
            rotation: Transform::random_rotation(&mut self.rng),
            scale: Vec3::splat(self.rng.gen_range(lo..=hi)),
        };
        entity.set_color(Color::random_vivid(&mut self.rng));
        tracing::debug!(id = ?entity.id(), key = %entity.key(), "entity created");
        self.events.push(PopulationEvent::Created {
            id: entity.id(),
            key: entity.key(),
        });
        self.population.push(entity);
    }

    /// Reclaim a uniformly random entity. No-op on an empty population.
    pub fn destroy_entity(&mut self) {
        if self.population.is_empty() {
            return;
        }
        let index = self.rng.gen_range(0..self.population.len());
        let entity = self.population.swap_remove(index);
        tracing::debug!(id = ?entity.id(), index, "entity destroyed");
        self.events.push(PopulationEvent::Destroyed {
            id: entity.id(),
            key: entity.key(),
        });
        self.factory.reclaim(entity);
    }

    /// Reclaim every live entity.
    pub fn begin_new_game(&mut self) {
        let count = self.population.len();
        for entity in self.population.drain(..) {
            self.factory.reclaim(entity);
        }
        tracing::debug!(count, "population cleared");
        self.events.push(PopulationEvent::Cleared { count });
    }

    /// Clear the population and switch to level `index` (1-based).
    pub fn select_level(&mut self, index: i32) -> Result<(), SpawnerError> {
        if index < 1 || index > self.level_count {
            return Err(SpawnerError::LevelOutOfRange {
                requested: index,
                level_count: self.level_count,
            });
        }
        self.ensure_settled()?;
        self.begin_new_game();
        self.transition.begin(LevelIndex(index), &mut self.loader)?;
        Ok(())
    }

    /// Write the population to `store`. Returns the record size in bytes.
    pub fn save_to(&self, store: &SaveStore) -> Result<usize, SpawnerError> {
        Ok(store.save(self)?)
    }

    /// Clear the population, then load it from `store`.
    pub fn load_from(&mut self, store: &SaveStore) -> Result<(), SpawnerError> {
        self.ensure_settled()?;
        self.begin_new_game();
        store.load(self)
    }

    fn ensure_settled(&self) -> Result<(), SpawnerError> {
        match self.transition.target() {
            Some(target) => Err(SpawnerError::Busy(target)),
            None => Ok(()),
        }
    }

    fn on_level_activated(&mut self, level: LevelIndex) {
        self.spawn_zone = self.loader.spawn_zone(level).unwrap_or_default();
        self.events.push(PopulationEvent::LevelActivated { level });
    }

    fn load_entity(
        &mut self,
        reader: &mut GameDataReader<'_>,
        version: i32,
    ) -> Result<Entity, PersistError> {
        let key = if version > 0 {
            let kind = reader.read_i32()?;
            let variant = reader.read_i32()?;
            ShapeKey::new(kind, variant)
        } else {
            ShapeKey::default()
        };
        let mut entity = self.factory.create(key);
        if let Err(err) = entity.load(reader) {
            self.factory.reclaim(entity);
            return Err(err);
        }
        Ok(entity)
    }

    /// Negative rates clamp to zero; non-finite rates are rejected.
    pub fn set_creation_rate(&mut self, rate: f64) -> Result<(), SpawnerError> {
        self.creation_rate = checked_rate("creation_rate", rate)?;
        Ok(())
    }

    pub fn set_destruction_rate(&mut self, rate: f64) -> Result<(), SpawnerError> {
        self.destruction_rate = checked_rate("destruction_rate", rate)?;
        Ok(())
    }

    pub fn creation_rate(&self) -> f64 {
        self.creation_rate
    }

    pub fn destruction_rate(&self) -> f64 {
        self.destruction_rate
    }

    /// Fractional progress towards the next creation.
    pub fn creation_progress(&self) -> f64 {
        self.creation.progress()
    }

    /// Fractional progress towards the next destruction.
    pub fn destruction_progress(&self) -> f64 {
        self.destruction.progress()
    }

    pub fn len(&self) -> usize {
        self.population.len()
    }

    pub fn is_empty(&self) -> bool {
        self.population.is_empty()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.population
    }

    /// Level recorded by the last completed transition.
    pub fn level(&self) -> LevelIndex {
        self.transition.current_level()
    }

    pub fn level_count(&self) -> i32 {
        self.level_count
    }

    /// Whether a level transition is in flight (tick processing is suspended).
    pub fn is_transitioning(&self) -> bool {
        self.transition.is_busy()
    }

    pub fn transition(&self) -> &LevelTransition {
        &self.transition
    }

    pub fn spawn_zone(&self) -> SpawnZone {
        self.spawn_zone
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut L {
        &mut self.loader
    }

    pub fn events(&self) -> &[PopulationEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<PopulationEvent> {
        std::mem::take(&mut self.events)
    }

    /// FNV-1a over (kind, variant, transform, color) in population order.
    pub fn population_hash(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        let mix = |h: &mut u64, bytes: &[u8]| {
            for &b in bytes {
                *h ^= b as u64;
                *h = h.wrapping_mul(0x0100_0000_01b3);
            }
        };
        for entity in &self.population {
            let t = &entity.transform;
            let c = entity.color();
            mix(&mut h, &entity.kind().to_le_bytes());
            mix(&mut h, &entity.variant().to_le_bytes());
            for f in t.position.to_array() {
                mix(&mut h, &f.to_le_bytes());
            }
            for f in t.rotation.to_array() {
                mix(&mut h, &f.to_le_bytes());
            }
            for f in t.scale.to_array() {
                mix(&mut h, &f.to_le_bytes());
            }
            for f in [c.r, c.g, c.b, c.a] {
                mix(&mut h, &f.to_le_bytes());
            }
        }
        h
    }
}

fn checked_rate(name: &str, rate: f64) -> Result<f64, SpawnerError> {
    if rate.is_finite() {
        Ok(rate.max(0.0))
    } else {
        Err(SpawnerError::Config(format!("{name} must be finite, got {rate}")))
    }
}

impl<F: EntityFactory, L: SceneLoader> Persistable for Spawner<F, L> {
    type Error = SpawnerError;

    fn save(&self, writer: &mut GameDataWriter) {
        let _span = tracing::info_span!("population_save", count = self.population.len()).entered();
        writer.write_version(SAVE_VERSION);
        writer.write_i32(self.level().0);
        writer.write_i32(self.population.len() as i32);
        for entity in &self.population {
            writer.write_i32(entity.kind());
            writer.write_i32(entity.variant());
            entity.save(writer);
        }
    }

    /// Sniff the record version, start the transition to the stored level,
    /// then append the stored entities.
    ///
    /// On failure nothing is appended: entities read so far go back to the factory.
    fn load(&mut self, reader: &mut GameDataReader<'_>) -> Result<(), SpawnerError> {
        let _span = tracing::info_span!("population_load").entered();
        let SaveHeader {
            version,
            level: stored_level,
            count,
        } = SaveHeader::read(reader)?;
        let level = if stored_level.is_level() {
            stored_level
        } else {
            tracing::debug!(stored = stored_level.0, "record saved before any level loaded");
            LevelIndex::FIRST
        };
        reader.set_version(version);
        tracing::info!(version, %level, count, "loading population");

        self.transition.begin(level, &mut self.loader)?;

        let mut loaded = Vec::new();
        for _ in 0..count {
            match self.load_entity(reader, version) {
                Ok(entity) => loaded.push(entity),
                Err(err) => {
                    tracing::debug!(read = loaded.len(), count, "population load aborted");
                    for entity in loaded {
                        self.factory.reclaim(entity);
                    }
                    return Err(err.into());
                }
            }
        }
        self.population.extend(loaded);
        self.events.push(PopulationEvent::Loaded {
            version,
            level,
            count,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::ShapeFactory;
    use rand::RngCore;
    use spawnworld_stream::{LevelCatalog, SceneEvent, ScriptedSceneLoader, TransitionError};
    use std::collections::HashMap;

    /// Factory that counts every call, keyed by entity id for reclaims.
    struct RecordingFactory {
        inner: ShapeFactory,
        created: usize,
        reclaimed: HashMap<EntityId, u32>,
    }

    impl RecordingFactory {
        fn new() -> Self {
            Self {
                inner: ShapeFactory::new(3, 3, false),
                created: 0,
                reclaimed: HashMap::new(),
            }
        }

        fn reclaim_total(&self) -> u32 {
            self.reclaimed.values().sum()
        }
    }

    impl EntityFactory for RecordingFactory {
        fn create(&mut self, key: ShapeKey) -> Entity {
            self.created += 1;
            self.inner.create(key)
        }

        fn create_random(&mut self, rng: &mut dyn RngCore) -> Entity {
            self.created += 1;
            self.inner.create_random(rng)
        }

        fn reclaim(&mut self, entity: Entity) {
            *self.reclaimed.entry(entity.id()).or_default() += 1;
            self.inner.reclaim(entity);
        }
    }

    type TestSpawner = Spawner<RecordingFactory, ScriptedSceneLoader>;

    fn spawner_with(config: SpawnerConfig, levels: usize, latency: u32) -> TestSpawner {
        let config = SpawnerConfig {
            seed: Some(0xC0FFEE),
            ..config
        };
        Spawner::new(
            &config,
            RecordingFactory::new(),
            ScriptedSceneLoader::new(LevelCatalog::generated(levels, latency)),
        )
        .unwrap()
    }

    fn spawner() -> TestSpawner {
        spawner_with(SpawnerConfig::default(), 4, 0)
    }

    fn settle(s: &mut TestSpawner) {
        for _ in 0..100 {
            if !s.is_transitioning() {
                return;
            }
            s.tick(Duration::ZERO).unwrap();
        }
        panic!("transition never settled");
    }

    fn started() -> TestSpawner {
        let mut s = spawner();
        s.start().unwrap();
        settle(&mut s);
        s
    }

    fn save_bytes(s: &TestSpawner) -> Vec<u8> {
        let mut w = GameDataWriter::new();
        s.save(&mut w);
        w.into_bytes()
    }

    fn load_bytes(s: &mut TestSpawner, bytes: &[u8]) -> Result<(), SpawnerError> {
        let mut r = GameDataReader::new(bytes);
        s.load(&mut r)
    }

    fn keys(s: &TestSpawner) -> Vec<ShapeKey> {
        s.entities().iter().map(Entity::key).collect()
    }

    #[test]
    fn start_loads_first_level() {
        let mut s = spawner();
        assert_eq!(s.level(), LevelIndex::NONE);
        s.start().unwrap();
        settle(&mut s);
        assert_eq!(s.level(), LevelIndex::FIRST);
        assert!(s.events().contains(&PopulationEvent::LevelActivated {
            level: LevelIndex::FIRST
        }));
        assert_eq!(
            Some(s.spawn_zone()),
            s.loader().catalog().get(LevelIndex::FIRST).map(|l| l.spawn_zone)
        );
    }

    #[test]
    fn start_adopts_preloaded_level() {
        let loader =
            ScriptedSceneLoader::with_preloaded(LevelCatalog::generated(3, 0), LevelIndex(3))
                .unwrap();
        let mut s = Spawner::new(&SpawnerConfig::default(), RecordingFactory::new(), loader).unwrap();
        s.start().unwrap();
        assert!(!s.is_transitioning());
        assert_eq!(s.level(), LevelIndex(3));
        assert_eq!(s.loader().events(), &[SceneEvent::Activated(LevelIndex(3))]);
    }

    #[test]
    fn create_places_entity_in_active_zone() {
        let mut s = started();
        for _ in 0..50 {
            s.create_entity();
        }
        assert_eq!(s.len(), 50);
        let zone = s.spawn_zone();
        for e in s.entities() {
            assert!(zone.contains(e.transform.position));
            assert!((0.1..=1.0).contains(&e.transform.scale.x));
            assert_eq!(e.transform.scale.x, e.transform.scale.z);
        }
    }

    #[test]
    fn destroy_on_empty_population_is_a_noop() {
        let mut s = started();
        s.drain_events();
        s.destroy_entity();
        assert_eq!(s.len(), 0);
        assert_eq!(s.factory().created, 0);
        assert_eq!(s.factory().reclaim_total(), 0);
        assert!(s.events().is_empty());
    }

    #[test]
    fn destroy_swaps_last_into_hole() {
        let mut s = started();
        for _ in 0..6 {
            s.create_entity();
        }
        let before: Vec<EntityId> = s.entities().iter().map(Entity::id).collect();
        s.destroy_entity();
        assert_eq!(s.len(), 5);

        let gone: Vec<EntityId> = s.factory().reclaimed.keys().copied().collect();
        assert_eq!(gone.len(), 1);
        let removed_at = before.iter().position(|id| *id == gone[0]).unwrap();

        let mut expected = before.clone();
        expected.swap_remove(removed_at);
        let after: Vec<EntityId> = s.entities().iter().map(Entity::id).collect();
        assert_eq!(after, expected);
    }

    #[test]
    fn begin_new_game_reclaims_each_entity_once() {
        let mut s = started();
        for _ in 0..10 {
            s.create_entity();
        }
        let ids: Vec<EntityId> = s.entities().iter().map(Entity::id).collect();
        s.begin_new_game();
        assert_eq!(s.len(), 0);
        assert_eq!(s.factory().reclaimed.len(), 10);
        for id in ids {
            assert_eq!(s.factory().reclaimed.get(&id), Some(&1));
        }
    }

    #[test]
    fn tick_creates_at_configured_rate() {
        let mut s = started();
        s.set_creation_rate(3.0).unwrap();
        for _ in 0..8 {
            s.tick(Duration::from_millis(125)).unwrap();
        }
        // 1s at 3/s
        assert_eq!(s.len(), 3);
        assert_eq!(s.creation_progress(), 0.0);
    }

    #[test]
    fn tick_count_is_independent_of_split() {
        let mut coarse = started();
        let mut fine = started();
        for s in [&mut coarse, &mut fine] {
            s.set_creation_rate(2.5).unwrap();
        }
        coarse.tick(Duration::from_secs(4)).unwrap();
        for _ in 0..32 {
            fine.tick(Duration::from_millis(125)).unwrap();
        }
        assert_eq!(coarse.len(), 10);
        assert_eq!(fine.len(), 10);
    }

    #[test]
    fn destruction_rate_shrinks_population() {
        let mut s = started();
        for _ in 0..5 {
            s.create_entity();
        }
        s.set_destruction_rate(2.0).unwrap();
        s.tick(Duration::from_secs(1)).unwrap();
        assert_eq!(s.len(), 3);
        s.tick(Duration::from_secs(5)).unwrap();
        assert_eq!(s.len(), 0);
        assert_eq!(s.factory().reclaim_total(), 5);
    }

    #[test]
    fn huge_destruction_rate_empties_population_in_one_tick() {
        let mut s = started();
        for _ in 0..4 {
            s.create_entity();
        }
        s.set_destruction_rate(1e20).unwrap();
        s.tick(Duration::from_secs(1)).unwrap();
        assert_eq!(s.len(), 0);
        assert_eq!(s.factory().reclaim_total(), 4);
        assert_eq!(s.destruction_progress(), 0.0);
    }

    #[test]
    fn non_finite_rates_are_rejected() {
        let mut s = started();
        s.set_creation_rate(1.5).unwrap();
        assert!(matches!(
            s.set_creation_rate(f64::INFINITY),
            Err(SpawnerError::Config(msg)) if msg.contains("creation_rate")
        ));
        assert!(s.set_destruction_rate(f64::NAN).is_err());
        assert_eq!(s.creation_rate(), 1.5);
        assert_eq!(s.destruction_rate(), 0.0);
        s.set_destruction_rate(-3.0).unwrap();
        assert_eq!(s.destruction_rate(), 0.0);
    }

    #[test]
    fn tick_is_suspended_during_transition() {
        let mut s = spawner_with(
            SpawnerConfig {
                creation_rate: 10.0,
                ..SpawnerConfig::default()
            },
            2,
            3,
        );
        s.start().unwrap();
        for _ in 0..3 {
            s.tick(Duration::from_secs(1)).unwrap();
            assert!(s.is_transitioning());
        }
        // Completing tick only activates the level.
        s.tick(Duration::from_secs(1)).unwrap();
        assert!(!s.is_transitioning());
        assert_eq!(s.len(), 0);
        assert_eq!(s.creation_progress(), 0.0);

        s.tick(Duration::from_millis(500)).unwrap();
        assert_eq!(s.len(), 5);
    }

    #[test]
    fn select_level_clears_and_transitions() {
        let mut s = started();
        for _ in 0..4 {
            s.create_entity();
        }
        s.select_level(2).unwrap();
        assert_eq!(s.len(), 0);
        assert_eq!(s.factory().reclaim_total(), 4);
        settle(&mut s);
        assert_eq!(s.level(), LevelIndex(2));
        assert_eq!(s.loader().peak_loaded(), 1);
    }

    #[test]
    fn select_level_out_of_range() {
        let mut s = started();
        for bad in [0, -1, 3] {
            assert!(matches!(
                s.select_level(bad),
                Err(SpawnerError::LevelOutOfRange { level_count: 2, .. })
            ));
        }
    }

    #[test]
    fn select_level_while_transitioning_is_rejected() {
        let mut s = spawner_with(SpawnerConfig::default(), 2, 5);
        s.start().unwrap();
        s.create_entity();
        assert!(matches!(
            s.select_level(2),
            Err(SpawnerError::Busy(LevelIndex(1)))
        ));
        // Rejected before clearing.
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn save_load_round_trip_preserves_keys_level_and_state() {
        let mut a = started();
        a.select_level(2).unwrap();
        settle(&mut a);
        for _ in 0..12 {
            a.create_entity();
        }
        a.destroy_entity();
        let bytes = save_bytes(&a);

        let mut b = started();
        load_bytes(&mut b, &bytes).unwrap();
        assert!(b.is_transitioning());
        settle(&mut b);

        assert_eq!(b.level(), LevelIndex(2));
        assert_eq!(keys(&b), keys(&a));
        assert_eq!(b.population_hash(), a.population_hash());
        assert!(b.events().contains(&PopulationEvent::Loaded {
            version: SAVE_VERSION,
            level: LevelIndex(2),
            count: 11,
        }));
    }

    #[test]
    fn save_layout_matches_version_two() {
        let mut s = started();
        s.create_entity();
        let e = &s.entities()[0];
        let (kind, variant) = (e.kind(), e.variant());
        let bytes = save_bytes(&s);

        let mut r = GameDataReader::new(&bytes);
        assert_eq!(r.read_i32().unwrap(), -SAVE_VERSION);
        assert_eq!(r.read_i32().unwrap(), 1); // level
        assert_eq!(r.read_i32().unwrap(), 1); // count
        assert_eq!(r.read_i32().unwrap(), kind);
        assert_eq!(r.read_i32().unwrap(), variant);
        assert_eq!(r.remaining(), (3 + 4 + 3 + 4) * 4);
    }

    #[test]
    fn legacy_headerless_record_loads_with_default_keys() {
        let mut w = GameDataWriter::new();
        w.write_i32(5);
        for i in 0..5 {
            w.write_transform(&Transform {
                position: Vec3::new(i as f32, 0.0, 0.0),
                ..Transform::default()
            });
        }
        let bytes = w.into_bytes();

        let mut s = spawner();
        load_bytes(&mut s, &bytes).unwrap();
        assert_eq!(s.len(), 5);
        for (i, e) in s.entities().iter().enumerate() {
            assert_eq!(e.key(), ShapeKey::new(0, 0));
            assert_eq!(e.color(), Color::WHITE);
            assert_eq!(e.transform.position.x, i as f32);
        }
        assert_eq!(s.transition().target(), Some(LevelIndex::FIRST));
        settle(&mut s);
        assert_eq!(s.level(), LevelIndex::FIRST);
    }

    #[test]
    fn legacy_record_with_zero_entities() {
        let bytes = 0i32.to_le_bytes();
        let mut s = spawner();
        load_bytes(&mut s, &bytes).unwrap();
        assert_eq!(s.len(), 0);
        assert_eq!(s.transition().target(), Some(LevelIndex::FIRST));
    }

    #[test]
    fn version_one_record_reads_explicit_keys() {
        let stored = [ShapeKey::new(2, 1), ShapeKey::new(0, 2), ShapeKey::new(1, 0)];
        let mut w = GameDataWriter::new();
        w.write_version(1);
        w.write_i32(stored.len() as i32);
        for key in stored {
            w.write_i32(key.kind);
            w.write_i32(key.variant);
            w.write_transform(&Transform::default());
            w.write_color(Color::rgba(0.5, 0.5, 0.5, 1.0));
        }
        let bytes = w.into_bytes();

        let mut s = spawner();
        load_bytes(&mut s, &bytes).unwrap();
        assert_eq!(keys(&s), stored.to_vec());
        assert_eq!(s.entities()[1].color(), Color::rgba(0.5, 0.5, 0.5, 1.0));
        settle(&mut s);
        assert_eq!(s.level(), LevelIndex::FIRST);
    }

    #[test]
    fn version_two_record_selects_stored_level() {
        let mut w = GameDataWriter::new();
        w.write_version(2);
        w.write_i32(4);
        w.write_i32(0);
        let bytes = w.into_bytes();

        let mut s = spawner();
        load_bytes(&mut s, &bytes).unwrap();
        assert_eq!(s.len(), 0);
        settle(&mut s);
        assert_eq!(s.level(), LevelIndex(4));
    }

    #[test]
    fn future_version_is_rejected_and_loads_nothing() {
        let mut w = GameDataWriter::new();
        w.write_version(SAVE_VERSION + 1);
        w.write_i32(1);
        w.write_i32(3);
        let bytes = w.into_bytes();

        let mut s = spawner();
        let err = load_bytes(&mut s, &bytes).unwrap_err();
        assert!(matches!(
            err,
            SpawnerError::Persist(PersistError::UnsupportedVersion {
                found: 3,
                supported: 2
            })
        ));
        assert!(s.is_empty());
        assert!(!s.is_transitioning());
        assert_eq!(s.factory().created, 0);
    }

    #[test]
    fn truncated_record_returns_partial_entities_to_factory() {
        let mut a = started();
        for _ in 0..4 {
            a.create_entity();
        }
        let mut bytes = save_bytes(&a);
        bytes.truncate(bytes.len() - 10);

        let mut b = started();
        let err = load_bytes(&mut b, &bytes).unwrap_err();
        assert!(matches!(
            err,
            SpawnerError::Persist(PersistError::UnexpectedEof { .. })
        ));
        assert!(b.is_empty());
        assert_eq!(b.factory().created as u32, b.factory().reclaim_total());
    }

    #[test]
    fn negative_count_in_versioned_record_is_invalid() {
        let mut w = GameDataWriter::new();
        w.write_version(1);
        w.write_i32(-2);
        let bytes = w.into_bytes();

        let mut s = spawner();
        assert!(matches!(
            load_bytes(&mut s, &bytes),
            Err(SpawnerError::Persist(PersistError::InvalidCount(-2)))
        ));
    }

    #[test]
    fn unknown_stored_level_fails_before_entities_load() {
        let mut w = GameDataWriter::new();
        w.write_version(2);
        w.write_i32(99);
        w.write_i32(0);
        let bytes = w.into_bytes();

        let mut s = spawner();
        assert!(matches!(
            load_bytes(&mut s, &bytes),
            Err(SpawnerError::Transition(TransitionError::UnknownLevel(LevelIndex(99))))
        ));
    }

    #[test]
    fn unknown_stored_level_is_rejected_on_started_spawner() {
        let mut w = GameDataWriter::new();
        w.write_version(2);
        w.write_i32(99);
        w.write_i32(0);
        let bytes = w.into_bytes();

        let mut s = started();
        let zone = s.spawn_zone();
        assert!(matches!(
            load_bytes(&mut s, &bytes),
            Err(SpawnerError::Transition(TransitionError::UnknownLevel(LevelIndex(99))))
        ));
        assert!(!s.is_transitioning());
        assert_eq!(s.level(), LevelIndex(1));
        assert_eq!(s.spawn_zone(), zone);
        assert!(s.loader().loaded_levels().contains(&LevelIndex(1)));
        s.tick(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn failed_transition_drops_stale_spawn_zone() {
        let mut s = started();
        assert_ne!(s.spawn_zone(), SpawnZone::default());
        // Level 2 already pending in the loader, so the transition's load is refused.
        s.loader_mut().load_additive(LevelIndex(2)).unwrap();
        s.select_level(2).unwrap();
        assert!(matches!(
            s.tick(Duration::ZERO),
            Err(SpawnerError::Transition(TransitionError::AlreadyLoaded(LevelIndex(2))))
        ));
        assert!(!s.is_transitioning());
        assert_eq!(s.level(), LevelIndex::NONE);
        assert_eq!(s.spawn_zone(), SpawnZone::default());
    }

    #[test]
    fn header_inspection_covers_every_version() {
        let mut s = started();
        s.create_entity();
        s.create_entity();
        assert_eq!(
            inspect_header(&save_bytes(&s)).unwrap(),
            SaveHeader {
                version: 2,
                level: LevelIndex(1),
                count: 2,
            }
        );

        let mut w = GameDataWriter::new();
        w.write_version(1);
        w.write_i32(3);
        assert_eq!(
            inspect_header(w.as_bytes()).unwrap(),
            SaveHeader {
                version: 1,
                level: LevelIndex::FIRST,
                count: 3,
            }
        );

        assert_eq!(
            inspect_header(&7i32.to_le_bytes()).unwrap(),
            SaveHeader {
                version: 0,
                level: LevelIndex::FIRST,
                count: 7,
            }
        );
        assert!(matches!(
            inspect_header(&[]),
            Err(PersistError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn save_and_load_through_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SaveStore::new(tmp.path().join("savefile"));

        let mut a = started();
        for _ in 0..7 {
            a.create_entity();
        }
        a.save_to(&store).unwrap();

        let mut b = started();
        b.create_entity();
        b.load_from(&store).unwrap();
        settle(&mut b);
        assert_eq!(b.len(), 7);
        assert_eq!(b.population_hash(), a.population_hash());
        // The entity created before loading was cleared by the new game.
        assert_eq!(b.factory().reclaim_total(), 1);
    }

    #[test]
    fn load_from_while_transitioning_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SaveStore::new(tmp.path().join("savefile"));
        started().save_to(&store).unwrap();

        let mut s = spawner_with(SpawnerConfig::default(), 2, 4);
        s.start().unwrap();
        assert!(matches!(s.load_from(&store), Err(SpawnerError::Busy(_))));
    }
}
