use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a loadable level. `0` means no level is loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LevelIndex(pub i32);

impl LevelIndex {
    pub const NONE: LevelIndex = LevelIndex(0);
    pub const FIRST: LevelIndex = LevelIndex(1);

    /// Whether this index names a real level (as opposed to "nothing loaded").
    pub fn is_level(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for LevelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level {}", self.0)
    }
}

/// Region of a level in which new entities are placed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum SpawnZone {
    Sphere {
        center: Vec3,
        radius: f32,
        #[serde(default)]
        surface_only: bool,
    },
    Cube {
        center: Vec3,
        half_extents: Vec3,
        #[serde(default)]
        surface_only: bool,
    },
}

impl Default for SpawnZone {
    fn default() -> Self {
        SpawnZone::Sphere {
            center: Vec3::ZERO,
            radius: 1.0,
            surface_only: false,
        }
    }
}

impl SpawnZone {
    /// Sample a point in (or on the boundary of) the zone.
    pub fn spawn_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        match *self {
            SpawnZone::Sphere {
                center,
                radius,
                surface_only,
            } => {
                let p = if surface_only {
                    random_unit_vector(rng)
                } else {
                    random_in_unit_sphere(rng)
                };
                center + p * radius
            }
            SpawnZone::Cube {
                center,
                half_extents,
                surface_only,
            } => {
                let mut p = Vec3::new(
                    rng.gen_range(-1.0..=1.0),
                    rng.gen_range(-1.0..=1.0),
                    rng.gen_range(-1.0..=1.0),
                );
                if surface_only {
                    // Push one axis out to a face.
                    let axis = rng.gen_range(0..3);
                    let side = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                    p[axis] = side;
                }
                center + p * half_extents
            }
        }
    }

    /// Whether `point` lies inside the zone (boundary inclusive, small tolerance).
    pub fn contains(&self, point: Vec3) -> bool {
        const EPS: f32 = 1e-4;
        match *self {
            SpawnZone::Sphere { center, radius, .. } => point.distance(center) <= radius + EPS,
            SpawnZone::Cube {
                center,
                half_extents,
                ..
            } => {
                let d = (point - center).abs();
                d.cmple(half_extents + Vec3::splat(EPS)).all()
            }
        }
    }
}

fn random_in_unit_sphere<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    loop {
        let p = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        if p.length_squared() <= 1.0 {
            return p;
        }
    }
}

fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    loop {
        let p = random_in_unit_sphere(rng);
        if let Some(n) = p.try_normalize() {
            return n;
        }
    }
}

/// Static description of one level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSpec {
    pub name: String,
    #[serde(default)]
    pub spawn_zone: SpawnZone,
    /// Polls before a load request reports completion.
    #[serde(default)]
    pub load_frames: u32,
    /// Polls before an unload request reports completion.
    #[serde(default)]
    pub unload_frames: u32,
}

/// The set of levels a loader knows about. Level `n` is `levels[n - 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelCatalog {
    pub levels: Vec<LevelSpec>,
}

impl LevelCatalog {
    /// `count` levels alternating sphere and cube zones of growing size.
    pub fn generated(count: usize, latency_frames: u32) -> Self {
        let levels = (1..=count)
            .map(|i| {
                let size = 4.0 + i as f32;
                let spawn_zone = if i % 2 == 1 {
                    SpawnZone::Sphere {
                        center: Vec3::ZERO,
                        radius: size,
                        surface_only: false,
                    }
                } else {
                    SpawnZone::Cube {
                        center: Vec3::new(0.0, size, 0.0),
                        half_extents: Vec3::splat(size),
                        surface_only: false,
                    }
                };
                LevelSpec {
                    name: format!("Level {i}"),
                    spawn_zone,
                    load_frames: latency_frames,
                    unload_frames: latency_frames,
                }
            })
            .collect();
        Self { levels }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn get(&self, level: LevelIndex) -> Option<&LevelSpec> {
        if !level.is_level() {
            return None;
        }
        self.levels.get(level.0 as usize - 1)
    }
}
