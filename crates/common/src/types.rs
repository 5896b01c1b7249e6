use glam::{Quat, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an entity instance.
///
/// Pooled entities keep their id when they are handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted identity of an entity: which prefab (kind) and which material (variant).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeKey {
    pub kind: i32,
    pub variant: i32,
}

impl ShapeKey {
    pub const fn new(kind: i32, variant: i32) -> Self {
        Self { kind, variant }
    }
}

impl fmt::Display for ShapeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.variant)
    }
}

/// Spatial transform: position, rotation, scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Uniformly distributed unit quaternion (Shoemake's subgroup method).
    pub fn random_rotation<R: Rng + ?Sized>(rng: &mut R) -> Quat {
        let u1: f32 = rng.gen_range(0.0..1.0);
        let u2: f32 = rng.gen_range(0.0..1.0);
        let u3: f32 = rng.gen_range(0.0..1.0);
        let a = (1.0 - u1).sqrt();
        let b = u1.sqrt();
        Quat::from_xyzw(
            a * (TAU * u2).sin(),
            a * (TAU * u2).cos(),
            b * (TAU * u3).sin(),
            b * (TAU * u3).cos(),
        )
        .normalize()
    }
}

/// Linear RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Color {
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Convert hue/saturation/value (all in 0..=1) to an opaque color.
    pub fn from_hsv(hue: f32, saturation: f32, value: f32) -> Self {
        let h = hue.rem_euclid(1.0) * 6.0;
        let sector = h.floor();
        let f = h - sector;
        let p = value * (1.0 - saturation);
        let q = value * (1.0 - saturation * f);
        let t = value * (1.0 - saturation * (1.0 - f));
        let (r, g, b) = match sector as u32 % 6 {
            0 => (value, t, p),
            1 => (q, value, p),
            2 => (p, value, t),
            3 => (p, q, value),
            4 => (t, p, value),
            _ => (value, p, q),
        };
        Self::rgba(r, g, b, 1.0)
    }

    /// Saturated, reasonably bright random color: hue 0..1, saturation 0.8..1, value 0.5..1.
    pub fn random_vivid<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let hue = rng.gen_range(0.0..1.0);
        let saturation = rng.gen_range(0.8..=1.0);
        let value = rng.gen_range(0.5..=1.0);
        Self::from_hsv(hue, saturation, value)
    }
}
