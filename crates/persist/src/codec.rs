use glam::{Quat, Vec3};
use spawnworld_common::{Color, Transform};

use crate::PersistError;

/// Capability implemented by anything that can write itself into a save
/// record and read itself back.
///
/// Loading may need more than decoding (a controller may have to trigger a
/// level change), so implementors pick their own error type as long as codec
/// failures convert into it.
pub trait Persistable {
    type Error: From<PersistError>;

    fn save(&self, writer: &mut GameDataWriter);

    fn load(&mut self, reader: &mut GameDataReader<'_>) -> Result<(), Self::Error>;
}

/// Append-only little-endian encoder for a single save record.
#[derive(Debug, Default)]
pub struct GameDataWriter {
    buf: Vec<u8>,
}

impl GameDataWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a version marker. Stored negated; see [`GameDataReader::read_version_marker`].
    pub fn write_version(&mut self, version: i32) {
        self.write_i32(version.wrapping_neg());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_vec3(&mut self, v: Vec3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    pub fn write_quat(&mut self, q: Quat) {
        self.write_f32(q.x);
        self.write_f32(q.y);
        self.write_f32(q.z);
        self.write_f32(q.w);
    }

    pub fn write_transform(&mut self, t: &Transform) {
        self.write_vec3(t.position);
        self.write_quat(t.rotation);
        self.write_vec3(t.scale);
    }

    pub fn write_color(&mut self, c: Color) {
        self.write_f32(c.r);
        self.write_f32(c.g);
        self.write_f32(c.b);
        self.write_f32(c.a);
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a complete save record.
///
/// Carries the effective format version once the owner of the record has
/// sniffed it, so nested persistables can branch on it.
#[derive(Debug)]
pub struct GameDataReader<'a> {
    data: &'a [u8],
    pos: usize,
    version: i32,
}

impl<'a> GameDataReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            version: 0,
        }
    }

    /// Effective version of the record being read (0 until set).
    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn set_version(&mut self, version: i32) {
        self.version = version;
    }

    /// Read the leading marker.
    ///
    /// Returns the explicit version (> 0) for versioned records. For a legacy
    /// record the stored integer is the entity count, so the result is the
    /// negated count (<= 0).
    pub fn read_version_marker(&mut self) -> Result<i32, PersistError> {
        Ok(self.read_i32()?.wrapping_neg())
    }

    pub fn read_i32(&mut self) -> Result<i32, PersistError> {
        Ok(i32::from_le_bytes(self.take::<4>()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, PersistError> {
        Ok(f32::from_le_bytes(self.take::<4>()?))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, PersistError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_quat(&mut self) -> Result<Quat, PersistError> {
        Ok(Quat::from_xyzw(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    pub fn read_transform(&mut self) -> Result<Transform, PersistError> {
        Ok(Transform {
            position: self.read_vec3()?,
            rotation: self.read_quat()?,
            scale: self.read_vec3()?,
        })
    }

    pub fn read_color(&mut self) -> Result<Color, PersistError> {
        Ok(Color::rgba(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    /// Bytes left unread.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], PersistError> {
        let remaining = self.remaining();
        if remaining < N {
            return Err(PersistError::UnexpectedEof {
                needed: N,
                remaining,
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }
}
