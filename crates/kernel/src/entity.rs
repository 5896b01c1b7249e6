use spawnworld_common::{Color, EntityId, ShapeKey, Transform};
use spawnworld_persist::{GameDataReader, GameDataWriter, PersistError, Persistable};

/// A spawnable, poolable object.
///
/// The controller owns live entities by value; handing one back to the
/// factory moves it out, so a reclaimed entity cannot be used again.
#[derive(Debug, PartialEq)]
pub struct Entity {
    id: EntityId,
    key: ShapeKey,
    pub transform: Transform,
    color: Color,
}

impl Entity {
    pub fn new(key: ShapeKey) -> Self {
        Self {
            id: EntityId::new(),
            key,
            transform: Transform::default(),
            color: Color::WHITE,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn key(&self) -> ShapeKey {
        self.key
    }

    pub fn kind(&self) -> i32 {
        self.key.kind
    }

    pub fn variant(&self) -> i32 {
        self.key.variant
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    /// Prepare a pooled instance for reuse under a (possibly different) key.
    pub(crate) fn reissue(&mut self, key: ShapeKey) {
        self.key = key;
        self.transform = Transform::default();
        self.color = Color::WHITE;
    }
}

impl Persistable for Entity {
    type Error = PersistError;

    fn save(&self, writer: &mut GameDataWriter) {
        writer.write_transform(&self.transform);
        writer.write_color(self.color);
    }

    /// Records older than version 1 carry no color.
    fn load(&mut self, reader: &mut GameDataReader<'_>) -> Result<(), PersistError> {
        self.transform = reader.read_transform()?;
        self.color = if reader.version() > 0 {
            reader.read_color()?
        } else {
            Color::WHITE
        };
        Ok(())
    }
}
