//! Persistence: versioned binary save records.
//!
//! A save record is a flat little-endian stream of `i32`/`f32` values. Its
//! leading integer is a version marker stored negated, so a headerless legacy
//! record (which starts with a plain entity count) decodes to a marker `<= 0`.
//!
//! # Invariants
//! - Records are produced and consumed wholesale; never patched in place.
//! - Any read past the end of the record is an error, never a default.

mod codec;
mod store;

pub use codec::{GameDataReader, GameDataWriter, Persistable};
pub use store::SaveStore;

/// Errors from encoding, decoding, or storing save records.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected end of save data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("unsupported future save version {found}, this build reads up to v{supported}")]
    UnsupportedVersion { found: i32, supported: i32 },
    #[error("invalid entity count {0}")]
    InvalidCount(i32),
}
