use std::collections::BTreeSet;

use crate::level::{LevelCatalog, LevelIndex, SpawnZone};
use crate::transition::{SceneLoader, SceneOp, TransitionError};

/// Everything the scripted loader was asked to do, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneEvent {
    UnloadRequested(LevelIndex),
    Unloaded(LevelIndex),
    LoadRequested(LevelIndex),
    Loaded(LevelIndex),
    Activated(LevelIndex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Load,
    Unload,
}

#[derive(Debug, Clone)]
struct PendingOp {
    id: SceneOp,
    kind: OpKind,
    level: LevelIndex,
    frames_left: u32,
}

/// In-memory [`SceneLoader`] with per-level latency.
///
/// A request with latency `n` reports completion on the `n + 1`th poll; the
/// level's loaded state flips at that moment. Every request and completion is
/// logged so callers can check ordering.
#[derive(Debug)]
pub struct ScriptedSceneLoader {
    catalog: LevelCatalog,
    loaded: BTreeSet<LevelIndex>,
    active: Option<LevelIndex>,
    pending: Vec<PendingOp>,
    next_op: u64,
    peak_loaded: usize,
    events: Vec<SceneEvent>,
}

impl ScriptedSceneLoader {
    pub fn new(catalog: LevelCatalog) -> Self {
        Self {
            catalog,
            loaded: BTreeSet::new(),
            active: None,
            pending: Vec::new(),
            next_op: 0,
            peak_loaded: 0,
            events: Vec::new(),
        }
    }

    /// A loader that starts with `level` already loaded, as when a level is
    /// open in an editor before play begins.
    pub fn with_preloaded(catalog: LevelCatalog, level: LevelIndex) -> Result<Self, TransitionError> {
        if catalog.get(level).is_none() {
            return Err(TransitionError::UnknownLevel(level));
        }
        let mut loader = Self::new(catalog);
        loader.loaded.insert(level);
        loader.peak_loaded = 1;
        Ok(loader)
    }

    pub fn catalog(&self) -> &LevelCatalog {
        &self.catalog
    }

    pub fn loaded_levels(&self) -> &BTreeSet<LevelIndex> {
        &self.loaded
    }

    pub fn active(&self) -> Option<LevelIndex> {
        self.active
    }

    /// Largest number of levels that were ever loaded at the same time.
    pub fn peak_loaded(&self) -> usize {
        self.peak_loaded
    }

    pub fn events(&self) -> &[SceneEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    fn issue(&mut self, kind: OpKind, level: LevelIndex, frames: u32) -> SceneOp {
        let id = SceneOp(self.next_op);
        self.next_op += 1;
        self.pending.push(PendingOp {
            id,
            kind,
            level,
            frames_left: frames,
        });
        id
    }

    fn is_pending(&self, level: LevelIndex) -> bool {
        self.pending.iter().any(|op| op.level == level)
    }
}

impl SceneLoader for ScriptedSceneLoader {
    fn unload(&mut self, level: LevelIndex) -> Result<SceneOp, TransitionError> {
        if !self.loaded.contains(&level) || self.is_pending(level) {
            return Err(TransitionError::NotLoaded(level));
        }
        let frames = self.catalog.get(level).map_or(0, |spec| spec.unload_frames);
        self.events.push(SceneEvent::UnloadRequested(level));
        Ok(self.issue(OpKind::Unload, level, frames))
    }

    fn load_additive(&mut self, level: LevelIndex) -> Result<SceneOp, TransitionError> {
        let frames = match self.catalog.get(level) {
            Some(spec) => spec.load_frames,
            None => return Err(TransitionError::UnknownLevel(level)),
        };
        if self.loaded.contains(&level) || self.is_pending(level) {
            return Err(TransitionError::AlreadyLoaded(level));
        }
        self.events.push(SceneEvent::LoadRequested(level));
        Ok(self.issue(OpKind::Load, level, frames))
    }

    fn is_done(&mut self, op: SceneOp) -> bool {
        let Some(pos) = self.pending.iter().position(|p| p.id == op) else {
            return true;
        };
        if self.pending[pos].frames_left > 0 {
            self.pending[pos].frames_left -= 1;
            return false;
        }
        let done = self.pending.remove(pos);
        match done.kind {
            OpKind::Load => {
                self.loaded.insert(done.level);
                self.peak_loaded = self.peak_loaded.max(self.loaded.len());
                self.events.push(SceneEvent::Loaded(done.level));
            }
            OpKind::Unload => {
                self.loaded.remove(&done.level);
                if self.active == Some(done.level) {
                    self.active = None;
                }
                self.events.push(SceneEvent::Unloaded(done.level));
            }
        }
        tracing::trace!(level = %done.level, kind = ?done.kind, "scene op complete");
        true
    }

    fn set_active(&mut self, level: LevelIndex) -> Result<(), TransitionError> {
        if !self.loaded.contains(&level) {
            return Err(TransitionError::NotLoaded(level));
        }
        self.active = Some(level);
        self.events.push(SceneEvent::Activated(level));
        Ok(())
    }

    fn spawn_zone(&self, level: LevelIndex) -> Option<SpawnZone> {
        self.catalog.get(level).map(|spec| spec.spawn_zone)
    }

    fn loaded_level(&self) -> Option<LevelIndex> {
        self.loaded.iter().next().copied()
    }
}
