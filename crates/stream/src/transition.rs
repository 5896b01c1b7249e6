use crate::level::{LevelIndex, SpawnZone};

/// Errors from level loading and transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("transition to {requested} rejected: transition to {current} still in progress")]
    InProgress {
        current: LevelIndex,
        requested: LevelIndex,
    },
    #[error("invalid level index {0}")]
    InvalidLevel(i32),
    #[error("{0} is not known to the loader")]
    UnknownLevel(LevelIndex),
    #[error("{0} is not loaded")]
    NotLoaded(LevelIndex),
    #[error("{0} is already loaded")]
    AlreadyLoaded(LevelIndex),
}

/// Handle to an asynchronous load or unload issued by a [`SceneLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneOp(pub u64);

/// The engine side of level streaming.
///
/// `unload` and `load_additive` start work and return immediately; the
/// transition polls `is_done` once per tick until the work completes.
pub trait SceneLoader {
    fn unload(&mut self, level: LevelIndex) -> Result<SceneOp, TransitionError>;

    fn load_additive(&mut self, level: LevelIndex) -> Result<SceneOp, TransitionError>;

    fn is_done(&mut self, op: SceneOp) -> bool;

    /// Make a loaded level the active spatial context.
    fn set_active(&mut self, level: LevelIndex) -> Result<(), TransitionError>;

    fn spawn_zone(&self, level: LevelIndex) -> Option<SpawnZone>;

    /// Whether `level` can be loaded at all.
    fn knows(&self, level: LevelIndex) -> bool {
        self.spawn_zone(level).is_some()
    }

    /// A level that was already loaded before the owner started, if any.
    fn loaded_level(&self) -> Option<LevelIndex> {
        None
    }
}

/// Where the transition state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    /// No transition has run yet.
    Idle(LevelIndex),
    /// Waiting for the previous level to unload.
    Unloading { target: LevelIndex, op: SceneOp },
    /// Waiting for the target level to load.
    Loading { target: LevelIndex, op: SceneOp },
    /// Target level loaded and active.
    Active(LevelIndex),
}

/// Result of polling a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionProgress {
    /// Nothing in flight.
    Settled,
    /// Still waiting on the loader.
    Pending,
    /// The target level became active during this poll.
    Completed(LevelIndex),
}

/// Sequential, single-flight level transition.
///
/// `begin` issues the first async step; `advance` polls it and moves on:
/// unload the current level (if any), load the target additively, then make
/// it active and record it as the current level.
#[derive(Debug, Clone)]
pub struct LevelTransition {
    state: TransitionState,
    current: LevelIndex,
}

impl Default for LevelTransition {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelTransition {
    pub fn new() -> Self {
        Self {
            state: TransitionState::Idle(LevelIndex::NONE),
            current: LevelIndex::NONE,
        }
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    /// The level recorded by the last completed transition.
    pub fn current_level(&self) -> LevelIndex {
        self.current
    }

    /// Whether a transition is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            TransitionState::Unloading { .. } | TransitionState::Loading { .. }
        )
    }

    /// Target of the in-flight transition, if any.
    pub fn target(&self) -> Option<LevelIndex> {
        match self.state {
            TransitionState::Unloading { target, .. } | TransitionState::Loading { target, .. } => {
                Some(target)
            }
            _ => None,
        }
    }

    /// Take over a level the loader already has loaded, without reloading it.
    pub fn adopt<L: SceneLoader + ?Sized>(
        &mut self,
        level: LevelIndex,
        loader: &mut L,
    ) -> Result<(), TransitionError> {
        self.check_idle(level)?;
        loader.set_active(level)?;
        tracing::info!(%level, "adopted loaded level");
        self.current = level;
        self.state = TransitionState::Active(level);
        Ok(())
    }

    /// Start a transition to `target`.
    pub fn begin<L: SceneLoader + ?Sized>(
        &mut self,
        target: LevelIndex,
        loader: &mut L,
    ) -> Result<(), TransitionError> {
        self.check_idle(target)?;
        if !loader.knows(target) {
            return Err(TransitionError::UnknownLevel(target));
        }
        if self.current.is_level() {
            let op = loader.unload(self.current)?;
            tracing::debug!(from = %self.current, %target, "unloading previous level");
            self.state = TransitionState::Unloading { target, op };
        } else {
            let op = loader.load_additive(target)?;
            tracing::debug!(%target, "loading level");
            self.state = TransitionState::Loading { target, op };
        }
        Ok(())
    }

    /// Poll the in-flight step and take every step that is ready.
    ///
    /// If the loader rejects a step after the previous level has already been
    /// unloaded, the transition settles with no level recorded.
    pub fn advance<L: SceneLoader + ?Sized>(
        &mut self,
        loader: &mut L,
    ) -> Result<TransitionProgress, TransitionError> {
        loop {
            match self.state {
                TransitionState::Idle(_) | TransitionState::Active(_) => {
                    return Ok(TransitionProgress::Settled);
                }
                TransitionState::Unloading { target, op } => {
                    if !loader.is_done(op) {
                        return Ok(TransitionProgress::Pending);
                    }
                    tracing::debug!(from = %self.current, "previous level unloaded");
                    self.current = LevelIndex::NONE;
                    match loader.load_additive(target) {
                        Ok(op) => self.state = TransitionState::Loading { target, op },
                        Err(err) => {
                            self.state = TransitionState::Idle(LevelIndex::NONE);
                            return Err(err);
                        }
                    }
                }
                TransitionState::Loading { target, op } => {
                    if !loader.is_done(op) {
                        return Ok(TransitionProgress::Pending);
                    }
                    if let Err(err) = loader.set_active(target) {
                        self.state = TransitionState::Idle(LevelIndex::NONE);
                        return Err(err);
                    }
                    tracing::info!(level = %target, "level active");
                    self.current = target;
                    self.state = TransitionState::Active(target);
                    return Ok(TransitionProgress::Completed(target));
                }
            }
        }
    }

    fn check_idle(&self, requested: LevelIndex) -> Result<(), TransitionError> {
        if let Some(current) = self.target() {
            tracing::warn!(%current, %requested, "transition already in progress");
            return Err(TransitionError::InProgress { current, requested });
        }
        if !requested.is_level() {
            return Err(TransitionError::InvalidLevel(requested.0));
        }
        Ok(())
    }
}
