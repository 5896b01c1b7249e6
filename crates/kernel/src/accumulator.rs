/// Converts a continuous rate into whole events per tick without drift.
///
/// Fractional progress carries over between ticks, so the total number of
/// events over an interval depends only on the interval, not on how it is
/// split into ticks. The carried remainder is always in `[0, 1)` after a call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateAccumulator {
    progress: f64,
}

impl RateAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Carried fractional progress.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Add `dt * rate` and return how many whole events are now due.
    ///
    /// Non-finite or negative steps add nothing. The count saturates at
    /// `u64::MAX`.
    pub fn accumulate(&mut self, dt: f64, rate: f64) -> u64 {
        let step = dt * rate;
        if step.is_finite() && step > 0.0 {
            self.progress += step;
        }
        let due = self.progress.floor();
        self.progress -= due;
        due as u64
    }
}
