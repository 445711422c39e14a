/// Upper bound reported while a run is still in flight; 100 is never reported.
pub const MAX_IN_FLIGHT_PROGRESS: f32 = 99.9;

/// Turns playback position into a non-decreasing percentage.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProgressTracker {
    last: f32,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current position and return the percentage to report.
    ///
    /// Sources with an unknown (zero or non-finite) duration report no advance.
    pub fn observe(&mut self, position: f64, duration: f64) -> f32 {
        let raw = if duration.is_finite() && duration > 0.0 && position.is_finite() {
            (position / duration * 100.0) as f32
        } else {
            0.0
        };
        let value = raw.clamp(0.0, MAX_IN_FLIGHT_PROGRESS);
        self.last = self.last.max(value);
        self.last
    }

    pub fn last(&self) -> f32 {
        self.last
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/progress.rs"]
mod tests;
