use crate::error::{MabatakiError, MabatakiResult};

/// Visual state of the eyes in one animation frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeState {
    Open,
    Half,
    Closed,
}

/// One timed visual state. Immutable value; durations are milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Frame {
    pub state: EyeState,
    pub duration_ms: f64,
}

/// Durable identity of a step inside a pattern, distinct from its position.
/// Survives reorder and field edits; assigned by the owning [`LoopPattern`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct StepId(pub u64);

/// The id-less serde form of a step: preset catalog entries and pattern files
/// use this shape. `closed_hold` may be omitted and defaults to zero.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StepSpec {
    pub blink_count: u32,
    pub blink_speed: f64,
    pub blink_interval: f64,
    pub pause_duration: f64,
    #[serde(default)]
    pub closed_hold: f64,
}

/// One timing unit of a pattern: `blink_count` blinks followed by a pause.
/// All durations are seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopStep {
    pub id: StepId,
    pub blink_count: u32,
    pub blink_speed: f64,
    pub blink_interval: f64,
    pub pause_duration: f64,
    pub closed_hold: f64,
}

impl LoopStep {
    fn from_spec(id: StepId, spec: StepSpec) -> Self {
        Self {
            id,
            blink_count: spec.blink_count,
            blink_speed: spec.blink_speed,
            blink_interval: spec.blink_interval,
            pause_duration: spec.pause_duration,
            closed_hold: spec.closed_hold,
        }
    }

    pub fn spec(&self) -> StepSpec {
        StepSpec {
            blink_count: self.blink_count,
            blink_speed: self.blink_speed,
            blink_interval: self.blink_interval,
            pause_duration: self.pause_duration,
            closed_hold: self.closed_hold,
        }
    }

    /// Requested wall-clock length of the step. Independent of the frame
    /// durations actually emitted; the loop generator accumulates this value
    /// to decide when the animation length is covered.
    pub fn nominal_duration(&self) -> f64 {
        self.blink_speed * self.blink_count as f64
            + self.blink_interval * (self.blink_count as f64 - 1.0)
            + self.pause_duration
            + self.closed_hold
    }

    pub fn validate(&self) -> MabatakiResult<()> {
        if self.blink_count == 0 {
            return Err(MabatakiError::validation("blink_count must be >= 1"));
        }
        if !(self.blink_speed.is_finite() && self.blink_speed > 0.0) {
            return Err(MabatakiError::validation("blink_speed must be > 0 seconds"));
        }
        for (name, value) in [
            ("blink_interval", self.blink_interval),
            ("pause_duration", self.pause_duration),
            ("closed_hold", self.closed_hold),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(MabatakiError::validation(format!(
                    "{name} must be a finite non-negative number of seconds"
                )));
            }
        }
        Ok(())
    }
}

/// Ordered, non-empty sequence of steps. Step order is the animation
/// phrasing; step ids are stable across reorder and edits.
#[derive(Clone, Debug)]
pub struct LoopPattern {
    steps: Vec<LoopStep>,
    next_id: u64,
}

impl LoopPattern {
    /// Build a pattern from id-less specs, assigning fresh ids. Selecting a
    /// preset goes through here, so later edits never touch the catalog.
    pub fn from_specs(specs: &[StepSpec]) -> MabatakiResult<Self> {
        if specs.is_empty() {
            return Err(MabatakiError::validation(
                "a pattern must contain at least one step",
            ));
        }
        let mut pattern = Self {
            steps: Vec::with_capacity(specs.len()),
            next_id: 0,
        };
        for spec in specs {
            pattern.push_spec(*spec);
        }
        pattern.validate()?;
        Ok(pattern)
    }

    pub fn steps(&self) -> &[LoopStep] {
        &self.steps
    }

    pub fn specs(&self) -> Vec<StepSpec> {
        self.steps.iter().map(LoopStep::spec).collect()
    }

    /// Append a step and return its freshly assigned id.
    pub fn push_spec(&mut self, spec: StepSpec) -> StepId {
        let id = StepId(self.next_id);
        self.next_id += 1;
        self.steps.push(LoopStep::from_spec(id, spec));
        id
    }

    /// Remove a step by id. Removing the last remaining step is rejected.
    pub fn remove_step(&mut self, id: StepId) -> MabatakiResult<()> {
        if self.steps.len() <= 1 {
            return Err(MabatakiError::validation(
                "a pattern must keep at least one step",
            ));
        }
        let index = self
            .steps
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| MabatakiError::validation(format!("no step with id {}", id.0)))?;
        self.steps.remove(index);
        Ok(())
    }

    /// Field-wise in-place mutation; identity is preserved.
    pub fn step_mut(&mut self, id: StepId) -> Option<&mut LoopStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Move a step to `new_index`, keeping its id.
    pub fn move_step(&mut self, id: StepId, new_index: usize) -> MabatakiResult<()> {
        let index = self
            .steps
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| MabatakiError::validation(format!("no step with id {}", id.0)))?;
        if new_index >= self.steps.len() {
            return Err(MabatakiError::validation("step index out of bounds"));
        }
        let step = self.steps.remove(index);
        self.steps.insert(new_index, step);
        Ok(())
    }

    pub fn nominal_duration(&self) -> f64 {
        self.steps.iter().map(LoopStep::nominal_duration).sum()
    }

    pub fn validate(&self) -> MabatakiResult<()> {
        if self.steps.is_empty() {
            return Err(MabatakiError::validation(
                "a pattern must contain at least one step",
            ));
        }
        for step in &self.steps {
            step.validate()?;
        }
        Ok(())
    }
}

/// Global generation settings.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlinkSettings {
    pub fps: u32,
    /// Target animation length in seconds.
    pub animation_length: f64,
}

impl Default for BlinkSettings {
    fn default() -> Self {
        Self {
            fps: 24,
            animation_length: 10.0,
        }
    }
}

impl BlinkSettings {
    pub fn frame_duration_ms(&self) -> f64 {
        1000.0 / self.fps as f64
    }

    pub fn validate(&self) -> MabatakiResult<()> {
        if self.fps == 0 {
            return Err(MabatakiError::validation("fps must be >= 1"));
        }
        if !(self.animation_length.is_finite() && self.animation_length >= 0.0) {
            return Err(MabatakiError::validation(
                "animation_length must be a finite non-negative number of seconds",
            ));
        }
        Ok(())
    }
}
