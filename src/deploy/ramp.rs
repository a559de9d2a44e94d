// ABOUTME: Traffic ramp policy: the ordered split steps of a cutover.
// ABOUTME: Pure data and lookups, no I/O; validated on construction.

use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One stop on the way from the active color to the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RampStep {
    /// Share of traffic on the candidate color once this step is applied.
    pub percent: u8,

    /// Total time spent on this step before moving to the next one.
    #[serde(with = "humantime_serde")]
    pub step_duration: Duration,

    /// Leading part of `step_duration` during which the split is re-observed.
    #[serde(with = "humantime_serde")]
    pub validation_duration: Duration,
}

impl RampStep {
    pub fn new(percent: u8, step_duration: Duration, validation_duration: Duration) -> Self {
        Self {
            percent,
            step_duration,
            validation_duration,
        }
    }

    /// Time left on the step once the validation hold is over.
    pub fn settle_duration(&self) -> Duration {
        self.step_duration.saturating_sub(self.validation_duration)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RampError {
    #[error("traffic ramp needs at least one step")]
    Empty,

    #[error("ramp step {index}: percent must be between 1 and 100, got {percent}")]
    PercentOutOfRange { index: usize, percent: u8 },

    #[error("ramp step {index}: percentages must strictly increase")]
    NotIncreasing { index: usize },

    #[error("traffic ramp must end at 100 percent, last step is {last}")]
    DoesNotReachFull { last: u8 },

    #[error("ramp step {index}: validation duration exceeds step duration")]
    ValidationExceedsStep { index: usize },
}

/// Ordered traffic-split steps ending with the candidate taking all traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<RampStep>", into = "Vec<RampStep>")]
pub struct TrafficRamp {
    steps: NonEmpty<RampStep>,
}

impl TrafficRamp {
    /// Candidate percentages of the standard ramp (90/10 through 0/100).
    pub const STANDARD_PERCENTAGES: [u8; 6] = [10, 25, 50, 75, 90, 100];

    pub fn new(steps: Vec<RampStep>) -> Result<Self, RampError> {
        let steps = NonEmpty::from_vec(steps).ok_or(RampError::Empty)?;

        let mut previous = 0u8;
        for (index, step) in steps.iter().enumerate() {
            if step.percent == 0 || step.percent > 100 {
                return Err(RampError::PercentOutOfRange {
                    index,
                    percent: step.percent,
                });
            }
            if step.percent <= previous {
                return Err(RampError::NotIncreasing { index });
            }
            if step.validation_duration > step.step_duration {
                return Err(RampError::ValidationExceedsStep { index });
            }
            previous = step.percent;
        }

        if previous != 100 {
            return Err(RampError::DoesNotReachFull { last: previous });
        }

        Ok(Self { steps })
    }

    /// The standard six-step ramp with uniform durations.
    pub fn standard(step_duration: Duration, validation_duration: Duration) -> Self {
        let validation_duration = validation_duration.min(step_duration);
        let steps = Self::STANDARD_PERCENTAGES
            .iter()
            .map(|&p| RampStep::new(p, step_duration, validation_duration))
            .collect::<Vec<_>>();
        let steps = NonEmpty::from_vec(steps).unwrap_or_else(|| {
            NonEmpty::new(RampStep::new(100, step_duration, validation_duration))
        });
        Self { steps }
    }

    pub fn steps(&self) -> &NonEmpty<RampStep> {
        &self.steps
    }

    /// Index of the first step at or above `initial_percent`.
    ///
    /// Falls back to the first step when no step qualifies.
    pub fn start_index(&self, initial_percent: u8) -> usize {
        self.steps
            .iter()
            .position(|s| s.percent >= initial_percent)
            .unwrap_or(0)
    }

    /// The step at `index` and whether it is the last one.
    pub fn step(&self, index: usize) -> Option<(&RampStep, bool)> {
        self.steps
            .get(index)
            .map(|step| (step, index + 1 == self.steps.len()))
    }

    /// The step after `current`, with its index and whether it is the last one.
    pub fn next_step(&self, current: usize) -> Option<(usize, &RampStep, bool)> {
        let next = current + 1;
        self.step(next).map(|(step, is_last)| (next, step, is_last))
    }
}

impl Default for TrafficRamp {
    fn default() -> Self {
        Self::standard(Duration::from_secs(300), Duration::from_secs(120))
    }
}

impl TryFrom<Vec<RampStep>> for TrafficRamp {
    type Error = RampError;

    fn try_from(steps: Vec<RampStep>) -> Result<Self, Self::Error> {
        TrafficRamp::new(steps)
    }
}

impl From<TrafficRamp> for Vec<RampStep> {
    fn from(ramp: TrafficRamp) -> Self {
        ramp.steps.into()
    }
}
