//! Entrustment levels and the half-step milestone scale derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// An observed entrustment rating, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct EntrustmentLevel(u8);

impl EntrustmentLevel {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 5;

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn description(self) -> &'static str {
        match self.0 {
            1 => "I had to do it",
            2 => "I helped a lot",
            3 => "I helped a little",
            4 => "I needed to be there but did not help",
            _ => "I didn't need to be there at all",
        }
    }
}

impl TryFrom<i32> for EntrustmentLevel {
    type Error = ValidationError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::EntrustmentOutOfRange(value))
        }
    }
}

impl From<EntrustmentLevel> for i32 {
    fn from(level: EntrustmentLevel) -> Self {
        i32::from(level.0)
    }
}

impl fmt::Display for EntrustmentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rounds an average rating up to the next half step.
///
/// A trainee is credited a level once their average reaches it, so 3.01
/// reports as 3.5 while 3.0 stays 3.0. Anything at or below zero means no
/// data and maps to 0.
pub fn milestone_level(average_rating: f64) -> f64 {
    if average_rating <= 0.0 || !average_rating.is_finite() {
        return 0.0;
    }
    (average_rating * 2.0).ceil() / 2.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MilestoneLabel {
    NotYetCompleted,
    Level(f64),
    /// Shown on the scale legend; the grid never produces it.
    NotYetAssessable,
}

impl MilestoneLabel {
    pub fn for_level(milestone_level: f64) -> Self {
        if milestone_level <= 0.0 {
            Self::NotYetCompleted
        } else {
            Self::Level(milestone_level)
        }
    }

    /// Legend entries in display order.
    pub fn scale() -> Vec<MilestoneLabel> {
        let mut labels = vec![Self::NotYetCompleted];
        labels.extend((2..=10).map(|half_steps| Self::Level(f64::from(half_steps) / 2.0)));
        labels.push(Self::NotYetAssessable);
        labels
    }
}

impl fmt::Display for MilestoneLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotYetCompleted => write!(f, "Not Yet Completed"),
            Self::NotYetAssessable => write!(f, "Not Yet Assessable"),
            Self::Level(level) if level.fract() == 0.0 => write!(f, "{level:.0}"),
            Self::Level(level) => write!(f, "{level:.1}"),
        }
    }
}
