// ABOUTME: Traffic distribution between the blue and green environments.
// ABOUTME: The two percentages always sum to 100; invalid splits cannot be constructed.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::Color;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("traffic split must sum to 100, got blue={blue} green={green}")]
pub struct TrafficSplitError {
    pub blue: u16,
    pub green: u16,
}

/// A `(blue%, green%)` weight pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSplit", into = "RawSplit")]
pub struct TrafficSplit {
    blue: u8,
    green: u8,
}

impl TrafficSplit {
    pub fn new(blue: u8, green: u8) -> Result<Self, TrafficSplitError> {
        if u16::from(blue) + u16::from(green) != 100 {
            return Err(TrafficSplitError {
                blue: blue.into(),
                green: green.into(),
            });
        }
        Ok(Self { blue, green })
    }

    /// Every request routed to `color`.
    pub fn all_on(color: Color) -> Self {
        Self::toward(color, 100)
    }

    /// `percent` (clamped to 100) routed to `color`, the rest to the other color.
    pub fn toward(color: Color, percent: u8) -> Self {
        let percent = percent.min(100);
        match color {
            Color::Blue => Self {
                blue: percent,
                green: 100 - percent,
            },
            Color::Green => Self {
                blue: 100 - percent,
                green: percent,
            },
        }
    }

    pub fn blue(&self) -> u8 {
        self.blue
    }

    pub fn green(&self) -> u8 {
        self.green
    }

    pub fn percent_for(&self, color: Color) -> u8 {
        match color {
            Color::Blue => self.blue,
            Color::Green => self.green,
        }
    }

    /// Percentage points moved between two distributions.
    pub fn shifted_from(&self, previous: &TrafficSplit) -> u8 {
        self.green.abs_diff(previous.green)
    }
}

impl fmt::Display for TrafficSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.blue, self.green)
    }
}

#[derive(Serialize, Deserialize)]
struct RawSplit {
    blue: u8,
    green: u8,
}

impl TryFrom<RawSplit> for TrafficSplit {
    type Error = TrafficSplitError;

    fn try_from(raw: RawSplit) -> Result<Self, Self::Error> {
        TrafficSplit::new(raw.blue, raw.green)
    }
}

impl From<TrafficSplit> for RawSplit {
    fn from(split: TrafficSplit) -> Self {
        RawSplit {
            blue: split.blue,
            green: split.green,
        }
    }
}
