use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Eye {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
}

impl FromStr for Eye {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L" => Ok(Eye::Left),
            "R" => Ok(Eye::Right),
            other => Err(format!("unknown eye side {other:?}")),
        }
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Eye::Left => "L",
            Eye::Right => "R",
        })
    }
}

/// A fixation as segmented by the eye-tracker, in eye-tracker samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixation {
    pub eye: Eye,
    pub start: i64,
    pub end: i64,
    pub duration: i64,
    pub x_avg: f64,
    pub y_avg: f64,
    pub pupil: i64,
}

impl Fixation {
    pub fn position(&self) -> (f64, f64) {
        (self.x_avg, self.y_avg)
    }
}

/// A discrete event marker in one clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub sample: i64,
    pub code: i32,
}

/// An event decoded from the MEG stimulus channel, laid out like a row of an
/// MNE events array: `[sample, previous value, new value]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MegEvent {
    pub sample: i64,
    pub previous: i32,
    pub code: i32,
}

impl MegEvent {
    pub fn new(sample: i64, code: i32) -> Self {
        Self {
            sample,
            previous: 0,
            code,
        }
    }
}

impl From<MegEvent> for Trigger {
    fn from(e: MegEvent) -> Self {
        Trigger {
            sample: e.sample,
            code: e.code,
        }
    }
}

/// Sample indices of all triggers carrying `code`, in stream order.
pub fn samples_with_code<I>(triggers: I, code: i32) -> Vec<i64>
where
    I: IntoIterator<Item = Trigger>,
{
    triggers
        .into_iter()
        .filter(|t| t.code == code)
        .map(|t| t.sample)
        .collect()
}
