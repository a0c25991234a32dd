use crate::error::CoreError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The directional call of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Ok(Direction::Long),
            "SHORT" => Ok(Direction::Short),
            other => Err(CoreError::Unrecognised {
                kind: "direction",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classification of a signal at a given check interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Win,
    Loss,
    Neutral,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "WIN",
            Outcome::Loss => "LOSS",
            Outcome::Neutral => "NEUTRAL",
        }
    }
}

impl FromStr for Outcome {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WIN" => Ok(Outcome::Win),
            "LOSS" => Ok(Outcome::Loss),
            "NEUTRAL" => Ok(Outcome::Neutral),
            other => Err(CoreError::Unrecognised {
                kind: "outcome",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed offsets from a signal's entry time at which its outcome is checked.
///
/// The variants are declared in firing order, so the derived `Ord` sorts
/// shortest horizon first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CheckInterval {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl CheckInterval {
    /// Every interval a tracked signal is checked at, shortest first.
    pub const ALL: [CheckInterval; 5] = [
        CheckInterval::OneHour,
        CheckInterval::FourHours,
        CheckInterval::OneDay,
        CheckInterval::SevenDays,
        CheckInterval::ThirtyDays,
    ];

    pub fn offset_secs(&self) -> i64 {
        match self {
            CheckInterval::OneHour => 3_600,
            CheckInterval::FourHours => 14_400,
            CheckInterval::OneDay => 86_400,
            CheckInterval::SevenDays => 604_800,
            CheckInterval::ThirtyDays => 2_592_000,
        }
    }

    pub fn offset(&self) -> Duration {
        Duration::seconds(self.offset_secs())
    }

    pub fn label(&self) -> &'static str {
        match self {
            CheckInterval::OneHour => "1h",
            CheckInterval::FourHours => "4h",
            CheckInterval::OneDay => "24h",
            CheckInterval::SevenDays => "7d",
            CheckInterval::ThirtyDays => "30d",
        }
    }
}

impl FromStr for CheckInterval {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        CheckInterval::ALL
            .into_iter()
            .find(|interval| interval.label() == wanted)
            .ok_or_else(|| CoreError::Unrecognised { kind: "interval", value: s.to_string() })
    }
}

impl fmt::Display for CheckInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of a single scheduled check.
///
/// `Pending -> Fired -> {Recorded | Skipped}`, or `Pending -> Cancelled` when the
/// signal is removed before the check fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckState {
    Pending,
    Fired,
    Recorded,
    Skipped,
    Cancelled,
}

impl CheckState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckState::Pending => "PENDING",
            CheckState::Fired => "FIRED",
            CheckState::Recorded => "RECORDED",
            CheckState::Skipped => "SKIPPED",
            CheckState::Cancelled => "CANCELLED",
        }
    }

    /// A terminal check never fires again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckState::Recorded | CheckState::Skipped | CheckState::Cancelled
        )
    }
}

impl FromStr for CheckState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(CheckState::Pending),
            "FIRED" => Ok(CheckState::Fired),
            "RECORDED" => Ok(CheckState::Recorded),
            "SKIPPED" => Ok(CheckState::Skipped),
            "CANCELLED" => Ok(CheckState::Cancelled),
            other => Err(CoreError::Unrecognised {
                kind: "check state",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
