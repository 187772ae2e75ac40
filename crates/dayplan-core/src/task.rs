use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::datetime::parse_clock_time;
use crate::error::ValidationError;

/// Wall-clock time within a single day, `00:00..=23:59`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    hour: u32,
    minute: u32,
}

impl ClockTime {
    pub fn new(hour: u32, minute: u32) -> Result<Self, ValidationError> {
        if hour > 23 || minute > 59 {
            return Err(ValidationError::InvalidClockTime(format!(
                "{hour}:{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        self.hour * 60 + self.minute
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) =
            parse_clock_time(s).ok_or_else(|| ValidationError::InvalidClockTime(s.to_string()))?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

/// Four-level importance scale, least to most important.
///
/// The canonical encoding is the numeric ordinal (`0..=3`). The older string
/// names are still accepted when decoding so rows written by either schema
/// load into the same type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "RawImportance", into = "u8")]
pub enum Importance {
    LessImportant,
    MildlyImportant,
    #[default]
    Important,
    VeryImportant,
}

impl Importance {
    pub const ALL: [Importance; 4] = [
        Importance::LessImportant,
        Importance::MildlyImportant,
        Importance::Important,
        Importance::VeryImportant,
    ];

    pub fn ordinal(self) -> u8 {
        match self {
            Importance::LessImportant => 0,
            Importance::MildlyImportant => 1,
            Importance::Important => 2,
            Importance::VeryImportant => 3,
        }
    }

    /// Sort rank, `1` for the least important level up to `4`.
    pub fn rank(self) -> u8 {
        self.ordinal() + 1
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// Maps a slider position in `[0, 1]` onto a level.
    pub fn from_fraction(value: f64) -> Self {
        if value <= 0.25 {
            Importance::LessImportant
        } else if value <= 0.5 {
            Importance::MildlyImportant
        } else if value <= 0.75 {
            Importance::Important
        } else {
            Importance::VeryImportant
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Importance::LessImportant => "less-important",
            Importance::MildlyImportant => "mildly-important",
            Importance::Important => "important",
            Importance::VeryImportant => "very-important",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Importance::LessImportant => "Less Important",
            Importance::MildlyImportant => "Mildly Important",
            Importance::Important => "Important",
            Importance::VeryImportant => "Very Important",
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Importance {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase().replace([' ', '_'], "-");
        if let Ok(ordinal) = token.parse::<u8>() {
            return Self::from_ordinal(ordinal)
                .ok_or_else(|| ValidationError::UnknownImportance(s.to_string()));
        }
        match token.as_str() {
            "less-important" | "less" | "low" => Ok(Importance::LessImportant),
            "mildly-important" | "mild" | "medium" => Ok(Importance::MildlyImportant),
            "important" | "high" => Ok(Importance::Important),
            "very-important" | "very" | "critical" => Ok(Importance::VeryImportant),
            _ => Err(ValidationError::UnknownImportance(s.to_string())),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawImportance {
    Ordinal(u8),
    Name(String),
}

impl TryFrom<RawImportance> for Importance {
    type Error = ValidationError;

    fn try_from(value: RawImportance) -> Result<Self, Self::Error> {
        match value {
            RawImportance::Ordinal(ordinal) => Self::from_ordinal(ordinal)
                .ok_or_else(|| ValidationError::UnknownImportance(ordinal.to_string())),
            RawImportance::Name(name) => name.parse(),
        }
    }
}

impl From<Importance> for u8 {
    fn from(value: Importance) -> Self {
        value.ordinal()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub text: String,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub date: NaiveDate,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub importance: Importance,
}

impl Task {
    pub fn new(
        id: u64,
        text: impl Into<String>,
        start_time: ClockTime,
        end_time: ClockTime,
        date: NaiveDate,
        importance: Importance,
    ) -> Result<Self, ValidationError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }
        validate_time_range(start_time, end_time)?;
        Ok(Self {
            id,
            text,
            start_time,
            end_time,
            date,
            completed: false,
            importance,
        })
    }

    pub fn duration_minutes(&self) -> u32 {
        self.end_time
            .minutes_since_midnight()
            .saturating_sub(self.start_time.minutes_since_midnight())
    }

    pub fn toggled(&self) -> Self {
        Self {
            completed: !self.completed,
            ..self.clone()
        }
    }
}

/// User input for a task that has not been assigned an id or a bucket yet.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub text: String,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub importance: Importance,
}

impl TaskDraft {
    pub fn into_task(self, id: u64, date: NaiveDate) -> Result<Task, ValidationError> {
        Task::new(
            id,
            self.text,
            self.start_time,
            self.end_time,
            date,
            self.importance,
        )
    }
}

pub fn validate_time_range(start: ClockTime, end: ClockTime) -> Result<(), ValidationError> {
    if end <= start {
        return Err(ValidationError::InvalidTimeRange { start, end });
    }
    Ok(())
}
