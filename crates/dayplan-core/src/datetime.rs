use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::error::ValidationError;

pub const DATE_KEY_FORMAT: &str =
  "%Y-%m-%d";
const DAY_LABEL_FORMAT: &str = "%b %-d";
const TIMEZONE_CONFIG_FILE: &str =
  "dayplan-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "DAYPLAN_TIMEZONE";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Reduces a date or datetime string to its calendar day.
#[tracing::instrument(level = "trace")]
pub fn normalize_date(
  input: &str
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token,
      DATE_KEY_FORMAT
    )
  {
    return Ok(date);
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.date_naive());
  }

  for fmt in
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Ok(ndt.date());
    }
  }

  Err(
    ValidationError::InvalidDate(
      token.to_string()
    )
    .into()
  )
}

#[must_use]
pub fn format_date_key(
  date: NaiveDate
) -> String {
  date
    .format(DATE_KEY_FORMAT)
    .to_string()
}

/// Short chart label, e.g. `Oct 3`.
#[must_use]
pub fn format_day_label(
  date: NaiveDate
) -> String {
  date
    .format(DAY_LABEL_FORMAT)
    .to_string()
}

pub fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  static CLOCK_RE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  let clock_re = CLOCK_RE
    .get_or_init(|| {
      Regex::new(
        r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$",
      )
      .ok()
    })
    .as_ref()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    let ampm = ampm_match
      .as_str()
      .to_ascii_lowercase();
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    match ampm.as_str() {
      | "am" => {
        if raw_hour == 12 {
          0
        } else {
          raw_hour
        }
      }
      | "pm" => {
        if raw_hour == 12 {
          12
        } else {
          raw_hour + 12
        }
      }
      | _ => return None
    }
  } else {
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  Some((hour, minute))
}

pub fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" => {
      Some(Weekday::Thu)
    }
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

pub fn start_of_week(
  day: NaiveDate,
  week_start: Weekday
) -> NaiveDate {
  let day_idx = day
    .weekday()
    .num_days_from_monday()
    as i64;
  let start_idx = week_start
    .num_days_from_monday()
    as i64;
  let diff =
    (7 + day_idx - start_idx) % 7;
  add_days(day, -diff)
}

pub fn end_of_week(
  day: NaiveDate,
  week_start: Weekday
) -> NaiveDate {
  add_days(
    start_of_week(day, week_start),
    6
  )
}

pub fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

pub fn last_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  add_days(
    first_day_of_month(
      next_year, next_month
    ),
    -1
  )
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  last_day_of_month(year, month).day()
}

pub fn shift_months(
  date: NaiveDate,
  months: i32
) -> NaiveDate {
  let mut year = date.year();
  let mut month =
    date.month() as i32 + months;

  while month < 1 {
    month += 12;
    year = year.saturating_sub(1);
  }
  while month > 12 {
    month -= 12;
    year = year.saturating_add(1);
  }

  let month = month as u32;
  let day = date
    .day()
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .unwrap_or(date)
}

/// Every day from `start` to `end`, both inclusive. Empty when `end` precedes
/// `start`.
pub fn each_day(
  start: NaiveDate,
  end: NaiveDate
) -> Vec<NaiveDate> {
  start
    .iter_days()
    .take_while(|day| *day <= end)
    .collect()
}

pub fn today_in(
  timezone: Tz
) -> NaiveDate {
  Utc::now()
    .with_timezone(&timezone)
    .date_naive()
}

/// Picks the planner timezone: `DAYPLAN_TIMEZONE`, then the configured value,
/// then `dayplan-time.toml` in the data directory, else UTC.
pub fn resolve_timezone(
  configured: Option<&str>,
  data_dir: &Path
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(
        &raw,
        TIMEZONE_ENV_VAR
      )
  {
    return tz;
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "config")
  {
    return tz;
  }

  if let Some(tz) =
    load_timezone_from_file(
      &data_dir
        .join(TIMEZONE_CONFIG_FILE)
    )
  {
    return tz;
  }

  chrono_tz::UTC
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured planner timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    Weekday
  };
  use tempfile::tempdir;

  use super::{
    each_day,
    end_of_week,
    format_day_label,
    last_day_of_month,
    load_timezone_from_file,
    normalize_date,
    parse_clock_time,
    shift_months,
    start_of_week
  };

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn normalizes_date_and_datetime_inputs()
   {
    assert_eq!(
      normalize_date("2026-10-14")
        .expect("plain date"),
      date(2026, 10, 14)
    );
    assert_eq!(
      normalize_date(
        "2026-10-14T21:30:00Z"
      )
      .expect("rfc3339"),
      date(2026, 10, 14)
    );
    assert_eq!(
      normalize_date(
        " 2026-10-14T08:15:00 "
      )
      .expect("naive datetime"),
      date(2026, 10, 14)
    );
    assert!(
      normalize_date("14/10/2026")
        .is_err()
    );
  }

  #[test]
  fn parses_clock_time() {
    assert_eq!(
      parse_clock_time("09:30"),
      Some((9, 30))
    );
    assert_eq!(
      parse_clock_time("12:05pm"),
      Some((12, 5))
    );
    assert_eq!(
      parse_clock_time("25:00"),
      None
    );
    assert_eq!(
      parse_clock_time("9:60"),
      None
    );
  }

  #[test]
  fn week_bounds_follow_week_start() {
    let wednesday = date(2026, 10, 14);
    assert_eq!(
      start_of_week(
        wednesday,
        Weekday::Sun
      ),
      date(2026, 10, 11)
    );
    assert_eq!(
      start_of_week(
        wednesday,
        Weekday::Mon
      ),
      date(2026, 10, 12)
    );
    assert_eq!(
      end_of_week(
        wednesday,
        Weekday::Sun
      ),
      date(2026, 10, 17)
    );
  }

  #[test]
  fn month_arithmetic_clamps_day() {
    assert_eq!(
      last_day_of_month(2028, 2),
      date(2028, 2, 29)
    );
    assert_eq!(
      shift_months(
        date(2026, 1, 31),
        1
      ),
      date(2026, 2, 28)
    );
    assert_eq!(
      shift_months(
        date(2026, 1, 15),
        -1
      ),
      date(2025, 12, 15)
    );
  }

  #[test]
  fn each_day_is_inclusive() {
    let days = each_day(
      date(2026, 2, 27),
      date(2026, 3, 2)
    );
    assert_eq!(days.len(), 4);
    assert_eq!(days[0], date(2026, 2, 27));
    assert_eq!(days[3], date(2026, 3, 2));
    assert!(
      each_day(
        date(2026, 3, 2),
        date(2026, 3, 1)
      )
      .is_empty()
    );
  }

  #[test]
  fn day_label_uses_short_month() {
    assert_eq!(
      format_day_label(date(2026, 10, 3)),
      "Oct 3"
    );
  }

  #[test]
  fn reads_timezone_from_toml_section() {
    let temp =
      tempdir().expect("tempdir");
    let path =
      temp.path().join("tz.toml");
    std::fs::write(
      &path,
      "[time]\ntimezone = \"Europe/Berlin\"\n"
    )
    .expect("write tz file");
    assert_eq!(
      load_timezone_from_file(&path),
      Some(chrono_tz::Europe::Berlin)
    );
  }
}
