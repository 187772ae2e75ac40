use std::cmp::Ordering;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDate;
use tracing::trace;

use crate::task::Task;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum SortKey {
  Time,
  Importance
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum SortDirection {
  Asc,
  Desc
}

impl SortDirection {
  pub fn apply(
    self,
    ordering: Ordering
  ) -> Ordering {
    match self {
      | SortDirection::Asc => ordering,
      | SortDirection::Desc => {
        ordering.reverse()
      }
    }
  }
}

impl FromStr for SortKey {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "time" | "start" => {
        Ok(SortKey::Time)
      }
      | "importance" | "imp" => {
        Ok(SortKey::Importance)
      }
      | other => {
        Err(anyhow!(
          "unknown sort key: {other}"
        ))
      }
    }
  }
}

impl FromStr for SortDirection {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "asc" | "+" => {
        Ok(SortDirection::Asc)
      }
      | "desc" | "-" => {
        Ok(SortDirection::Desc)
      }
      | other => {
        Err(anyhow!(
          "unknown sort direction: \
           {other}"
        ))
      }
    }
  }
}

fn compare_on_key(
  a: &Task,
  b: &Task,
  key: SortKey
) -> Ordering {
  match key {
    | SortKey::Time => {
      a.start_time
        .to_string()
        .cmp(&b.start_time.to_string())
    }
    | SortKey::Importance => {
      a.importance
        .rank()
        .cmp(&b.importance.rank())
    }
  }
}

/// The tasks of `date`, ordered by `key`. Ties keep no particular order.
#[tracing::instrument(skip(tasks))]
pub fn sorted_tasks(
  tasks: &[Task],
  date: NaiveDate,
  key: SortKey,
  direction: SortDirection
) -> Vec<Task> {
  let mut out: Vec<Task> = tasks
    .iter()
    .filter(|task| task.date == date)
    .cloned()
    .collect();

  out.sort_unstable_by(|a, b| {
    direction.apply(compare_on_key(
      a, b, key
    ))
  });

  trace!(
    input = tasks.len(),
    output = out.len(),
    "sorted tasks"
  );
  out
}
