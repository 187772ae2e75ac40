use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::datetime::{add_days, each_day, format_day_label};
use crate::store::TasksByDate;
use crate::task::{Importance, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Today,
    Week,
    Month,
}

impl TimeWindow {
    pub fn cutoff(self, today: NaiveDate) -> NaiveDate {
        match self {
            TimeWindow::Today => today,
            TimeWindow::Week => add_days(today, -7),
            TimeWindow::Month => add_days(today, -30),
        }
    }

    /// Every Nth day of the window is charted.
    pub fn sample_stride(self) -> usize {
        match self {
            TimeWindow::Today | TimeWindow::Week => 1,
            TimeWindow::Month => 3,
        }
    }

    pub fn contains(self, date: NaiveDate, today: NaiveDate) -> bool {
        match self {
            TimeWindow::Today => date == today,
            TimeWindow::Week | TimeWindow::Month => date >= self.cutoff(today),
        }
    }

    /// The days whose buckets feed the daily series, cutoff to today.
    pub fn days(self, today: NaiveDate) -> Vec<NaiveDate> {
        each_day(self.cutoff(today), today)
    }
}

impl FromStr for TimeWindow {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" | "daily" | "day" => Ok(TimeWindow::Today),
            "week" | "weekly" => Ok(TimeWindow::Week),
            "month" | "monthly" => Ok(TimeWindow::Month),
            other => Err(anyhow!("unknown time window: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCompletion {
    pub label: String,
    pub date: NaiveDate,
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub window: TimeWindow,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub completion_rate: f64,
    pub importance_distribution: BTreeMap<Importance, usize>,
    pub daily_completion: Vec<DailyCompletion>,
    pub average_completion_rate: f64,
}

impl MetricsSnapshot {
    /// Share of the window's tasks at `level`, as a percentage.
    pub fn importance_share(&self, level: Importance) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        let count = self
            .importance_distribution
            .get(&level)
            .copied()
            .unwrap_or(0);
        count as f64 / self.total_tasks as f64 * 100.0
    }
}

#[tracing::instrument(skip(tasks_by_date), fields(buckets = tasks_by_date.len()))]
pub fn compute_metrics(
    tasks_by_date: &TasksByDate,
    window: TimeWindow,
    today: NaiveDate,
) -> MetricsSnapshot {
    let in_window: Vec<&Task> = tasks_by_date
        .iter()
        .filter(|(date, _)| window.contains(**date, today))
        .flat_map(|(_, tasks)| tasks.iter())
        .collect();

    let total_tasks = in_window.len();
    let completed_tasks = in_window.iter().filter(|task| task.completed).count();
    let completion_rate = if total_tasks > 0 {
        round_one_decimal(completed_tasks as f64 / total_tasks as f64 * 100.0)
    } else {
        0.0
    };

    let mut importance_distribution: BTreeMap<Importance, usize> =
        Importance::ALL.iter().map(|level| (*level, 0)).collect();
    for task in &in_window {
        *importance_distribution.entry(task.importance).or_insert(0) += 1;
    }

    let stride = window.sample_stride();
    let daily_completion: Vec<DailyCompletion> = window
        .days(today)
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| idx % stride == 0)
        .map(|(_, date)| {
            let day_tasks = tasks_by_date.get(&date).map(Vec::as_slice).unwrap_or(&[]);
            DailyCompletion {
                label: format_day_label(date),
                date,
                completed: day_tasks.iter().filter(|task| task.completed).count(),
                total: day_tasks.len(),
            }
        })
        .collect();

    let (rate_sum, rated_days) = daily_completion
        .iter()
        .filter(|day| day.total > 0)
        .fold((0.0, 0_usize), |(sum, count), day| {
            (sum + day.completed as f64 / day.total as f64 * 100.0, count + 1)
        });
    let average_completion_rate = if rated_days > 0 {
        rate_sum / rated_days as f64
    } else {
        0.0
    };

    debug!(
        total_tasks,
        completed_tasks,
        points = daily_completion.len(),
        "computed metrics"
    );

    MetricsSnapshot {
        window,
        total_tasks,
        completed_tasks,
        completion_rate,
        importance_distribution,
        daily_completion,
        average_completion_rate,
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).expect("valid date")
    }

    fn task(id: u64, on: NaiveDate, completed: bool, importance: Importance) -> Task {
        let mut task = Task::new(
            id,
            format!("task {id}"),
            "09:00".parse().expect("start"),
            "10:00".parse().expect("end"),
            on,
            importance,
        )
        .expect("valid task");
        task.completed = completed;
        task
    }

    #[test]
    fn today_scenario_counts_and_rate() {
        let today = day(10, 14);
        let mut by_date = TasksByDate::new();
        by_date.insert(
            today,
            vec![
                task(1, today, false, Importance::VeryImportant),
                task(2, today, true, Importance::MildlyImportant),
            ],
        );
        by_date.insert(day(10, 13), vec![task(3, day(10, 13), true, Importance::Important)]);

        let snapshot = compute_metrics(&by_date, TimeWindow::Today, today);
        assert_eq!(snapshot.total_tasks, 2);
        assert_eq!(snapshot.completed_tasks, 1);
        assert_eq!(snapshot.completion_rate, 50.0);
        assert_eq!(snapshot.daily_completion.len(), 1);
        assert_eq!(snapshot.daily_completion[0].label, "Oct 14");
        assert_eq!(snapshot.average_completion_rate, 50.0);
    }

    #[test]
    fn empty_window_has_zero_rates() {
        let snapshot = compute_metrics(&TasksByDate::new(), TimeWindow::Month, day(10, 14));
        assert_eq!(snapshot.total_tasks, 0);
        assert_eq!(snapshot.completion_rate, 0.0);
        assert_eq!(snapshot.average_completion_rate, 0.0);
        assert_eq!(snapshot.importance_share(Importance::Important), 0.0);
        assert_eq!(snapshot.importance_distribution.len(), 4);
        assert!(snapshot.importance_distribution.values().all(|count| *count == 0));
    }

    #[test]
    fn completion_rate_rounds_to_one_decimal() {
        let today = day(10, 14);
        let mut by_date = TasksByDate::new();
        by_date.insert(
            today,
            vec![
                task(1, today, true, Importance::Important),
                task(2, today, false, Importance::Important),
                task(3, today, false, Importance::Important),
            ],
        );
        let snapshot = compute_metrics(&by_date, TimeWindow::Week, today);
        assert_eq!(snapshot.completion_rate, 33.3);
        assert!((0.0..=100.0).contains(&snapshot.completion_rate));
    }

    #[test]
    fn week_window_uses_trailing_cutoff() {
        let today = day(10, 14);
        let mut by_date = TasksByDate::new();
        by_date.insert(day(10, 7), vec![task(1, day(10, 7), true, Importance::Important)]);
        by_date.insert(day(10, 6), vec![task(2, day(10, 6), true, Importance::Important)]);

        let snapshot = compute_metrics(&by_date, TimeWindow::Week, today);
        assert_eq!(snapshot.total_tasks, 1);
        assert_eq!(snapshot.daily_completion.len(), 8);
        assert_eq!(snapshot.daily_completion[0].date, day(10, 7));
        assert_eq!(snapshot.daily_completion[0].completed, 1);
        assert_eq!(snapshot.daily_completion[7].total, 0);
    }

    #[test]
    fn month_series_samples_every_third_day() {
        let today = day(10, 14);
        let snapshot = compute_metrics(&TasksByDate::new(), TimeWindow::Month, today);
        // 31 days from Sep 14 to Oct 14 inclusive, indices 0, 3, ..., 30.
        assert_eq!(snapshot.daily_completion.len(), 11);
        assert_eq!(snapshot.daily_completion[0].date, day(9, 14));
        assert_eq!(snapshot.daily_completion[1].date, day(9, 17));
        assert_eq!(snapshot.daily_completion[10].date, today);
    }

    #[test]
    fn average_ignores_days_without_tasks() {
        let today = day(10, 14);
        let mut by_date = TasksByDate::new();
        by_date.insert(
            day(10, 12),
            vec![
                task(1, day(10, 12), true, Importance::Important),
                task(2, day(10, 12), false, Importance::Important),
            ],
        );
        by_date.insert(today, vec![task(3, today, true, Importance::Important)]);

        let snapshot = compute_metrics(&by_date, TimeWindow::Week, today);
        assert_eq!(snapshot.average_completion_rate, 75.0);
        assert_eq!(snapshot.completion_rate, 66.7);
    }

    #[test]
    fn distribution_counts_each_level() {
        let today = day(10, 14);
        let mut by_date = TasksByDate::new();
        by_date.insert(
            today,
            vec![
                task(1, today, false, Importance::VeryImportant),
                task(2, today, false, Importance::VeryImportant),
                task(3, today, false, Importance::LessImportant),
                task(4, today, false, Importance::Important),
            ],
        );
        let snapshot = compute_metrics(&by_date, TimeWindow::Today, today);
        assert_eq!(snapshot.importance_distribution[&Importance::VeryImportant], 2);
        assert_eq!(snapshot.importance_distribution[&Importance::MildlyImportant], 0);
        assert_eq!(snapshot.importance_share(Importance::VeryImportant), 50.0);
        assert_eq!(snapshot.importance_share(Importance::LessImportant), 25.0);
    }

    #[test]
    fn parses_window_names() {
        assert_eq!("daily".parse::<TimeWindow>().expect("daily"), TimeWindow::Today);
        assert_eq!("month".parse::<TimeWindow>().expect("month"), TimeWindow::Month);
        assert!("year".parse::<TimeWindow>().is_err());
    }
}
